//! Score-shape diagnostics that feed dry-run recommendations.
//!
//! These never change the verdict; they explain what the numbers suggest.

use serde::{Deserialize, Serialize};

use super::stats::ScoreStatistics;

const MEAN_LOW: f64 = 0.25;
const MEAN_HIGH: f64 = 0.65;
const STD_LOW: f64 = 0.10;
const STD_HIGH: f64 = 0.25;
/// Percentages, 0-100.
const MIN_PERCENT_ABOVE_ZERO: f64 = 10.0;
const MAX_PERCENT_PERFECT: f64 = 50.0;
const TOPIC_MEAN_MIN: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicHealth {
    Ok,
    Warning,
    Problem,
}

/// A single observation about the score distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticIssue {
    pub kind: String,
    pub severity: IssueSeverity,
    pub message: String,
    pub suggestion: String,
}

/// Mean and spread of the scores for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicScoreStats {
    pub topic: String,
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub health: TopicHealth,
}

impl TopicScoreStats {
    pub fn new(topic: impl Into<String>, scores: &[f64]) -> Self {
        let mean = super::stats::mean(scores);
        let health = if mean < TOPIC_MEAN_MIN {
            TopicHealth::Problem
        } else if mean < MEAN_LOW {
            TopicHealth::Warning
        } else {
            TopicHealth::Ok
        };
        Self {
            topic: topic.into(),
            count: scores.len(),
            mean,
            std: super::stats::std_dev(scores, mean),
            health,
        }
    }
}

/// Issues plus the recommendations they imply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub issues: Vec<DiagnosticIssue>,
    pub recommendations: Vec<String>,
}

impl Diagnosis {
    fn issue(&mut self, kind: &str, severity: IssueSeverity, message: String, suggestion: &str) {
        self.issues.push(DiagnosticIssue {
            kind: kind.to_string(),
            severity,
            message,
            suggestion: suggestion.to_string(),
        });
    }
}

pub fn diagnose(stats: &ScoreStatistics, by_topic: &[TopicScoreStats]) -> Diagnosis {
    let mut diagnosis = Diagnosis::default();

    if stats.mean < MEAN_LOW {
        diagnosis.issue(
            "mean_low",
            IssueSeverity::Error,
            format!("Mean score too low ({:.1}%)", stats.mean * 100.0),
            "Dataset may be too hard or the grader too strict; review sample outputs.",
        );
    } else if stats.mean > MEAN_HIGH {
        diagnosis.issue(
            "mean_high",
            IssueSeverity::Warning,
            format!("Mean score high ({:.1}%)", stats.mean * 100.0),
            "Dataset may be too easy or the grader too lenient; training needs room to improve.",
        );
        diagnosis
            .recommendations
            .push("Review the highest-scoring samples for reward hacking".to_string());
        diagnosis
            .recommendations
            .push("Consider tightening grader criteria or adding harder examples".to_string());
    }

    if stats.count > 1 && stats.std < STD_LOW {
        diagnosis.issue(
            "std_low",
            IssueSeverity::Warning,
            format!("Score variance too low (std {:.3})", stats.std),
            "The grader may not differentiate outputs; add grading dimensions.",
        );
        diagnosis
            .recommendations
            .push("Use partial credit instead of binary pass/fail grading".to_string());
    } else if stats.std > STD_HIGH {
        diagnosis.issue(
            "std_high",
            IssueSeverity::Warning,
            format!("Score variance high (std {:.3})", stats.std),
            "Scores may be bimodal; consider gradient scoring.",
        );
    }

    if stats.percent_above_zero < MIN_PERCENT_ABOVE_ZERO {
        diagnosis.issue(
            "low_success",
            IssueSeverity::Error,
            format!(
                "Only {:.1}% of samples scored above zero",
                stats.percent_above_zero
            ),
            "The base model struggles with these tasks.",
        );
        diagnosis
            .recommendations
            .push("Consider supervised fine-tuning first to bootstrap capability".to_string());
    }

    if stats.percent_perfect > MAX_PERCENT_PERFECT {
        diagnosis.issue(
            "too_easy",
            IssueSeverity::Warning,
            format!("{:.1}% of samples scored perfectly", stats.percent_perfect),
            "Limited improvement signal for training.",
        );
    }

    let problem_topics: Vec<&str> = by_topic
        .iter()
        .filter(|t| t.health == TopicHealth::Problem)
        .map(|t| t.topic.as_str())
        .collect();
    if !problem_topics.is_empty() {
        let joined = problem_topics.join(", ");
        diagnosis.issue(
            "topic_problem",
            IssueSeverity::Warning,
            format!("Topics with very low scores: {}", joined),
            "These topics may need more examples or exclusion.",
        );
        diagnosis
            .recommendations
            .push(format!("Review topics: {}", joined));
    }

    diagnosis
}
