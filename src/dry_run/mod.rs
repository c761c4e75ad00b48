//! Dry-run verdict engine.
//!
//! A sample of records is graded by an external grader; the scores are
//! summarized into a [`DryRunResult`] whose verdict gates training.

pub mod diagnostics;
pub mod sampling;
pub mod stats;
pub mod verdict;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EngineError;

pub use diagnostics::{diagnose, DiagnosticIssue, Diagnosis, IssueSeverity, TopicHealth, TopicScoreStats};
pub use sampling::{sample_size, RecordSampler, DEFAULT_SAMPLE_PERCENTAGE};
pub use stats::{Percentiles, ScoreBucket, ScoreStatistics};
pub use verdict::{Verdict, VerdictAssessment};

/// Score at or above which a sample counts as passed.
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.5;

/// Number of best and worst samples kept for review.
const EXTREME_SAMPLES: usize = 5;

/// A grader's score for one sampled record.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleScore {
    pub record_id: String,
    pub topic: Option<String>,
    pub score: f64,
    pub reasoning: String,
}

/// One graded record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSample {
    pub record_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub score: f64,
    pub reasoning: String,
    pub passed: bool,
}

/// Step data for `dry_run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunResult {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub ready_for_training: bool,
    pub sample_size: usize,
    pub total_records: usize,
    pub pass_threshold: f64,
    pub passed_count: usize,
    pub pass_rate: f64,
    pub avg_score: f64,
    #[serde(flatten)]
    pub statistics: ScoreStatistics,
    pub by_topic: Vec<TopicScoreStats>,
    pub sample_results: Vec<ScoredSample>,
    pub highest_samples: Vec<ScoredSample>,
    pub lowest_samples: Vec<ScoredSample>,
    pub issues: Vec<DiagnosticIssue>,
    pub recommendations: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl DryRunResult {
    pub fn mean(&self) -> f64 {
        self.statistics.mean
    }

    pub fn std(&self) -> f64 {
        self.statistics.std
    }

    /// Summarize graded samples.
    ///
    /// Scores are clamped into `[0, 1]`; a non-finite score counts as 0.
    pub fn evaluate(
        samples: Vec<SampleScore>,
        total_records: usize,
        pass_threshold: f64,
    ) -> Result<Self, EngineError> {
        if samples.is_empty() {
            return Err(EngineError::validation(
                "Dry run needs at least one graded sample",
            ));
        }

        let sample_results: Vec<ScoredSample> = samples
            .into_iter()
            .map(|sample| {
                let score = if sample.score.is_finite() {
                    sample.score.clamp(0.0, 1.0)
                } else {
                    0.0
                };
                ScoredSample {
                    record_id: sample.record_id,
                    topic: sample.topic,
                    score,
                    reasoning: sample.reasoning,
                    passed: score >= pass_threshold,
                }
            })
            .collect();

        let scores: Vec<f64> = sample_results.iter().map(|s| s.score).collect();
        let statistics = ScoreStatistics::from_scores(&scores);
        let passed_count = sample_results.iter().filter(|s| s.passed).count();
        let pass_rate = passed_count as f64 / sample_results.len() as f64;
        let assessment = VerdictAssessment::assess(pass_rate, statistics.mean);

        let mut topic_scores: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for sample in &sample_results {
            if let Some(topic) = sample.topic.as_deref() {
                topic_scores.entry(topic).or_default().push(sample.score);
            }
        }
        let by_topic: Vec<TopicScoreStats> = topic_scores
            .iter()
            .map(|(topic, scores)| TopicScoreStats::new(*topic, scores))
            .collect();

        let mut ranked = sample_results.clone();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        let highest_samples: Vec<ScoredSample> =
            ranked.iter().take(EXTREME_SAMPLES).cloned().collect();
        let lowest_samples: Vec<ScoredSample> =
            ranked.iter().rev().take(EXTREME_SAMPLES).cloned().collect();

        let diagnosis = diagnose(&statistics, &by_topic);
        let mut recommendations = match assessment.verdict {
            Verdict::NoGo => vec![format!(
                "Do not start training until the pass rate reaches at least {:.0}%",
                verdict::NO_GO_PASS_RATE * 100.0
            )],
            Verdict::Warning => {
                vec!["Training may proceed; review the lowest-scoring samples first".to_string()]
            }
            Verdict::Go => Vec::new(),
        };
        recommendations.extend(diagnosis.recommendations);

        Ok(Self {
            verdict: assessment.verdict,
            ready_for_training: assessment.ready_for_training(),
            reasons: assessment.reasons,
            sample_size: sample_results.len(),
            total_records,
            pass_threshold,
            passed_count,
            pass_rate,
            avg_score: statistics.mean,
            statistics,
            by_topic,
            sample_results,
            highest_samples,
            lowest_samples,
            issues: diagnosis.issues,
            recommendations,
            completed_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(scores: &[f64]) -> Vec<SampleScore> {
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| SampleScore {
                record_id: format!("r{}", i),
                topic: Some(if i % 2 == 0 { "even" } else { "odd" }.to_string()),
                score: *s,
                reasoning: format!("score {}", s),
            })
            .collect()
    }

    #[test]
    fn test_evaluate_go() {
        let result = DryRunResult::evaluate(
            samples(&[0.9, 0.8, 0.95, 0.85, 1.0, 0.7, 0.9, 0.6, 0.75, 0.8]),
            100,
            DEFAULT_PASS_THRESHOLD,
        )
        .expect("samples present");

        assert_eq!(result.verdict, Verdict::Go);
        assert!(result.ready_for_training);
        assert_eq!(result.pass_rate, 1.0);
        assert_eq!(result.sample_size, 10);
        assert_eq!(result.total_records, 100);
        assert_eq!(result.highest_samples.len(), 5);
        assert_eq!(result.highest_samples[0].score, 1.0);
        assert_eq!(result.lowest_samples[0].score, 0.6);
        assert_eq!(result.by_topic.len(), 2);
    }

    #[test]
    fn test_evaluate_no_go() {
        let result = DryRunResult::evaluate(samples(&[0.1, 0.2, 0.9, 0.3]), 40, 0.5)
            .expect("samples present");
        assert_eq!(result.verdict, Verdict::NoGo);
        assert!(!result.ready_for_training);
        assert_eq!(result.passed_count, 1);
        assert!(result.recommendations[0].starts_with("Do not start training"));
    }

    #[test]
    fn test_scores_are_clamped() {
        let result =
            DryRunResult::evaluate(samples(&[1.5, -0.2, f64::NAN]), 3, 0.5).expect("samples");
        let scores: Vec<f64> = result.sample_results.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_empty_sample_rejected() {
        assert!(DryRunResult::evaluate(Vec::new(), 0, 0.5).is_err());
    }

    #[test]
    fn test_serializes_flat_statistics() {
        let result = DryRunResult::evaluate(samples(&[0.5, 0.6]), 2, 0.5).expect("samples");
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["verdict"], "WARNING");
        assert!(json.get("mean").is_some());
        assert!(json.get("percent_perfect").is_some());
        let back: DryRunResult = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, result);
    }
}
