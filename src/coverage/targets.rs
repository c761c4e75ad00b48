//! Generation targets derived from a coverage report.

use serde::{Deserialize, Serialize};

use super::analyzer::CoverageReport;

/// Minimum dataset size aimed for when no explicit target is given.
pub const MIN_TARGET_TOTAL: usize = 500;

/// Urgency of filling a topic's gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPriority {
    High,
    Medium,
    Low,
}

/// How many records a topic still needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationTarget {
    pub topic: String,
    pub current_count: usize,
    pub target_count: usize,
    pub gap: usize,
    pub priority: GapPriority,
}

/// Targets for every leaf below its per-topic quota, largest gap first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub target_total: usize,
    pub targets: Vec<GenerationTarget>,
    /// Records to generate, capped at what the target total still needs.
    pub total_to_generate: usize,
}

impl GenerationPlan {
    /// Compute a plan; the target total defaults to `max(2 * records, 500)`.
    pub fn from_report(report: &CoverageReport, target_total: Option<usize>) -> Self {
        let target_total =
            target_total.unwrap_or_else(|| (report.total_records * 2).max(MIN_TARGET_TOTAL));
        let leaves = report.distribution.len().max(1);
        let per_topic = target_total as f64 / leaves as f64;
        let target_count = per_topic.round() as usize;

        let mut targets: Vec<GenerationTarget> = report
            .distribution
            .iter()
            .filter(|entry| entry.count < target_count)
            .map(|entry| {
                let gap = target_count - entry.count;
                let priority = if gap as f64 > per_topic * 0.5 {
                    GapPriority::High
                } else if gap as f64 > per_topic * 0.25 {
                    GapPriority::Medium
                } else {
                    GapPriority::Low
                };
                GenerationTarget {
                    topic: entry.topic.clone(),
                    current_count: entry.count,
                    target_count,
                    gap,
                    priority,
                }
            })
            .collect();
        targets.sort_by(|a, b| b.gap.cmp(&a.gap));

        let categorized = report
            .total_records
            .saturating_sub(report.uncategorized_count);
        let additional_needed = target_total.saturating_sub(categorized);
        let gap_sum: usize = targets.iter().map(|t| t.gap).sum();

        Self {
            target_total,
            targets,
            total_to_generate: gap_sum.min(additional_needed),
        }
    }

    /// Topics worth generating for: high or medium priority, at most `limit`.
    pub fn priority_topics(&self, limit: usize) -> Vec<String> {
        self.targets
            .iter()
            .filter(|t| t.priority != GapPriority::Low)
            .take(limit)
            .map(|t| t.topic.clone())
            .collect()
    }
}
