//! Topic coverage analysis over leaf topics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::EngineError;
use crate::hierarchy::TopicHierarchy;

/// Bucket name for records without an assigned topic.
pub const UNCATEGORIZED_TOPIC: &str = "__uncategorized__";

/// Share thresholds relative to the uniform target.
const UNDER_FACTOR: f64 = 0.5;
const OVER_FACTOR: f64 = 1.5;

/// Balance score thresholds for ratings.
const GOOD_BALANCE: f64 = 0.7;
const FAIR_BALANCE: f64 = 0.4;

/// How a leaf topic's share compares to the uniform target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageStatus {
    Under,
    Ok,
    Over,
}

/// Qualitative rating of a balance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceRating {
    Good,
    Fair,
    Poor,
}

impl BalanceRating {
    pub fn from_score(score: f64) -> Self {
        if score >= GOOD_BALANCE {
            Self::Good
        } else if score >= FAIR_BALANCE {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl fmt::Display for BalanceRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        };
        f.write_str(s)
    }
}

/// Coverage of a single leaf topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageDistributionEntry {
    pub topic: String,
    pub count: usize,
    pub percentage: f64,
    pub target_percentage: f64,
    /// `target_percentage - percentage`.
    pub gap: f64,
    pub status: CoverageStatus,
}

/// Result of analyzing a dataset's topic coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_records: usize,
    pub distribution: Vec<CoverageDistributionEntry>,
    pub balance_score: f64,
    pub balance_rating: BalanceRating,
    pub recommendations: Vec<String>,
    pub uncategorized_count: usize,
    /// Records whose topic is not a leaf of the hierarchy.
    #[serde(default)]
    pub unmatched_count: usize,
}

impl CoverageReport {
    pub fn under_represented(&self) -> impl Iterator<Item = &CoverageDistributionEntry> {
        self.distribution
            .iter()
            .filter(|e| e.status == CoverageStatus::Under)
    }
}

/// Ratio of the smallest to the largest share, clamped to `[0, 1]`.
///
/// A single share, an empty slice, or an all-zero distribution score 1.
pub fn balance_score(percentages: &[f64]) -> f64 {
    if percentages.len() <= 1 {
        return 1.0;
    }
    let max = percentages.iter().copied().fold(f64::MIN, f64::max);
    let min = percentages.iter().copied().fold(f64::MAX, f64::min);
    if max <= 0.0 {
        return 1.0;
    }
    (min / max).clamp(0.0, 1.0)
}

/// Computes per-leaf distribution, gaps and balance for a hierarchy.
#[derive(Debug, Clone)]
pub struct CoverageAnalyzer {
    leaves: Vec<String>,
}

impl CoverageAnalyzer {
    /// Create an analyzer; a hierarchy without leaves or with shared leaf
    /// names is rejected.
    pub fn new(hierarchy: &TopicHierarchy) -> Result<Self, EngineError> {
        hierarchy.validate()?;
        Ok(Self {
            leaves: hierarchy.leaf_names(),
        })
    }

    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    /// Analyze records given as their assigned topics.
    pub fn analyze<'a, I>(&self, topics: I) -> CoverageReport
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counts: HashMap<&str, usize> =
            self.leaves.iter().map(|l| (l.as_str(), 0)).collect();
        let mut total = 0usize;
        let mut uncategorized = 0usize;
        let mut unmatched = 0usize;

        for topic in topics {
            total += 1;
            match topic.map(str::trim).filter(|t| !t.is_empty()) {
                None => uncategorized += 1,
                Some(UNCATEGORIZED_TOPIC) => uncategorized += 1,
                Some(t) => match counts.get_mut(t) {
                    Some(count) => *count += 1,
                    None => unmatched += 1,
                },
            }
        }

        let target = 100.0 / self.leaves.len() as f64;
        let distribution: Vec<CoverageDistributionEntry> = self
            .leaves
            .iter()
            .map(|leaf| {
                let count = counts.get(leaf.as_str()).copied().unwrap_or(0);
                let percentage = if total > 0 {
                    100.0 * count as f64 / total as f64
                } else {
                    0.0
                };
                let status = if percentage < UNDER_FACTOR * target {
                    CoverageStatus::Under
                } else if percentage > OVER_FACTOR * target {
                    CoverageStatus::Over
                } else {
                    CoverageStatus::Ok
                };
                CoverageDistributionEntry {
                    topic: leaf.clone(),
                    count,
                    percentage,
                    target_percentage: target,
                    gap: target - percentage,
                    status,
                }
            })
            .collect();

        let percentages: Vec<f64> = distribution.iter().map(|e| e.percentage).collect();
        let score = balance_score(&percentages);
        let recommendations = distribution
            .iter()
            .filter(|e| e.status == CoverageStatus::Under)
            .map(|e| shortfall_line(e, total))
            .collect();

        tracing::debug!(
            total_records = total,
            leaves = self.leaves.len(),
            balance_score = score,
            uncategorized = uncategorized,
            "Coverage analyzed"
        );

        CoverageReport {
            total_records: total,
            distribution,
            balance_score: score,
            balance_rating: BalanceRating::from_score(score),
            recommendations,
            uncategorized_count: uncategorized,
            unmatched_count: unmatched,
        }
    }
}

fn shortfall_line(entry: &CoverageDistributionEntry, total: usize) -> String {
    let target_count = (entry.target_percentage * total as f64 / 100.0).ceil() as usize;
    let shortfall = target_count.saturating_sub(entry.count);
    format!(
        "Topic '{}' is under-represented: {} records ({:.1}%) against a target of {} ({:.1}%); add about {} more",
        entry.topic, entry.count, entry.percentage, target_count, entry.target_percentage, shortfall
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::HierarchyBuilder;

    fn hierarchy(leaves: &[&str]) -> TopicHierarchy {
        let paths: Vec<Vec<String>> = leaves.iter().map(|l| vec![l.to_string()]).collect();
        HierarchyBuilder::from_paths(&paths)
    }

    fn topics(counts: &[(&'static str, usize)]) -> Vec<Option<&'static str>> {
        counts.iter()
            .flat_map(|(topic, n)| std::iter::repeat(Some(*topic)).take(*n))
            .collect()
    }

    #[test]
    fn test_uniform_distribution_is_perfectly_balanced() {
        let analyzer = CoverageAnalyzer::new(&hierarchy(&["a", "b", "c", "d"])).expect("leaves");
        let report = analyzer.analyze(topics(&[("a", 25), ("b", 25), ("c", 25), ("d", 25)]));

        assert_eq!(report.balance_score, 1.0);
        assert_eq!(report.balance_rating, BalanceRating::Good);
        assert!(report.recommendations.is_empty());
        assert!(report
            .distribution
            .iter()
            .all(|e| e.status == CoverageStatus::Ok && e.gap == 0.0));
    }

    #[test]
    fn test_skewed_distribution() {
        let analyzer = CoverageAnalyzer::new(&hierarchy(&["a", "b", "c", "d"])).expect("leaves");
        let report = analyzer.analyze(topics(&[("a", 80), ("b", 10), ("c", 5), ("d", 5)]));

        assert!((report.balance_score - 0.0625).abs() < 1e-9);
        assert_eq!(report.balance_rating, BalanceRating::Poor);
        let statuses: Vec<_> = report.distribution.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                CoverageStatus::Over,
                CoverageStatus::Under,
                CoverageStatus::Under,
                CoverageStatus::Under
            ]
        );
        assert_eq!(report.recommendations.len(), 3);
        assert!(report.recommendations[0].contains("'b'"));
        assert!(report.recommendations[0].contains("add about 15 more"));
    }

    #[test]
    fn test_uncategorized_and_unmatched_records() {
        let analyzer = CoverageAnalyzer::new(&hierarchy(&["a", "b"])).expect("leaves");
        let mut input = topics(&[("a", 2), ("b", 2), ("stale", 1)]);
        input.push(None);
        input.push(Some(UNCATEGORIZED_TOPIC));
        input.push(Some("  "));
        let report = analyzer.analyze(input);

        assert_eq!(report.total_records, 8);
        assert_eq!(report.uncategorized_count, 3);
        assert_eq!(report.unmatched_count, 1);
        assert!((report.distribution[0].percentage - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_leaf_scores_one() {
        let analyzer = CoverageAnalyzer::new(&hierarchy(&["only"])).expect("leaves");
        let report = analyzer.analyze(topics(&[("only", 3)]));
        assert_eq!(report.balance_score, 1.0);
        assert_eq!(report.distribution[0].target_percentage, 100.0);
    }

    #[test]
    fn test_rejects_empty_hierarchy() {
        assert!(CoverageAnalyzer::new(&hierarchy(&[])).is_err());
    }

    #[test]
    fn test_rejects_leaves_sharing_a_name() {
        let shared = HierarchyBuilder::from_paths(&[
            vec!["Billing", "Other"],
            vec!["Shipping", "Other"],
            vec!["Returns"],
        ]);
        assert_eq!(shared.leaf_count, 3);
        let err = CoverageAnalyzer::new(&shared).expect_err("ambiguous leaves");
        assert!(matches!(err, EngineError::Domain(_)));

        let distinct = HierarchyBuilder::from_paths(&[
            vec!["Billing", "Other billing"],
            vec!["Shipping", "Other shipping"],
            vec!["Returns"],
        ]);
        let report = CoverageAnalyzer::new(&distinct)
            .expect("unique leaves")
            .analyze([Some("Returns")]);
        assert_eq!(report.distribution.len(), 3);
        assert!((report.distribution[0].target_percentage - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_balance_score_bounds() {
        assert_eq!(balance_score(&[]), 1.0);
        assert_eq!(balance_score(&[0.0, 0.0]), 1.0);
        assert_eq!(balance_score(&[0.0, 50.0]), 0.0);
        let score = balance_score(&[10.0, 30.0, 60.0]);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_rating_thresholds() {
        assert_eq!(BalanceRating::from_score(0.7), BalanceRating::Good);
        assert_eq!(BalanceRating::from_score(0.69), BalanceRating::Fair);
        assert_eq!(BalanceRating::from_score(0.4), BalanceRating::Fair);
        assert_eq!(BalanceRating::from_score(0.39), BalanceRating::Poor);
    }
}
