//! The coverage/generation step bag and its append-only round history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::round::{GenerationRound, GenerationStrategy};
use crate::coverage::{BalanceRating, CoverageDistributionEntry, CoverageReport};

/// Step data for `coverage_generation`.
///
/// Rounds can only be appended through [`CoverageGeneration::append_round`];
/// refreshing the coverage metrics keeps them untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageGeneration {
    pub balance_score: f64,
    pub balance_rating: BalanceRating,
    pub distribution: Vec<CoverageDistributionEntry>,
    pub recommendations: Vec<String>,
    pub uncategorized_count: usize,
    pub total_records: usize,
    pub synthetic_count: usize,
    pub synthetic_percentage: f64,
    pub analyzed_at: DateTime<Utc>,
    #[serde(default)]
    generation_rounds: Vec<GenerationRound>,
}

impl CoverageGeneration {
    /// Build a fresh bag from a coverage report.
    pub fn from_report(report: &CoverageReport, synthetic_count: usize) -> Self {
        let mut bag = Self {
            balance_score: 0.0,
            balance_rating: BalanceRating::Poor,
            distribution: Vec::new(),
            recommendations: Vec::new(),
            uncategorized_count: 0,
            total_records: 0,
            synthetic_count: 0,
            synthetic_percentage: 0.0,
            analyzed_at: Utc::now(),
            generation_rounds: Vec::new(),
        };
        bag.refresh(report, synthetic_count);
        bag
    }

    /// Replace the coverage metrics, keeping recorded rounds.
    ///
    /// `synthetic_count` is the dataset's actual generated-record count, so
    /// the synthetic share is recomputed from ground truth every time.
    pub fn refresh(&mut self, report: &CoverageReport, synthetic_count: usize) {
        self.balance_score = report.balance_score;
        self.balance_rating = report.balance_rating;
        self.distribution = report.distribution.clone();
        self.recommendations = report.recommendations.clone();
        self.uncategorized_count = report.uncategorized_count;
        self.total_records = report.total_records;
        self.synthetic_count = synthetic_count;
        self.synthetic_percentage = if report.total_records > 0 {
            100.0 * synthetic_count as f64 / report.total_records as f64
        } else {
            0.0
        };
        self.analyzed_at = Utc::now();
    }

    pub fn generation_rounds(&self) -> &[GenerationRound] {
        &self.generation_rounds
    }

    /// Take over another bag's rounds, keeping this bag's coverage figures.
    pub fn adopt_rounds(&mut self, other: &CoverageGeneration) {
        self.generation_rounds = other.generation_rounds.clone();
    }

    /// Append a round, numbering it after the existing history.
    pub fn append_round(&mut self, mut round: GenerationRound) -> &GenerationRound {
        round.round = self.generation_rounds.len() + 1;
        self.generation_rounds.push(round);
        &self.generation_rounds[self.generation_rounds.len() - 1]
    }
}

/// Outcome of one generation attempt, before it is recorded.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub strategy: GenerationStrategy,
    pub topics_targeted: Vec<String>,
    pub records_generated: usize,
    pub records_valid: usize,
}

/// Records generation rounds against a workflow's coverage bag.
pub struct GenerationRoundTracker;

impl GenerationRoundTracker {
    /// Append a round built from `outcome` and the before/after coverage, and
    /// refresh the bag's metrics from `after`.
    pub fn record(
        bag: &mut CoverageGeneration,
        outcome: GenerationOutcome,
        before: &CoverageReport,
        after: &CoverageReport,
        synthetic_count: usize,
    ) -> GenerationRound {
        let round = GenerationRound {
            round: 0,
            strategy: outcome.strategy,
            topics_targeted: outcome.topics_targeted,
            records_generated: outcome.records_generated,
            records_valid: outcome.records_valid,
            balance_score_before: before.balance_score,
            balance_score_after: after.balance_score,
            timestamp: Utc::now(),
        };
        bag.refresh(after, synthetic_count);
        let recorded = bag.append_round(round).clone();

        tracing::info!(
            round = recorded.round,
            strategy = %recorded.strategy,
            generated = recorded.records_generated,
            valid = recorded.records_valid,
            balance_before = recorded.balance_score_before,
            balance_after = recorded.balance_score_after,
            "Generation round recorded"
        );

        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::CoverageAnalyzer;
    use crate::hierarchy::HierarchyBuilder;

    fn report(a: usize, b: usize) -> CoverageReport {
        let analyzer = CoverageAnalyzer::new(&HierarchyBuilder::from_paths(&[
            vec!["a".to_string()],
            vec!["b".to_string()],
        ]))
        .expect("leaves");
        let topics = std::iter::repeat(Some("a"))
            .take(a)
            .chain(std::iter::repeat(Some("b")).take(b));
        analyzer.analyze(topics)
    }

    fn outcome(generated: usize) -> GenerationOutcome {
        GenerationOutcome {
            strategy: GenerationStrategy::MessageVariation,
            topics_targeted: vec!["b".into()],
            records_generated: generated,
            records_valid: generated,
        }
    }

    #[test]
    fn test_rounds_append_and_earlier_rounds_unchanged() {
        let before = report(10, 2);
        let mut bag = CoverageGeneration::from_report(&before, 0);

        let after_first = report(10, 6);
        let first = GenerationRoundTracker::record(&mut bag, outcome(4), &before, &after_first, 4);
        let snapshot = bag.generation_rounds().to_vec();

        let after_second = report(10, 10);
        GenerationRoundTracker::record(&mut bag, outcome(4), &after_first, &after_second, 8);

        assert_eq!(bag.generation_rounds().len(), 2);
        assert_eq!(bag.generation_rounds()[0], snapshot[0]);
        assert_eq!(first.round, 1);
        assert_eq!(bag.generation_rounds()[1].round, 2);
        assert_eq!(bag.generation_rounds()[1].balance_score_after, 1.0);
    }

    #[test]
    fn test_refresh_recomputes_synthetic_share() {
        let mut bag = CoverageGeneration::from_report(&report(5, 5), 0);
        bag.refresh(&report(10, 10), 5);
        assert_eq!(bag.synthetic_count, 5);
        assert_eq!(bag.synthetic_percentage, 25.0);
        assert_eq!(bag.total_records, 20);
    }

    #[test]
    fn test_refresh_keeps_rounds() {
        let before = report(4, 1);
        let mut bag = CoverageGeneration::from_report(&before, 0);
        GenerationRoundTracker::record(&mut bag, outcome(3), &before, &report(4, 4), 3);
        bag.refresh(&report(4, 4), 3);
        assert_eq!(bag.generation_rounds().len(), 1);
    }
}
