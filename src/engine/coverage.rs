//! Coverage analysis and synthetic data generation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{check_range, FinetuneEngine};
use crate::collaborators::{DatasetRecord, SyntheticRequest};
use crate::coverage::{CoverageAnalyzer, CoverageReport, GenerationPlan};
use crate::error::EngineError;
use crate::generation::{
    CoverageGeneration, GenerationOutcome, GenerationRound, GenerationStrategy,
};
use crate::workflow::gate;

const DEFAULT_COUNT_PER_TOPIC: usize = 10;
const DEFAULT_MAX_TURNS: usize = 3;
/// Topics targeted automatically when the caller names none.
const AUTO_TARGET_LIMIT: usize = 5;
const MAX_TOPIC_SEEDS: usize = 10;
const FALLBACK_SEEDS: usize = 5;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeCoverageParams {
    pub workflow_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageAnalysis {
    pub workflow_id: String,
    #[serde(flatten)]
    pub report: CoverageReport,
    pub synthetic_count: usize,
    pub synthetic_percentage: f64,
    pub generation_plan: GenerationPlan,
    pub generation_rounds: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateSyntheticParams {
    pub workflow_id: String,
    #[serde(default)]
    pub strategy: Option<GenerationStrategy>,
    #[serde(default)]
    pub target_topics: Option<Vec<String>>,
    #[serde(default)]
    pub count_per_topic: Option<usize>,
    #[serde(default)]
    pub max_turns: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyntheticGenerationResult {
    pub workflow_id: String,
    #[serde(flatten)]
    pub round: GenerationRound,
    pub records_rejected: usize,
    pub improvement: f64,
    /// Valid records added per topic.
    pub by_topic: BTreeMap<String, usize>,
}

fn synthetic_count(records: &[DatasetRecord]) -> usize {
    records.iter().filter(|r| r.is_generated).count()
}

fn analyze(analyzer: &CoverageAnalyzer, records: &[DatasetRecord]) -> CoverageReport {
    analyzer.analyze(records.iter().map(|r| r.topic.as_deref()))
}

/// Seed payloads for a topic, falling back to the first records of the dataset.
fn seeds_for(records: &[DatasetRecord], topic: &str) -> Vec<serde_json::Value> {
    let on_topic: Vec<serde_json::Value> = records
        .iter()
        .filter(|r| r.topic.as_deref() == Some(topic))
        .take(MAX_TOPIC_SEEDS)
        .map(|r| r.data.clone())
        .collect();
    if !on_topic.is_empty() {
        return on_topic;
    }
    records
        .iter()
        .take(FALLBACK_SEEDS)
        .map(|r| r.data.clone())
        .collect()
}

impl FinetuneEngine {
    /// Measure topic balance and store it on the coverage bag.
    pub async fn analyze_coverage(&self, params: AnalyzeCoverageParams) -> Result<CoverageAnalysis, EngineError> {
        let state = self
            .store
            .guarded(&params.workflow_id, gate::ANALYZE_COVERAGE)
            .await?;
        let dataset = self.dataset(&state.dataset_id).await?;
        let analyzer = CoverageAnalyzer::new(&Self::hierarchy(&dataset)?)?;
        let records = self.records(&state.dataset_id).await?;

        let report = analyze(&analyzer, &records);
        let synthetic = synthetic_count(&records);
        let plan = GenerationPlan::from_report(&report, None);

        let (state, bag) = self
            .store
            .mutate(&state.id, Some(gate::ANALYZE_COVERAGE), |state| {
                let bag = match state.coverage_generation.take() {
                    Some(mut bag) => {
                        bag.refresh(&report, synthetic);
                        bag
                    }
                    None => CoverageGeneration::from_report(&report, synthetic),
                };
                state.coverage_generation = Some(bag.clone());
                Ok(bag)
            })
            .await?;
        self.metrics.record_balance_score(report.balance_score);

        tracing::info!(
            workflow_id = %state.id,
            balance_score = report.balance_score,
            rating = ?report.balance_rating,
            uncategorized = report.uncategorized_count,
            "Coverage analyzed"
        );

        Ok(CoverageAnalysis {
            workflow_id: state.id,
            report,
            synthetic_count: bag.synthetic_count,
            synthetic_percentage: bag.synthetic_percentage,
            generation_plan: plan,
            generation_rounds: bag.generation_rounds().len(),
        })
    }

    /// Generate records for under-represented topics and record the round.
    ///
    /// A round is recorded even when nothing was targeted or generated.
    pub async fn generate_synthetic_data(
        &self,
        params: GenerateSyntheticParams,
    ) -> Result<SyntheticGenerationResult, EngineError> {
        let strategy = params.strategy.unwrap_or_default();
        let count = check_range(
            params.count_per_topic.unwrap_or(DEFAULT_COUNT_PER_TOPIC),
            1,
            100,
            "count_per_topic",
        )?;
        let max_turns = check_range(params.max_turns.unwrap_or(DEFAULT_MAX_TURNS), 1, 10, "max_turns")?;

        let state = self
            .store
            .guarded(&params.workflow_id, gate::GENERATE_SYNTHETIC_DATA)
            .await?;
        let dataset = self.dataset(&state.dataset_id).await?;
        let analyzer = CoverageAnalyzer::new(&Self::hierarchy(&dataset)?)?;
        let records = self.records(&state.dataset_id).await?;
        let before = analyze(&analyzer, &records);

        let topics = match params.target_topics {
            Some(requested) => {
                let leaves: HashSet<&str> = analyzer.leaves().iter().map(String::as_str).collect();
                if let Some(unknown) = requested.iter().find(|t| !leaves.contains(t.as_str())) {
                    return Err(EngineError::validation(format!(
                        "Unknown target topic '{}'",
                        unknown
                    )));
                }
                let mut seen = HashSet::new();
                requested
                    .into_iter()
                    .filter(|t| seen.insert(t.clone()))
                    .collect()
            }
            None => GenerationPlan::from_report(&before, None).priority_topics(AUTO_TARGET_LIMIT),
        };

        let mut accepted = Vec::new();
        let mut by_topic = BTreeMap::new();
        let mut generated = 0;
        for topic in &topics {
            let request = SyntheticRequest {
                topic: topic.clone(),
                goals: state.training_goals.clone(),
                strategy,
                count,
                max_turns,
                seeds: seeds_for(&records, topic),
            };
            let payloads = self.collaborators.generator.generate_records(&request).await?;
            generated += payloads.len();

            let valid: Vec<DatasetRecord> = payloads
                .into_iter()
                .map(|data| DatasetRecord::generated(data, topic.clone()))
                .filter(|record| self.validator.validate(record).is_ok())
                .collect();
            tracing::debug!(
                workflow_id = %state.id,
                topic = %topic,
                valid = valid.len(),
                "Synthetic records produced"
            );
            by_topic.insert(topic.clone(), valid.len());
            accepted.extend(valid);
        }

        let records_valid = accepted.len();
        if !accepted.is_empty() {
            self.collaborators
                .records
                .add_records(&state.dataset_id, accepted)
                .await?;
        }

        let records = self.records(&state.dataset_id).await?;
        let after = analyze(&analyzer, &records);
        let outcome = GenerationOutcome {
            strategy,
            topics_targeted: topics,
            records_generated: generated,
            records_valid,
        };
        let (state, round) = self
            .store
            .record_generation(&state.id, outcome, &before, &after, synthetic_count(&records))
            .await?;
        self.metrics.record_generated(generated, records_valid);
        self.metrics.record_balance_score(after.balance_score);

        Ok(SyntheticGenerationResult {
            workflow_id: state.id,
            records_rejected: round.records_rejected(),
            improvement: round.improvement(),
            round,
            by_topic,
        })
    }
}
