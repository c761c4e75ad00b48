//! Grader configuration, grader previews and dry runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{check_range, FinetuneEngine};
use crate::collaborators::{DatasetInfo, DatasetRecord, EvaluationConfig, GradeOutcome, GraderType};
use crate::dry_run::{sample_size, DryRunResult, RecordSampler, SampleScore};
use crate::error::EngineError;
use crate::workflow::{gate, GraderConfigInfo, StepData};

const DEFAULT_TEST_SAMPLE_SIZE: usize = 5;
const MAX_TEST_SAMPLE_SIZE: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigureGraderParams {
    pub workflow_id: String,
    pub grader_type: GraderType,
    #[serde(default)]
    pub config: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraderConfigured {
    pub workflow_id: String,
    pub grader_type: GraderType,
    pub configured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestGraderParams {
    pub workflow_id: String,
    #[serde(default)]
    pub sample_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraderSampleResult {
    pub workflow_id: String,
    pub sample_size: usize,
    pub avg_score: f64,
    pub results: Vec<GradeOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DryRunParams {
    pub workflow_id: String,
    #[serde(default)]
    pub sample_percentage: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub workflow_id: String,
    #[serde(flatten)]
    pub result: DryRunResult,
}

fn evaluation_config(dataset: &DatasetInfo) -> Result<&EvaluationConfig, EngineError> {
    dataset.evaluation_config.as_ref().ok_or_else(|| {
        EngineError::MissingPrerequisite(format!(
            "dataset '{}' has no grader configured",
            dataset.id
        ))
    })
}

fn require_records(records: &[DatasetRecord], dataset_id: &str) -> Result<(), EngineError> {
    if records.is_empty() {
        return Err(EngineError::MissingPrerequisite(format!(
            "dataset '{}' has no records to grade",
            dataset_id
        )));
    }
    Ok(())
}

impl FinetuneEngine {
    /// Validate and store the evaluator on the dataset.
    pub async fn configure_grader(&self, params: ConfigureGraderParams) -> Result<GraderConfigured, EngineError> {
        let config = EvaluationConfig::from_params(params.grader_type, &params.config)?;
        let state = self
            .store
            .guarded(&params.workflow_id, gate::CONFIGURE_GRADER)
            .await?;
        self.dataset(&state.dataset_id).await?;

        let configured_at = config.updated_at;
        let records = &self.collaborators.records;
        self.store
            .write_through(
                &state.id,
                gate::CONFIGURE_GRADER,
                async {
                    records
                        .save_evaluation_config(&state.dataset_id, config)
                        .await
                        .map_err(EngineError::from)
                },
                |_| {
                    Some(StepData::GraderConfig(GraderConfigInfo {
                        grader_type: params.grader_type,
                        configured_at,
                    }))
                },
            )
            .await?;

        tracing::info!(workflow_id = %state.id, grader_type = %params.grader_type, "Grader configured");

        Ok(GraderConfigured {
            workflow_id: state.id,
            grader_type: params.grader_type,
            configured_at,
        })
    }

    /// Grade a few records without touching the workflow.
    pub async fn test_grader_sample(&self, params: TestGraderParams) -> Result<GraderSampleResult, EngineError> {
        let size = check_range(
            params.sample_size.unwrap_or(DEFAULT_TEST_SAMPLE_SIZE),
            1,
            MAX_TEST_SAMPLE_SIZE,
            "sample_size",
        )?;
        let state = self
            .store
            .guarded(&params.workflow_id, gate::TEST_GRADER_SAMPLE)
            .await?;
        let dataset = self.dataset(&state.dataset_id).await?;
        let config = evaluation_config(&dataset)?;
        let records = self.records(&state.dataset_id).await?;
        require_records(&records, &state.dataset_id)?;

        let sample = RecordSampler::new(self.config.sample_seed).sample(&records, size);
        let results = self.collaborators.grader.grade(config, &sample).await?;
        let avg_score = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64
        };

        tracing::debug!(workflow_id = %state.id, graded = results.len(), avg_score = avg_score, "Grader sample tested");

        Ok(GraderSampleResult {
            workflow_id: state.id,
            sample_size: sample.len(),
            avg_score,
            results,
        })
    }

    /// Grade a sample of the dataset and store the verdict.
    pub async fn run_dry_run(&self, params: DryRunParams) -> Result<DryRunReport, EngineError> {
        let percentage = params
            .sample_percentage
            .unwrap_or(self.config.sample_percentage);
        check_range(percentage, 1.0, 100.0, "sample_percentage")?;

        let state = self
            .store
            .guarded(&params.workflow_id, gate::RUN_DRY_RUN)
            .await?;
        let dataset = self.dataset(&state.dataset_id).await?;
        let config = evaluation_config(&dataset)?;
        let records = self.records(&state.dataset_id).await?;
        require_records(&records, &state.dataset_id)?;

        let size = sample_size(records.len(), percentage)?;
        let sample = RecordSampler::new(self.config.sample_seed).sample(&records, size);
        let outcomes = self.collaborators.grader.grade(config, &sample).await?;

        let topics: HashMap<&str, Option<String>> = sample
            .iter()
            .map(|r| (r.id.as_str(), r.topic.clone()))
            .collect();
        let scores: Vec<SampleScore> = outcomes
            .into_iter()
            .map(|outcome| SampleScore {
                topic: topics.get(outcome.record_id.as_str()).cloned().flatten(),
                record_id: outcome.record_id,
                score: outcome.score,
                reasoning: outcome.reasoning,
            })
            .collect();

        let result = DryRunResult::evaluate(scores, records.len(), self.config.pass_threshold)?;
        let (state, _) = self
            .store
            .mutate(&state.id, Some(gate::RUN_DRY_RUN), |state| {
                state.apply_step_data(StepData::DryRun(result.clone()))
            })
            .await?;
        self.metrics.record_dry_run_verdict(result.verdict.as_str());

        tracing::info!(
            workflow_id = %state.id,
            verdict = %result.verdict,
            pass_rate = result.pass_rate,
            avg_score = result.avg_score,
            sample_size = result.sample_size,
            "Dry run completed"
        );

        Ok(DryRunReport {
            workflow_id: state.id,
            result,
        })
    }
}
