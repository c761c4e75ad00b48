//! Training submission, status polling and deployment.

use serde::{Deserialize, Serialize};

use super::FinetuneEngine;
use crate::collaborators::TrainingSubmission;
use crate::error::EngineError;
use crate::training::{Deployment, TrainingJob, TrainingMetrics, TrainingStatus};
use crate::workflow::{gate, Step};

/// Steps in which a polled status report is written back.
const PERSIST_STATUS_STEPS: &[Step] = &[Step::Training];

#[derive(Debug, Clone, Deserialize)]
pub struct StartTrainingParams {
    pub workflow_id: String,
    #[serde(default)]
    pub base_model: Option<String>,
    #[serde(default)]
    pub training_params: Option<serde_json::Value>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingStarted {
    pub workflow_id: String,
    pub job_id: String,
    pub status: TrainingStatus,
    pub base_model: String,
    pub record_count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckTrainingParams {
    pub workflow_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingStatusResult {
    pub workflow_id: String,
    pub job_id: String,
    pub status: TrainingStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine_tuned_model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    /// Whether the report was written back to the workflow.
    pub persisted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeployModelParams {
    pub workflow_id: String,
    #[serde(default)]
    pub deployment_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    pub workflow_id: String,
    #[serde(flatten)]
    pub deployment: Deployment,
    pub current_step: Step,
}

impl FinetuneEngine {
    /// Submit the dataset's valid records for fine-tuning.
    pub async fn start_training(&self, params: StartTrainingParams) -> Result<TrainingStarted, EngineError> {
        let base_model = params
            .base_model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_base_model.clone());
        let training_params = params
            .training_params
            .unwrap_or_else(|| serde_json::json!({}));
        if !training_params.is_object() {
            return Err(EngineError::validation("training_params must be an object"));
        }

        let state = self
            .store
            .guarded(&params.workflow_id, gate::START_TRAINING)
            .await?;
        self.controller.check_can_start(&state)?;
        let dataset = self.dataset(&state.dataset_id).await?;

        let records: Vec<serde_json::Value> = self
            .records(&state.dataset_id)
            .await?
            .into_iter()
            .filter(|r| self.validator.validate(r).is_ok())
            .map(|r| r.data)
            .collect();
        if records.is_empty() {
            return Err(EngineError::MissingPrerequisite(format!(
                "dataset '{}' has no valid records to train on",
                dataset.id
            )));
        }
        let record_count = records.len();

        let submission = TrainingSubmission {
            dataset_id: dataset.id.clone(),
            display_name: params
                .display_name
                .unwrap_or_else(|| format!("{} Fine-tune", dataset.name)),
            base_model: base_model.clone(),
            training_params: training_params.clone(),
            records,
        };
        let job_id = self.collaborators.training.submit_job(&submission).await?;
        let job = TrainingJob::queued(job_id.clone(), base_model.clone(), training_params);

        let recorded = self
            .store
            .mutate(&state.id, Some(gate::START_TRAINING), |state| {
                self.controller.record_job(state, job)
            })
            .await;
        if let Err(err) = recorded {
            tracing::warn!(
                workflow_id = %state.id,
                job_id = %job_id,
                error = %err,
                "Training job submitted but not recorded; the backend job is orphaned"
            );
            return Err(err);
        }

        tracing::info!(
            workflow_id = %state.id,
            job_id = %job_id,
            base_model = %base_model,
            records = record_count,
            "Training job submitted"
        );

        Ok(TrainingStarted {
            workflow_id: state.id,
            job_id,
            status: TrainingStatus::Queued,
            base_model,
            record_count,
        })
    }

    /// Poll the backend for the workflow's job.
    ///
    /// The report is persisted only while the workflow is at `training`.
    pub async fn check_training_status(
        &self,
        params: CheckTrainingParams,
    ) -> Result<TrainingStatusResult, EngineError> {
        let state = self
            .store
            .guarded(&params.workflow_id, gate::CHECK_TRAINING_STATUS)
            .await?;
        let mut job = state.training.clone().ok_or_else(|| {
            EngineError::MissingPrerequisite("training has not been started".into())
        })?;

        let report = self.collaborators.training.job_status(&job.job_id).await?;
        job.apply_report(&report);

        let persisted = PERSIST_STATUS_STEPS.contains(&state.current_step);
        if persisted {
            let job_id = job.job_id.clone();
            let (_, updated) = self
                .store
                .mutate(&state.id, Some(PERSIST_STATUS_STEPS), |state| {
                    match state.training.as_mut() {
                        Some(current) if current.job_id == job_id => {
                            current.apply_report(&report);
                            Ok(current.clone())
                        }
                        _ => Err(EngineError::Conflict(format!(
                            "training job '{}' was replaced while polling",
                            job_id
                        ))),
                    }
                })
                .await?;
            job = updated;
        }

        tracing::debug!(
            workflow_id = %state.id,
            job_id = %job.job_id,
            status = %job.status,
            progress = job.progress,
            persisted = persisted,
            "Training status checked"
        );

        Ok(TrainingStatusResult {
            workflow_id: state.id,
            job_id: job.job_id,
            status: job.status,
            progress: job.progress,
            fine_tuned_model_id: job.fine_tuned_model_id,
            error: job.error,
            metrics: job.metrics,
            persisted,
        })
    }

    /// Deploy the fine-tuned model and complete the workflow.
    pub async fn deploy_model(&self, params: DeployModelParams) -> Result<DeploymentResult, EngineError> {
        let state = self
            .store
            .guarded(&params.workflow_id, gate::DEPLOY_MODEL)
            .await?;
        let model_id = self.controller.deployable_model(&state)?;
        let deployment_name = params
            .deployment_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{}-deployment", state.dataset_id));

        let endpoint = self
            .collaborators
            .training
            .deploy(&model_id, &deployment_name)
            .await?;
        let deployment = Deployment {
            model_id,
            deployment_name,
            endpoint,
            deployed_at: chrono::Utc::now(),
        };

        let (state, _) = self
            .store
            .mutate(&state.id, Some(gate::DEPLOY_MODEL), |state| {
                self.controller.record_deployment(state, deployment.clone())?;
                self.controller.complete_workflow(state)
            })
            .await?;
        self.metrics
            .record_transition(Step::Deployment.as_str(), state.current_step.as_str());

        tracing::info!(
            workflow_id = %state.id,
            model_id = %deployment.model_id,
            endpoint = %deployment.endpoint,
            "Model deployed; workflow completed"
        );

        Ok(DeploymentResult {
            workflow_id: state.id,
            current_step: state.current_step,
            deployment,
        })
    }
}
