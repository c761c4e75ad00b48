//! Guards around the training and deployment lifecycle.
//!
//! The controller owns no state of its own. It inspects and updates a
//! [`WorkflowState`] so that callers can apply its rules inside a single
//! store mutation.

use crate::error::EngineError;
use crate::workflow::{StepData, WorkflowState};

use super::job::{Deployment, TrainingJob, TrainingStatus};

/// Lifecycle rules for training jobs and deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleController;

impl LifecycleController {
    pub fn new() -> Self {
        Self
    }

    /// A job may start once the dry run allows it and no live job exists.
    ///
    /// A failed job may be replaced by a new submission.
    pub fn check_can_start(&self, state: &WorkflowState) -> Result<(), EngineError> {
        match &state.dry_run {
            None => {
                return Err(EngineError::MissingPrerequisite(
                    "a dry run must be completed before training".into(),
                ))
            }
            Some(result) if !result.verdict.allows_training() => {
                return Err(EngineError::MissingPrerequisite(format!(
                    "dry run verdict is {}; training is not allowed",
                    result.verdict
                )))
            }
            Some(_) => {}
        }

        match &state.training {
            Some(job) if job.status != TrainingStatus::Failed => Err(EngineError::Conflict(
                format!("training job '{}' is already {}", job.job_id, job.status),
            )),
            _ => Ok(()),
        }
    }

    /// Store a submitted job on the workflow.
    pub fn record_job(&self, state: &mut WorkflowState, job: TrainingJob) -> Result<(), EngineError> {
        self.check_can_start(state)?;
        state.apply_step_data(StepData::Training(job))
    }

    /// The fine-tuned model of a completed job.
    pub fn deployable_model(&self, state: &WorkflowState) -> Result<String, EngineError> {
        let job = state.training.as_ref().ok_or_else(|| {
            EngineError::MissingPrerequisite("no training job has been started".into())
        })?;
        if job.status != TrainingStatus::Completed {
            return Err(EngineError::MissingPrerequisite(format!(
                "training job '{}' is {}, not completed",
                job.job_id, job.status
            )));
        }
        job.deployable_model().map(str::to_string).ok_or_else(|| {
            EngineError::MissingPrerequisite(format!(
                "training job '{}' reported no fine-tuned model",
                job.job_id
            ))
        })
    }

    /// Record the deployment on a workflow whose training completed.
    pub fn record_deployment(
        &self,
        state: &mut WorkflowState,
        deployment: Deployment,
    ) -> Result<(), EngineError> {
        self.deployable_model(state)?;
        state.apply_step_data(StepData::Deployment(deployment))
    }

    /// Move a deployed workflow to `completed`.
    ///
    /// Callers run this in the same mutation as [`Self::record_deployment`].
    pub fn complete_workflow(&self, state: &mut WorkflowState) -> Result<(), EngineError> {
        state.complete().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dry_run::DryRunResult;
    use crate::training::{JobStatusReport, DEFAULT_BASE_MODEL};
    use crate::workflow::Step;
    use chrono::Utc;

    fn dry_run(scores: &[f64]) -> DryRunResult {
        let samples = scores
            .iter()
            .enumerate()
            .map(|(i, score)| crate::dry_run::SampleScore {
                record_id: format!("r{}", i),
                topic: None,
                score: *score,
                reasoning: String::new(),
            })
            .collect();
        DryRunResult::evaluate(samples, scores.len(), 0.5).expect("should evaluate")
    }

    fn at_training(scores: &[f64]) -> WorkflowState {
        let mut state = WorkflowState::new("ds-1", "", None);
        state.current_step = Step::Training;
        state.dry_run = Some(dry_run(scores));
        state
    }

    fn completed_report() -> JobStatusReport {
        JobStatusReport {
            status: TrainingStatus::Completed,
            progress: 100,
            fine_tuned_model_id: Some("ft-1".into()),
            error: None,
            metrics: None,
        }
    }

    #[test]
    fn test_no_go_blocks_training() {
        let controller = LifecycleController::new();
        let state = at_training(&[0.0, 0.1, 0.2]);
        let err = controller.check_can_start(&state).expect_err("NO-GO");
        assert!(matches!(err, EngineError::MissingPrerequisite(_)));
    }

    #[test]
    fn test_live_job_blocks_resubmission_but_failed_does_not() {
        let controller = LifecycleController::new();
        let mut state = at_training(&[0.9, 1.0]);
        controller
            .record_job(&mut state, TrainingJob::queued("job-1", DEFAULT_BASE_MODEL, serde_json::json!({})))
            .expect("first job");

        let err = controller
            .record_job(&mut state, TrainingJob::queued("job-2", DEFAULT_BASE_MODEL, serde_json::json!({})))
            .expect_err("job already queued");
        assert!(matches!(err, EngineError::Conflict(_)));

        if let Some(job) = state.training.as_mut() {
            job.status = TrainingStatus::Failed;
        }
        controller
            .record_job(&mut state, TrainingJob::queued("job-3", DEFAULT_BASE_MODEL, serde_json::json!({})))
            .expect("failed job can be replaced");
        assert_eq!(state.training.as_ref().map(|j| j.job_id.as_str()), Some("job-3"));
    }

    #[test]
    fn test_deployment_requires_completed_training() {
        let controller = LifecycleController::new();
        let mut state = at_training(&[1.0]);
        let mut job = TrainingJob::queued("job-1", "base", serde_json::Value::Null);
        state.training = Some(job.clone());
        assert!(controller.deployable_model(&state).is_err());

        job.apply_report(&completed_report());
        state.training = Some(job);
        assert_eq!(controller.deployable_model(&state).expect("model"), "ft-1");
    }

    #[test]
    fn test_deployment_then_completion() {
        let controller = LifecycleController::new();
        let mut state = at_training(&[1.0]);
        let mut job = TrainingJob::queued("job-1", "base", serde_json::Value::Null);
        job.apply_report(&completed_report());
        state.training = Some(job);
        state.advance_to(Step::Deployment).expect("training complete");

        controller
            .record_deployment(
                &mut state,
                Deployment {
                    model_id: "ft-1".into(),
                    deployment_name: "prod".into(),
                    endpoint: "https://models.example/ft-1".into(),
                    deployed_at: Utc::now(),
                },
            )
            .expect("deploy");
        assert_eq!(state.current_step, Step::Deployment);
        controller.complete_workflow(&mut state).expect("complete");
        assert_eq!(state.current_step, Step::Completed);
        assert!(state.deployment.is_some());
    }
}
