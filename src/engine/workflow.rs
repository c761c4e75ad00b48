//! Workflow control: start, inspect, advance and roll back.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{require_text, FinetuneEngine};
use crate::error::EngineError;
use crate::validation::ValidationReport;
use crate::workflow::{RollbackTarget, SnapshotSummary, Step, StepStatus, WorkflowState};

#[derive(Debug, Clone, Deserialize)]
pub struct StartWorkflowParams {
    pub dataset_id: String,
    pub training_goals: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStarted {
    pub workflow_id: String,
    pub current_step: Step,
    pub validation: ValidationReport,
}

/// Look a workflow up by id, or the latest one for a dataset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub dataset_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<WorkflowState>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub step_status: BTreeMap<Step, StepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<Step>,
    /// What must happen before the current step can be left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    pub generation_rounds: usize,
    pub snapshots: Vec<SnapshotSummary>,
}

impl WorkflowStatus {
    fn missing() -> Self {
        Self {
            exists: false,
            workflow: None,
            step_status: BTreeMap::new(),
            next_step: None,
            blocker: None,
            generation_rounds: 0,
            snapshots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceParams {
    pub workflow_id: String,
    pub step: Step,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepTransition {
    pub workflow_id: String,
    pub previous_step: Step,
    pub current_step: Step,
}

/// Roll back to a step or to a recorded snapshot; exactly one must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct RollbackParams {
    pub workflow_id: String,
    #[serde(default)]
    pub step: Option<Step>,
    #[serde(default)]
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub workflow_id: String,
    pub previous_step: Step,
    pub current_step: Step,
    pub available_snapshots: Vec<SnapshotSummary>,
}

impl FinetuneEngine {
    /// Validate a dataset's records and open a workflow for it.
    pub async fn start_finetune_workflow(
        &self,
        params: StartWorkflowParams,
    ) -> Result<WorkflowStarted, EngineError> {
        require_text(&params.dataset_id, "dataset_id")?;
        require_text(&params.training_goals, "training_goals")?;

        self.dataset(&params.dataset_id).await?;
        let records = self.records(&params.dataset_id).await?;
        let validation = self.validator.validate_batch(&records);

        let state = self
            .store
            .create(&params.dataset_id, &params.training_goals, Some(validation.clone()))
            .await?;

        tracing::info!(
            workflow_id = %state.id,
            dataset_id = %state.dataset_id,
            records = validation.record_count,
            valid = validation.valid_count,
            "Finetune workflow started"
        );

        Ok(WorkflowStarted {
            workflow_id: state.id,
            current_step: state.current_step,
            validation,
        })
    }

    pub async fn get_workflow_status(&self, params: StatusParams) -> Result<WorkflowStatus, EngineError> {
        let state = match (&params.workflow_id, &params.dataset_id) {
            (Some(id), _) if !id.trim().is_empty() => Some(self.store.get(id).await?),
            (_, Some(dataset_id)) if !dataset_id.trim().is_empty() => {
                self.store.get_by_dataset(dataset_id).await?
            }
            _ => {
                return Err(EngineError::validation(
                    "Either workflow_id or dataset_id is required",
                ))
            }
        };

        let Some(state) = state else {
            return Ok(WorkflowStatus::missing());
        };

        let snapshots = self.store.snapshots(&state.id).await?;
        Ok(WorkflowStatus {
            exists: true,
            step_status: state.step_status(),
            next_step: state.current_step.next(),
            blocker: state.exit_blocker(),
            generation_rounds: state
                .coverage_generation
                .as_ref()
                .map(|bag| bag.generation_rounds().len())
                .unwrap_or(0),
            snapshots,
            workflow: Some(state),
        })
    }

    pub async fn advance_to_step(&self, params: AdvanceParams) -> Result<StepTransition, EngineError> {
        let (state, from) = self
            .store
            .advance_to_step(&params.workflow_id, params.step)
            .await?;
        self.metrics
            .record_transition(from.as_str(), state.current_step.as_str());

        Ok(StepTransition {
            workflow_id: state.id,
            previous_step: from,
            current_step: state.current_step,
        })
    }

    pub async fn rollback_to_step(&self, params: RollbackParams) -> Result<RollbackResult, EngineError> {
        let target = match (params.step, params.snapshot_id) {
            (Some(step), None) => RollbackTarget::Step(step),
            (None, Some(snapshot_id)) if !snapshot_id.trim().is_empty() => {
                RollbackTarget::Snapshot(snapshot_id)
            }
            _ => {
                return Err(EngineError::validation(
                    "Exactly one of step or snapshot_id is required",
                ))
            }
        };

        let (state, from) = self.store.rollback_to_step(&params.workflow_id, target).await?;
        self.metrics
            .record_transition(from.as_str(), state.current_step.as_str());
        let available_snapshots = self.store.snapshots(&state.id).await?;

        Ok(RollbackResult {
            workflow_id: state.id,
            previous_step: from,
            current_step: state.current_step,
            available_snapshots,
        })
    }

    /// Every workflow, newest first.
    pub async fn list_workflows(&self) -> Result<Vec<WorkflowState>, EngineError> {
        self.store.list().await
    }

    pub async fn delete_workflow(&self, workflow_id: &str) -> Result<(), EngineError> {
        self.store.delete(workflow_id).await
    }
}
