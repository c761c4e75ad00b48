//! Persistence backends for workflow state.
//!
//! A repository stores workflow states, step snapshots and the generation
//! history. Every write is a [`WorkflowCommit`] applied atomically: either the
//! state, its snapshot and its history entry are all stored, or none are.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::state::WorkflowState;
use super::step::Step;
use crate::error::StoreError;
use crate::generation::GenerationHistoryEntry;

/// Full copy of a workflow taken when it left a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub snapshot_id: String,
    pub workflow_id: String,
    /// The step the workflow was leaving.
    pub step: Step,
    pub created_at: DateTime<Utc>,
    pub state: WorkflowState,
}

impl WorkflowSnapshot {
    pub fn capture(state: &WorkflowState) -> Self {
        Self {
            snapshot_id: Uuid::new_v4().to_string(),
            workflow_id: state.id.clone(),
            step: state.current_step,
            created_at: Utc::now(),
            state: state.clone(),
        }
    }
}

/// Lightweight snapshot listing for rollback responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub snapshot_id: String,
    pub step: Step,
    pub created_at: DateTime<Utc>,
}

impl From<&WorkflowSnapshot> for SnapshotSummary {
    fn from(snapshot: &WorkflowSnapshot) -> Self {
        Self {
            snapshot_id: snapshot.snapshot_id.clone(),
            step: snapshot.step,
            created_at: snapshot.created_at,
        }
    }
}

/// One atomic write.
#[derive(Debug, Clone)]
pub struct WorkflowCommit {
    pub state: WorkflowState,
    pub snapshot: Option<WorkflowSnapshot>,
    pub history: Option<GenerationHistoryEntry>,
}

impl WorkflowCommit {
    pub fn state(state: WorkflowState) -> Self {
        Self {
            state,
            snapshot: None,
            history: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: WorkflowSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_history(mut self, entry: GenerationHistoryEntry) -> Self {
        self.history = Some(entry);
        self
    }
}

/// Storage for workflows, snapshots and generation history.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<WorkflowState>, StoreError>;

    /// The most recently created workflow for a dataset.
    async fn find_by_dataset(&self, dataset_id: &str) -> Result<Option<WorkflowState>, StoreError>;

    /// All workflows, newest first.
    async fn list(&self) -> Result<Vec<WorkflowState>, StoreError>;

    async fn commit(&self, commit: WorkflowCommit) -> Result<(), StoreError>;

    /// Remove a workflow with its snapshots and history. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Snapshots of a workflow, oldest first.
    async fn snapshots(&self, workflow_id: &str) -> Result<Vec<WorkflowSnapshot>, StoreError>;

    /// Generation audit log of a workflow, oldest first.
    async fn generation_history(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<GenerationHistoryEntry>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryTables {
    workflows: HashMap<String, WorkflowState>,
    snapshots: Vec<WorkflowSnapshot>,
    history: Vec<GenerationHistoryEntry>,
}

/// Repository held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<MemoryTables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowRepository for MemoryRepository {
    async fn load(&self, id: &str) -> Result<Option<WorkflowState>, StoreError> {
        let tables = self.tables.read().expect("repository lock poisoned");
        Ok(tables.workflows.get(id).cloned())
    }

    async fn find_by_dataset(&self, dataset_id: &str) -> Result<Option<WorkflowState>, StoreError> {
        let tables = self.tables.read().expect("repository lock poisoned");
        Ok(tables
            .workflows
            .values()
            .filter(|w| w.dataset_id == dataset_id)
            .max_by_key(|w| w.created_at)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<WorkflowState>, StoreError> {
        let tables = self.tables.read().expect("repository lock poisoned");
        let mut workflows: Vec<WorkflowState> = tables.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(workflows)
    }

    async fn commit(&self, commit: WorkflowCommit) -> Result<(), StoreError> {
        let mut tables = self.tables.write().expect("repository lock poisoned");
        if let Some(snapshot) = commit.snapshot {
            tables.snapshots.push(snapshot);
        }
        if let Some(entry) = commit.history {
            tables.history.push(entry);
        }
        tables
            .workflows
            .insert(commit.state.id.clone(), commit.state);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().expect("repository lock poisoned");
        tables.snapshots.retain(|s| s.workflow_id != id);
        tables.history.retain(|h| h.workflow_id != id);
        Ok(tables.workflows.remove(id).is_some())
    }

    async fn snapshots(&self, workflow_id: &str) -> Result<Vec<WorkflowSnapshot>, StoreError> {
        let tables = self.tables.read().expect("repository lock poisoned");
        Ok(tables
            .snapshots
            .iter()
            .filter(|s| s.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn generation_history(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<GenerationHistoryEntry>, StoreError> {
        let tables = self.tables.read().expect("repository lock poisoned");
        Ok(tables
            .history
            .iter()
            .filter(|h| h.workflow_id == workflow_id)
            .cloned()
            .collect())
    }
}
