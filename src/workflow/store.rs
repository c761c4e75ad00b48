//! Workflow store: atomic, per-workflow serialized state mutations.
//!
//! Every mutation runs load, guard, compute and persist while holding the
//! workflow's async mutex. The closure works on a copy, so an error leaves
//! the persisted state untouched.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use super::gate::{self, StepGate};
use super::repository::{
    MemoryRepository, SnapshotSummary, WorkflowCommit, WorkflowRepository, WorkflowSnapshot,
};
use super::state::{StepData, WorkflowState};
use super::step::Step;
use crate::coverage::CoverageReport;
use crate::error::EngineError;
use crate::generation::{
    CoverageGeneration, GenerationHistoryEntry, GenerationOutcome, GenerationRound,
    GenerationRoundTracker,
};
use crate::validation::ValidationReport;

/// Where a rollback should land.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackTarget {
    Step(Step),
    Snapshot(String),
}

/// Extra rows written in the same commit as the state.
#[derive(Debug, Default)]
struct CommitExtras {
    snapshot: Option<WorkflowSnapshot>,
    history: Option<GenerationHistoryEntry>,
}

/// A held per-key lock.
///
/// On drop the lock is released and the table entry removed when no other
/// task holds or waits on it.
struct KeyGuard<'a> {
    table: &'a LockTable,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.table.lock().expect("lock table poisoned");
        if locks
            .get(&self.key)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

type LockTable = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

/// Persisted workflows keyed by id.
pub struct WorkflowStore {
    repository: Arc<dyn WorkflowRepository>,
    locks: LockTable,
}

impl WorkflowStore {
    pub fn new(repository: Arc<dyn WorkflowRepository>) -> Self {
        Self {
            repository,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryRepository::new()))
    }

    async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = {
            let mut locks = self.locks.lock().expect("lock table poisoned");
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        KeyGuard {
            table: &self.locks,
            key: key.to_string(),
            guard: Some(mutex.lock_owned().await),
        }
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().expect("lock table poisoned").len()
    }

    async fn load(&self, id: &str) -> Result<WorkflowState, EngineError> {
        self.repository
            .load(id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))
    }

    /// Start a workflow for a dataset.
    ///
    /// Fails with a conflict when the dataset already has an unfinished workflow.
    pub async fn create(
        &self,
        dataset_id: &str,
        training_goals: &str,
        input_validation: Option<ValidationReport>,
    ) -> Result<WorkflowState, EngineError> {
        let _guard = self.lock(&format!("dataset:{}", dataset_id)).await;
        if let Some(existing) = self.repository.find_by_dataset(dataset_id).await? {
            if !existing.is_completed() {
                return Err(EngineError::Conflict(format!(
                    "dataset '{}' already has an active workflow '{}' at step {}",
                    dataset_id, existing.id, existing.current_step
                )));
            }
        }

        let state = WorkflowState::new(dataset_id, training_goals, input_validation);
        self.repository
            .commit(WorkflowCommit::state(state.clone()))
            .await?;
        tracing::info!(workflow_id = %state.id, dataset_id = dataset_id, "Workflow created");
        Ok(state)
    }

    pub async fn get(&self, id: &str) -> Result<WorkflowState, EngineError> {
        self.load(id).await
    }

    /// Most recently created workflow for a dataset.
    pub async fn get_by_dataset(&self, dataset_id: &str) -> Result<Option<WorkflowState>, EngineError> {
        Ok(self.repository.find_by_dataset(dataset_id).await?)
    }

    pub async fn list(&self) -> Result<Vec<WorkflowState>, EngineError> {
        Ok(self.repository.list().await?)
    }

    /// Delete a workflow with its snapshots and generation history.
    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let _guard = self.lock(id).await;
        if !self.repository.delete(id).await? {
            return Err(EngineError::WorkflowNotFound(id.to_string()));
        }
        tracing::info!(workflow_id = id, "Workflow deleted");
        Ok(())
    }

    /// Load a workflow and check it is in one of `allowed`.
    ///
    /// Used before external calls; the caller re-guards when persisting.
    pub async fn guarded(&self, id: &str, allowed: &[Step]) -> Result<WorkflowState, EngineError> {
        let _guard = self.lock(id).await;
        let state = self.load(id).await?;
        StepGate::guard(&state, allowed)?;
        Ok(state)
    }

    /// Run an external `write` under the workflow's lock, then persist the
    /// bag chosen by `data` in the same critical section.
    ///
    /// The step is checked before `write` is polled, so no transition can
    /// land between the external write and the bag update. When `data`
    /// returns `None` only the write happens.
    pub async fn write_through<Fut, D>(
        &self,
        id: &str,
        allowed: &[Step],
        write: Fut,
        data: D,
    ) -> Result<WorkflowState, EngineError>
    where
        Fut: Future<Output = Result<(), EngineError>>,
        D: FnOnce(&WorkflowState) -> Option<StepData>,
    {
        let _guard = self.lock(id).await;
        let current = self.load(id).await?;
        StepGate::guard(&current, allowed)?;
        let mut next = current.clone();
        let changed = match data(&current) {
            Some(data) => {
                next.apply_step_data(data)?;
                true
            }
            None => false,
        };
        write.await?;

        if !changed {
            return Ok(current);
        }
        next.updated_at = Utc::now();
        self.repository
            .commit(WorkflowCommit::state(next.clone()))
            .await?;
        Ok(next)
    }

    async fn transact<T, F>(
        &self,
        id: &str,
        allowed: Option<&[Step]>,
        f: F,
    ) -> Result<(WorkflowState, T), EngineError>
    where
        F: FnOnce(&mut WorkflowState, &mut CommitExtras) -> Result<T, EngineError>,
    {
        let _guard = self.lock(id).await;
        let current = self.load(id).await?;
        if let Some(allowed) = allowed {
            StepGate::guard(&current, allowed)?;
        }

        let mut next = current.clone();
        let mut extras = CommitExtras::default();
        let out = f(&mut next, &mut extras)?;
        next.updated_at = Utc::now();

        self.repository
            .commit(WorkflowCommit {
                state: next.clone(),
                snapshot: extras.snapshot,
                history: extras.history,
            })
            .await?;
        Ok((next, out))
    }

    /// Apply `f` to a copy of the workflow and persist it if `f` succeeds.
    pub async fn mutate<T, F>(
        &self,
        id: &str,
        allowed: Option<&[Step]>,
        f: F,
    ) -> Result<(WorkflowState, T), EngineError>
    where
        F: FnOnce(&mut WorkflowState) -> Result<T, EngineError>,
    {
        self.transact(id, allowed, |state, _| f(state)).await
    }

    /// Replace the bag of the workflow's current step.
    pub async fn update_step_data(&self, id: &str, data: StepData) -> Result<WorkflowState, EngineError> {
        let step = data.step();
        let (state, _) = self
            .mutate(id, Some(std::slice::from_ref(&step)), |state| state.apply_step_data(data))
            .await?;
        tracing::debug!(workflow_id = id, step = %step, "Step data updated");
        Ok(state)
    }

    /// Advance to the next step, snapshotting the state being left.
    pub async fn advance_to_step(&self, id: &str, target: Step) -> Result<(WorkflowState, Step), EngineError> {
        let (state, from) = self
            .transact(id, None, |state, extras| {
                let snapshot = WorkflowSnapshot::capture(state);
                let from = state.advance_to(target)?;
                extras.snapshot = Some(snapshot);
                Ok(from)
            })
            .await?;
        tracing::info!(workflow_id = id, from = %from, to = %target, "Workflow advanced");
        Ok((state, from))
    }

    /// Move back to an earlier step or restore a snapshot.
    ///
    /// Bags of steps after the landing step are cleared; snapshots and the
    /// generation history are kept. A restored coverage bag keeps the live
    /// bag's generation rounds.
    pub async fn rollback_to_step(
        &self,
        id: &str,
        target: RollbackTarget,
    ) -> Result<(WorkflowState, Step), EngineError> {
        self.load(id).await?;
        let snapshot = match &target {
            RollbackTarget::Snapshot(snapshot_id) => Some(
                self.repository
                    .snapshots(id)
                    .await?
                    .into_iter()
                    .find(|s| &s.snapshot_id == snapshot_id)
                    .ok_or_else(|| {
                        EngineError::validation(format!(
                            "snapshot '{}' not found for workflow '{}'",
                            snapshot_id, id
                        ))
                    })?,
            ),
            RollbackTarget::Step(_) => None,
        };

        let (state, from) = self
            .mutate(id, None, |state| match (&target, snapshot) {
                (RollbackTarget::Step(step), _) => state.rollback_to(*step),
                (RollbackTarget::Snapshot(_), Some(snapshot)) => {
                    let from = state.current_step;
                    let mut probe = state.clone();
                    probe.rollback_to(snapshot.step)?;
                    let mut restored = snapshot.state;
                    restored.id = state.id.clone();
                    restored.created_at = state.created_at;
                    restored.clear_after(snapshot.step);
                    if let (Some(bag), Some(live)) = (
                        restored.coverage_generation.as_mut(),
                        state.coverage_generation.as_ref(),
                    ) {
                        bag.adopt_rounds(live);
                    }
                    *state = restored;
                    Ok(from)
                }
                (RollbackTarget::Snapshot(snapshot_id), None) => Err(EngineError::validation(
                    format!("snapshot '{}' not found", snapshot_id),
                )),
            })
            .await?;
        tracing::info!(workflow_id = id, from = %from, to = %state.current_step, "Workflow rolled back");
        Ok((state, from))
    }

    /// Append a generation round and its audit entry in one commit.
    ///
    /// The coverage bag is created from `before` if it does not exist yet.
    pub async fn record_generation(
        &self,
        id: &str,
        outcome: GenerationOutcome,
        before: &CoverageReport,
        after: &CoverageReport,
        synthetic_count: usize,
    ) -> Result<(WorkflowState, GenerationRound), EngineError> {
        self.transact(id, Some(gate::GENERATE_SYNTHETIC_DATA), |state, extras| {
            let bag = state
                .coverage_generation
                .get_or_insert_with(|| CoverageGeneration::from_report(before, synthetic_count));
            let round = GenerationRoundTracker::record(bag, outcome, before, after, synthetic_count);
            extras.history = Some(GenerationHistoryEntry::new(state.id.clone(), round.clone()));
            Ok(round)
        })
        .await
    }

    pub async fn snapshots(&self, id: &str) -> Result<Vec<SnapshotSummary>, EngineError> {
        Ok(self
            .repository
            .snapshots(id)
            .await?
            .iter()
            .map(SnapshotSummary::from)
            .collect())
    }

    pub async fn generation_history(&self, id: &str) -> Result<Vec<GenerationHistoryEntry>, EngineError> {
        Ok(self.repository.generation_history(id).await?)
    }
}
