//! The fine-tuning workflow engine.
//!
//! [`FinetuneEngine`] exposes one async method per operation. A gated
//! operation loads its workflow and checks the step, calls collaborators
//! outside the workflow lock, then persists through the [`WorkflowStore`],
//! which checks the step again before writing. Dataset writes that must agree
//! with a step bag run inside the lock through `WorkflowStore::write_through`.
//!
//! Parameters are plain `Deserialize` structs and results are `Serialize`
//! structs, so the same methods back both the JSON operation registry and
//! direct library use.

mod coverage;
mod dataset;
mod evaluation;
mod lifecycle;
mod topics;
mod workflow;

pub use coverage::{
    AnalyzeCoverageParams, CoverageAnalysis, GenerateSyntheticParams, SyntheticGenerationResult,
};
pub use dataset::{
    DatasetParams, DatasetStats, RecordUpdated, RecordUpdates, RecordValidationResult,
    SanitizationSummary, UpdateRecordParams, UpdatedRecord,
};
pub use evaluation::{
    ConfigureGraderParams, DryRunParams, DryRunReport, GraderConfigured, GraderSampleResult,
    TestGraderParams,
};
pub use lifecycle::{
    CheckTrainingParams, DeployModelParams, DeploymentResult, StartTrainingParams,
    TrainingStarted, TrainingStatusResult,
};
pub use topics::{
    ApplyHierarchyParams, CategorizeParams, CategorizationResult, GenerateTopicsParams,
    HierarchyApplied, TopicsGenerated,
};
pub use workflow::{
    AdvanceParams, RollbackParams, RollbackResult, StartWorkflowParams, StatusParams,
    StepTransition, WorkflowStarted, WorkflowStatus,
};

use std::sync::Arc;

use crate::collaborators::{
    DatasetInfo, DatasetRecord, Grader, RecordStore, SyntheticGenerator, TopicService,
    TrainingBackend,
};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::hierarchy::TopicHierarchy;
use crate::metrics::MetricsCollector;
use crate::training::LifecycleController;
use crate::validation::RecordValidator;
use crate::workflow::WorkflowStore;

/// The services an engine calls out to.
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub topics: Arc<dyn TopicService>,
    pub generator: Arc<dyn SyntheticGenerator>,
    pub grader: Arc<dyn Grader>,
    pub training: Arc<dyn TrainingBackend>,
}

/// Drives fine-tuning workflows through their steps.
pub struct FinetuneEngine {
    store: Arc<WorkflowStore>,
    collaborators: Collaborators,
    config: EngineConfig,
    validator: RecordValidator,
    controller: LifecycleController,
    metrics: MetricsCollector,
}

impl FinetuneEngine {
    pub fn new(store: WorkflowStore, collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            store: Arc::new(store),
            collaborators,
            config,
            validator: RecordValidator::new(),
            controller: LifecycleController::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Replace the record validator used for intake, generation and training.
    pub fn with_validator(mut self, validator: RecordValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    async fn dataset(&self, dataset_id: &str) -> Result<DatasetInfo, EngineError> {
        self.collaborators
            .records
            .get_dataset(dataset_id)
            .await?
            .ok_or_else(|| EngineError::DatasetNotFound(dataset_id.to_string()))
    }

    async fn records(&self, dataset_id: &str) -> Result<Vec<DatasetRecord>, EngineError> {
        Ok(self.collaborators.records.get_records(dataset_id).await?)
    }

    /// The dataset's stored hierarchy, which must have at least one topic
    /// and unique leaf names.
    fn hierarchy(dataset: &DatasetInfo) -> Result<TopicHierarchy, EngineError> {
        let config = dataset.topic_hierarchy.as_ref().ok_or_else(|| {
            EngineError::MissingPrerequisite(format!(
                "dataset '{}' has no topic hierarchy; apply or generate one first",
                dataset.id
            ))
        })?;
        let hierarchy = TopicHierarchy::from_nodes(config.hierarchy.clone());
        hierarchy.validate()?;
        Ok(hierarchy)
    }
}

fn require_text(value: &str, field: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field: &str,
) -> Result<T, EngineError> {
    if !(value >= min && value <= max) {
        return Err(EngineError::validation(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(value)
}
