//! Persisted workflow state and its step-scoped data bags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::step::{Step, StepStatus};
use crate::collaborators::GraderType;
use crate::dry_run::DryRunResult;
use crate::error::EngineError;
use crate::generation::CoverageGeneration;
use crate::training::{Deployment, TrainingJob, TrainingStatus};
use crate::validation::ValidationReport;

/// How a topic hierarchy was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyMethod {
    Auto,
    Manual,
}

/// Step data for `topics_config`.
///
/// The hierarchy itself lives on the dataset; only its measures are kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsConfig {
    pub topic_count: usize,
    pub depth: usize,
    pub method: HierarchyMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<usize>,
    pub configured_at: DateTime<Utc>,
}

/// Per-topic assignment tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignmentStats {
    pub count: usize,
    pub avg_confidence: f64,
}

/// Step data for `categorize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Categorization {
    pub assigned_count: usize,
    pub low_confidence_count: usize,
    pub confidence_threshold: f64,
    pub by_topic: BTreeMap<String, TopicAssignmentStats>,
    pub categorized_at: DateTime<Utc>,
}

/// Step data for `grader_config`.
///
/// The full evaluator configuration lives on the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraderConfigInfo {
    pub grader_type: GraderType,
    pub configured_at: DateTime<Utc>,
}

/// A step-scoped data update, tagged by the step that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "data", rename_all = "snake_case")]
pub enum StepData {
    TopicsConfig(TopicsConfig),
    Categorize(Categorization),
    CoverageGeneration(CoverageGeneration),
    GraderConfig(GraderConfigInfo),
    DryRun(DryRunResult),
    Training(TrainingJob),
    Deployment(Deployment),
}

impl StepData {
    /// The step whose bag this data replaces.
    pub fn step(&self) -> Step {
        match self {
            Self::TopicsConfig(_) => Step::TopicsConfig,
            Self::Categorize(_) => Step::Categorize,
            Self::CoverageGeneration(_) => Step::CoverageGeneration,
            Self::GraderConfig(_) => Step::GraderConfig,
            Self::DryRun(_) => Step::DryRun,
            Self::Training(_) => Step::Training,
            Self::Deployment(_) => Step::Deployment,
        }
    }
}

/// One dataset's refinement-to-deployment state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub dataset_id: String,
    pub training_goals: String,
    pub current_step: Step,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_validation: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics_config: Option<TopicsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorization: Option<Categorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_generation: Option<CoverageGeneration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grader_config: Option<GraderConfigInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<DryRunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<TrainingJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<Deployment>,
}

impl WorkflowState {
    /// A new workflow at the first step.
    pub fn new(
        dataset_id: impl Into<String>,
        training_goals: impl Into<String>,
        input_validation: Option<ValidationReport>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            dataset_id: dataset_id.into(),
            training_goals: training_goals.into(),
            current_step: Step::TopicsConfig,
            created_at: now,
            updated_at: now,
            input_validation,
            topics_config: None,
            categorization: None,
            coverage_generation: None,
            grader_config: None,
            dry_run: None,
            training: None,
            deployment: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.current_step.is_terminal()
    }

    /// Replace the bag owned by `data`'s step.
    ///
    /// Only the bag of the current step may be written.
    pub fn apply_step_data(&mut self, data: StepData) -> Result<(), EngineError> {
        let step = data.step();
        if step != self.current_step {
            return Err(EngineError::StepMismatch {
                current: self.current_step,
                allowed: vec![step],
            });
        }
        match data {
            StepData::TopicsConfig(v) => self.topics_config = Some(v),
            StepData::Categorize(v) => self.categorization = Some(v),
            StepData::CoverageGeneration(v) => self.coverage_generation = Some(v),
            StepData::GraderConfig(v) => self.grader_config = Some(v),
            StepData::DryRun(v) => self.dry_run = Some(v),
            StepData::Training(v) => self.training = Some(v),
            StepData::Deployment(v) => self.deployment = Some(v),
        }
        Ok(())
    }

    /// Whether the bag owned by `step` is populated.
    pub fn has_step_data(&self, step: Step) -> bool {
        match step {
            Step::TopicsConfig => self.topics_config.is_some(),
            Step::Categorize => self.categorization.is_some(),
            Step::CoverageGeneration => self.coverage_generation.is_some(),
            Step::GraderConfig => self.grader_config.is_some(),
            Step::DryRun => self.dry_run.is_some(),
            Step::Training => self.training.is_some(),
            Step::Deployment => self.deployment.is_some(),
            Step::Completed => false,
        }
    }

    fn clear_step_data(&mut self, step: Step) {
        match step {
            Step::TopicsConfig => self.topics_config = None,
            Step::Categorize => self.categorization = None,
            Step::CoverageGeneration => self.coverage_generation = None,
            Step::GraderConfig => self.grader_config = None,
            Step::DryRun => self.dry_run = None,
            Step::Training => self.training = None,
            Step::Deployment => self.deployment = None,
            Step::Completed => {}
        }
    }

    /// Drop every bag owned by a step after `step`.
    pub fn clear_after(&mut self, step: Step) {
        for later in Step::ALL.iter().copied().filter(|s| *s > step) {
            self.clear_step_data(later);
        }
    }

    /// Why the current step may not be left yet, if anything blocks it.
    pub fn exit_blocker(&self) -> Option<String> {
        match self.current_step {
            Step::TopicsConfig => match &self.topics_config {
                Some(config) if config.topic_count > 0 => None,
                _ => Some("a topic hierarchy with at least one topic must be configured".into()),
            },
            Step::Categorize => self
                .categorization
                .is_none()
                .then(|| "records must be categorized first".into()),
            Step::CoverageGeneration => self
                .coverage_generation
                .is_none()
                .then(|| "coverage must be analyzed first".into()),
            Step::GraderConfig => self
                .grader_config
                .is_none()
                .then(|| "a grader must be configured first".into()),
            Step::DryRun => match &self.dry_run {
                None => Some("a dry run must be completed first".into()),
                Some(result) if !result.verdict.allows_training() => Some(format!(
                    "dry run verdict is {}; resolve it before training",
                    result.verdict
                )),
                Some(_) => None,
            },
            Step::Training => match &self.training {
                Some(job) if job.status == TrainingStatus::Completed => None,
                Some(job) => Some(format!("training job is {}", job.status)),
                None => Some("training has not been started".into()),
            },
            Step::Deployment => Some("workflows complete only by deploying a model".into()),
            Step::Completed => Some("workflow is already completed".into()),
        }
    }

    /// Move to the immediately following step.
    pub fn advance_to(&mut self, target: Step) -> Result<Step, EngineError> {
        let from = self.current_step;
        let transition_error = |reason: String| EngineError::InvalidTransition {
            from,
            to: target,
            reason,
        };

        if from.next() != Some(target) {
            return Err(transition_error(format!(
                "steps advance one at a time; the next step is {}",
                from.next().map(|s| s.as_str()).unwrap_or("none")
            )));
        }
        if let Some(reason) = self.exit_blocker() {
            return Err(transition_error(reason));
        }

        self.current_step = target;
        Ok(from)
    }

    /// Move to `completed` after a deployment has been recorded.
    pub fn complete(&mut self) -> Result<Step, EngineError> {
        let from = self.current_step;
        if from != Step::Deployment || self.deployment.is_none() {
            return Err(EngineError::InvalidTransition {
                from,
                to: Step::Completed,
                reason: "a deployment must be recorded at the deployment step".into(),
            });
        }
        self.current_step = Step::Completed;
        Ok(from)
    }

    /// Move back to an earlier step, clearing the bags of every later step.
    pub fn rollback_to(&mut self, target: Step) -> Result<Step, EngineError> {
        let from = self.current_step;
        if from.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from,
                to: target,
                reason: "completed workflows cannot be rolled back".into(),
            });
        }
        if target >= from {
            return Err(EngineError::InvalidTransition {
                from,
                to: target,
                reason: "rollback target must precede the current step".into(),
            });
        }
        self.clear_after(target);
        self.current_step = target;
        Ok(from)
    }

    /// Status of every step, derived from the current step.
    pub fn step_status(&self) -> BTreeMap<Step, StepStatus> {
        Step::ALL
            .iter()
            .map(|step| {
                let status = if *step < self.current_step {
                    StepStatus::Completed
                } else if *step == self.current_step {
                    if *step == Step::Completed {
                        StepStatus::Completed
                    } else if *step == Step::Training
                        && self.training.as_ref().map(|j| j.status) == Some(TrainingStatus::Failed)
                    {
                        StepStatus::Failed
                    } else {
                        StepStatus::InProgress
                    }
                } else {
                    StepStatus::Pending
                };
                (*step, status)
            })
            .collect()
    }
}
