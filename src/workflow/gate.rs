//! Step membership checks for operations.
//!
//! Each gated operation declares the steps in which it may run. The gate is
//! evaluated after the workflow is loaded and before any computation.

use super::state::WorkflowState;
use super::step::Step;
use crate::error::EngineError;

pub const APPLY_TOPIC_HIERARCHY: &[Step] = &[Step::TopicsConfig];
pub const GENERATE_TOPICS: &[Step] = &[Step::TopicsConfig, Step::GraderConfig];
pub const CATEGORIZE_RECORDS: &[Step] = &[Step::Categorize];
pub const ANALYZE_COVERAGE: &[Step] = &[Step::CoverageGeneration];
pub const GENERATE_SYNTHETIC_DATA: &[Step] = &[Step::CoverageGeneration];
pub const CONFIGURE_GRADER: &[Step] = &[Step::GraderConfig];
pub const TEST_GRADER_SAMPLE: &[Step] = &[Step::GraderConfig, Step::DryRun];
pub const RUN_DRY_RUN: &[Step] = &[Step::DryRun];
pub const START_TRAINING: &[Step] = &[Step::Training];
pub const CHECK_TRAINING_STATUS: &[Step] = &[Step::Training, Step::Deployment, Step::Completed];
pub const DEPLOY_MODEL: &[Step] = &[Step::Deployment];

/// Rejects operations whose allowed steps exclude the current step.
pub struct StepGate;

impl StepGate {
    pub fn guard(state: &WorkflowState, allowed: &[Step]) -> Result<(), EngineError> {
        if allowed.contains(&state.current_step) {
            Ok(())
        } else {
            Err(EngineError::StepMismatch {
                current: state.current_step,
                allowed: allowed.to_vec(),
            })
        }
    }
}
