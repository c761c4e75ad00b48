//! Error types for finetune-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Workflow engine operations (validation, state, domain, external)
//! - Workflow persistence
//! - External collaborators (record store, LLM services, training backend)
//! - LLM API interactions

use serde::Serialize;
use thiserror::Error;

use crate::workflow::Step;

/// Coarse classification of an [`EngineError`], reported in operation envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input.
    Validation,
    /// Unknown workflow, wrong step, or absent prerequisite data.
    State,
    /// A computed result is structurally invalid.
    Domain,
    /// A collaborator failed.
    External,
    /// Persistence failure inside the engine.
    Internal,
}

/// Errors returned by workflow engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    #[error("Dataset '{0}' not found")]
    DatasetNotFound(String),

    #[error(
        "Step mismatch: workflow is at '{current}', operation requires one of [{}]",
        join_steps(.allowed)
    )]
    StepMismatch { current: Step, allowed: Vec<Step> },

    #[error("Invalid step transition from '{from}' to '{to}': {reason}")]
    InvalidTransition { from: Step, to: Step, reason: String },

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("Workflow conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Domain(String),

    #[error(transparent)]
    External(#[from] CollaboratorError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Classify this error for the operation envelope.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::WorkflowNotFound(_)
            | Self::DatasetNotFound(_)
            | Self::StepMismatch { .. }
            | Self::InvalidTransition { .. }
            | Self::MissingPrerequisite(_)
            | Self::Conflict(_) => ErrorKind::State,
            Self::Domain(_) => ErrorKind::Domain,
            Self::External(_) => ErrorKind::External,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

fn join_steps(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by workflow repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

/// Errors surfaced by external collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Record store error: {0}")]
    RecordStore(String),

    #[error("Topic service error: {0}")]
    TopicService(String),

    #[error("Synthetic generator error: {0}")]
    Generator(String),

    #[error("Grader error: {0}")]
    Grader(String),

    #[error("Training backend error: {0}")]
    TrainingBackend(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_mismatch_message_lists_allowed_steps() {
        let err = EngineError::StepMismatch {
            current: Step::Categorize,
            allowed: vec![Step::TopicsConfig, Step::GraderConfig],
        };
        let message = err.to_string();
        assert!(message.contains("'categorize'"));
        assert!(message.contains("topics_config, grader_config"));
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            EngineError::validation("missing workflow_id").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            EngineError::Domain("no leaves".into()).kind(),
            ErrorKind::Domain
        );
        let external: EngineError = CollaboratorError::Grader("timeout".into()).into();
        assert_eq!(external.kind(), ErrorKind::External);
        assert_eq!(external.to_string(), "Grader error: timeout");
    }
}
