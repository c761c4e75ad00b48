//! finetune-forge: guided fine-tuning workflows for conversation datasets.
//!
//! A workflow walks one dataset through topic configuration, categorization,
//! coverage balancing with synthetic data, grader setup, a dry run, training
//! and deployment. Operations are gated on the workflow's current step and
//! exposed both as [`FinetuneEngine`] methods and through the JSON
//! [`OperationRegistry`].

pub mod cli;
pub mod collaborators;
pub mod config;
pub mod coverage;
pub mod dry_run;
pub mod engine;
pub mod error;
pub mod generation;
pub mod hierarchy;
pub mod llm;
pub mod metrics;
pub mod tools;
pub mod training;
pub mod validation;
pub mod workflow;

pub use config::{ConfigError, EngineConfig};
pub use engine::{Collaborators, FinetuneEngine};
pub use error::{CollaboratorError, EngineError, ErrorKind, LlmError, StoreError};
pub use tools::{Operation, OperationRegistry, OperationResponse};
pub use workflow::{Step, WorkflowState, WorkflowStore};
