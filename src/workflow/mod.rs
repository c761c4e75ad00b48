//! Workflow state machine, gating and persistence.
//!
//! A workflow walks a dataset through a fixed sequence of [`Step`]s. Each
//! step owns one data bag on [`WorkflowState`]; the [`WorkflowStore`]
//! serializes mutations per workflow and persists them through a
//! [`WorkflowRepository`].

pub mod gate;
pub mod repository;
pub mod sqlite;
pub mod state;
pub mod step;
pub mod store;

pub use gate::StepGate;
pub use repository::{
    MemoryRepository, SnapshotSummary, WorkflowCommit, WorkflowRepository, WorkflowSnapshot,
};
pub use sqlite::SqliteRepository;
pub use state::{
    Categorization, GraderConfigInfo, HierarchyMethod, StepData, TopicAssignmentStats,
    TopicsConfig, WorkflowState,
};
pub use step::{Step, StepStatus};
pub use store::{RollbackTarget, WorkflowStore};
