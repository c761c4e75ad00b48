//! Training and deployment lifecycle.

pub mod controller;
pub mod job;

pub use controller::LifecycleController;
pub use job::{
    Deployment, JobStatusReport, TrainingJob, TrainingMetrics, TrainingStatus, DEFAULT_BASE_MODEL,
};
