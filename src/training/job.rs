//! Training job and deployment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base model used when a caller does not name one.
pub const DEFAULT_BASE_MODEL: &str = "llama-v3-8b-instruct";

/// Lifecycle state of an external training job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl TrainingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TrainingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metrics reported by the training backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_reward: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_reward: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<u32>,
}

/// Step data for `training`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: String,
    pub base_model: String,
    pub status: TrainingStatus,
    /// Percent complete, 0-100.
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub training_params: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_tuned_model_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<TrainingMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl TrainingJob {
    /// A freshly submitted job.
    pub fn queued(
        job_id: impl Into<String>,
        base_model: impl Into<String>,
        training_params: serde_json::Value,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            base_model: base_model.into(),
            status: TrainingStatus::Queued,
            progress: 0,
            started_at: Utc::now(),
            training_params,
            fine_tuned_model_id: None,
            error: None,
            metrics: None,
            last_checked_at: None,
        }
    }

    /// Fold a backend status report into this job.
    ///
    /// A completed job always reports 100% progress. The fine-tuned model id
    /// is only kept once the job has completed.
    pub fn apply_report(&mut self, report: &JobStatusReport) {
        self.status = report.status;
        self.progress = match report.status {
            TrainingStatus::Completed => 100,
            _ => report.progress.min(100),
        };
        self.fine_tuned_model_id = match report.status {
            TrainingStatus::Completed => report
                .fine_tuned_model_id
                .clone()
                .or_else(|| self.fine_tuned_model_id.clone()),
            _ => None,
        };
        self.error = report.error.clone();
        if report.metrics.is_some() {
            self.metrics = report.metrics.clone();
        }
        self.last_checked_at = Some(Utc::now());
    }

    /// The fine-tuned model, available only once training completed.
    pub fn deployable_model(&self) -> Option<&str> {
        match self.status {
            TrainingStatus::Completed => self.fine_tuned_model_id.as_deref(),
            _ => None,
        }
    }
}

/// Status of a job as reported by the training backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: TrainingStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub fine_tuned_model_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metrics: Option<TrainingMetrics>,
}

/// Step data for `deployment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub model_id: String,
    pub deployment_name: String,
    pub endpoint: String,
    pub deployed_at: DateTime<Utc>,
}
