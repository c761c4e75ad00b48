//! Fine-tuning backend boundary.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CollaboratorError;
use crate::training::JobStatusReport;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A fine-tuning job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSubmission {
    pub dataset_id: String,
    pub display_name: String,
    pub base_model: String,
    #[serde(default)]
    pub training_params: serde_json::Value,
    /// Training record payloads.
    pub records: Vec<serde_json::Value>,
}

/// Submits, polls and deploys fine-tuning jobs.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// Submit a job and return its id.
    async fn submit_job(&self, submission: &TrainingSubmission) -> Result<String, CollaboratorError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, CollaboratorError>;

    /// Deploy a fine-tuned model and return its endpoint.
    async fn deploy(&self, model_id: &str, deployment_name: &str) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Serialize)]
struct DeployRequest<'a> {
    model_id: &'a str,
    deployment_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeployResponse {
    endpoint: String,
}

/// JSON-over-HTTP training backend.
///
/// Endpoints: `POST /finetune/jobs`, `GET /finetune/jobs/{id}` and
/// `POST /deployments`.
pub struct HttpTrainingBackend {
    api_base: String,
    api_key: Option<String>,
    http_client: Client,
}

impl HttpTrainingBackend {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Result<Self, CollaboratorError> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CollaboratorError::TrainingBackend(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CollaboratorError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| CollaboratorError::TrainingBackend(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::TrainingBackend(format!(
                "backend returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        response
            .json()
            .await
            .map_err(|e| CollaboratorError::TrainingBackend(format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl TrainingBackend for HttpTrainingBackend {
    async fn submit_job(&self, submission: &TrainingSubmission) -> Result<String, CollaboratorError> {
        let url = format!("{}/finetune/jobs", self.api_base);
        tracing::info!(
            dataset_id = %submission.dataset_id,
            base_model = %submission.base_model,
            records = submission.records.len(),
            "Submitting training job"
        );
        let response: SubmitResponse = self.send(self.http_client.post(&url).json(submission)).await?;
        Ok(response.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusReport, CollaboratorError> {
        let url = format!("{}/finetune/jobs/{}", self.api_base, job_id);
        self.send(self.http_client.get(&url)).await
    }

    async fn deploy(&self, model_id: &str, deployment_name: &str) -> Result<String, CollaboratorError> {
        let url = format!("{}/deployments", self.api_base);
        let body = DeployRequest {
            model_id,
            deployment_name,
        };
        let response: DeployResponse = self.send(self.http_client.post(&url).json(&body)).await?;
        Ok(response.endpoint)
    }
}
