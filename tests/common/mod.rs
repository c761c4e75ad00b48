//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use finetune_forge::collaborators::{
    DatasetDocument, DatasetInfo, DatasetRecord, EvaluationConfig, GradeOutcome, Grader,
    InMemoryRecordStore, SyntheticGenerator, SyntheticRequest, TopicAssignment,
    TopicGenerationRequest, TopicService, TrainingBackend, TrainingSubmission,
};
use finetune_forge::training::{JobStatusReport, TrainingStatus};
use finetune_forge::{
    Collaborators, CollaboratorError, EngineConfig, FinetuneEngine, OperationRegistry,
    WorkflowStore,
};

pub const DATASET_ID: &str = "support";

pub fn conversation(question: &str) -> Value {
    json!({
        "input": {
            "messages": [
                {"role": "user", "content": question},
                {"role": "assistant", "content": "Happy to help with that."}
            ]
        }
    })
}

/// Six refund questions, one invoice question and one shipping question.
pub fn support_dataset() -> DatasetDocument {
    let mut records: Vec<DatasetRecord> = (0..6)
        .map(|i| {
            DatasetRecord::new(
                format!("refund-{}", i),
                conversation(&format!("How do I get a refund for order {}?", i)),
            )
        })
        .collect();
    records.push(DatasetRecord::new(
        "invoice-0",
        conversation("Where can I download my invoice?"),
    ));
    records.push(DatasetRecord::new(
        "late-0",
        conversation("My parcel is late, where is it?"),
    ));
    DatasetDocument::new(DatasetInfo::new(DATASET_ID, "Support"), records)
}

/// Builds a three-leaf hierarchy and classifies records by keyword.
pub struct KeywordTopics;

#[async_trait]
impl TopicService for KeywordTopics {
    async fn generate_topic_paths(
        &self,
        _request: &TopicGenerationRequest,
    ) -> Result<Vec<Vec<String>>, CollaboratorError> {
        Ok(vec![
            vec!["Billing".into(), "Refunds".into()],
            vec!["Billing".into(), "Invoices".into()],
            vec!["Shipping".into(), "Delays".into()],
        ])
    }

    async fn classify_records(
        &self,
        records: &[DatasetRecord],
        _topics: &[String],
    ) -> Result<Vec<TopicAssignment>, CollaboratorError> {
        Ok(records
            .iter()
            .filter_map(|record| {
                let text = record.first_user_message()?.to_lowercase();
                let topic = if text.contains("refund") {
                    "Refunds"
                } else if text.contains("invoice") {
                    "Invoices"
                } else if text.contains("late") {
                    "Delays"
                } else {
                    return None;
                };
                Some(TopicAssignment {
                    record_id: record.id.clone(),
                    topic: topic.into(),
                    confidence: 0.9,
                })
            })
            .collect())
    }
}

/// Produces `count` valid conversations plus one malformed payload per topic.
#[derive(Default)]
pub struct ScriptedGenerator {
    produced: AtomicUsize,
}

#[async_trait]
impl SyntheticGenerator for ScriptedGenerator {
    async fn generate_records(
        &self,
        request: &SyntheticRequest,
    ) -> Result<Vec<Value>, CollaboratorError> {
        let mut payloads: Vec<Value> = (0..request.count)
            .map(|_| {
                let n = self.produced.fetch_add(1, Ordering::SeqCst);
                conversation(&format!("Synthetic {} question number {}", request.topic, n))
            })
            .collect();
        payloads.push(json!({"input": {"messages": []}}));
        Ok(payloads)
    }
}

/// Gives every record the same score.
pub struct FixedGrader(pub f64);

#[async_trait]
impl Grader for FixedGrader {
    async fn grade(
        &self,
        _config: &EvaluationConfig,
        records: &[DatasetRecord],
    ) -> Result<Vec<GradeOutcome>, CollaboratorError> {
        Ok(records
            .iter()
            .map(|record| GradeOutcome {
                record_id: record.id.clone(),
                score: self.0,
                reasoning: "scripted".into(),
            })
            .collect())
    }
}

/// Training backend whose job status is set by the test.
pub struct ScriptedTraining {
    pub submissions: Mutex<Vec<TrainingSubmission>>,
    pub status: Mutex<JobStatusReport>,
}

impl Default for ScriptedTraining {
    fn default() -> Self {
        Self {
            submissions: Mutex::new(Vec::new()),
            status: Mutex::new(JobStatusReport {
                status: TrainingStatus::Running,
                progress: 10,
                fine_tuned_model_id: None,
                error: None,
                metrics: None,
            }),
        }
    }
}

impl ScriptedTraining {
    pub fn complete(&self, model_id: &str) {
        *self.status.lock().expect("status lock poisoned") = JobStatusReport {
            status: TrainingStatus::Completed,
            progress: 100,
            fine_tuned_model_id: Some(model_id.into()),
            error: None,
            metrics: None,
        };
    }
}

#[async_trait]
impl TrainingBackend for ScriptedTraining {
    async fn submit_job(&self, submission: &TrainingSubmission) -> Result<String, CollaboratorError> {
        let mut submissions = self.submissions.lock().expect("submissions lock poisoned");
        submissions.push(submission.clone());
        Ok(format!("job-{}", submissions.len()))
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatusReport, CollaboratorError> {
        Ok(self.status.lock().expect("status lock poisoned").clone())
    }

    async fn deploy(&self, model_id: &str, deployment_name: &str) -> Result<String, CollaboratorError> {
        Ok(format!("https://models.test/{}/{}", deployment_name, model_id))
    }
}

/// An engine over in-memory collaborators, plus handles to inspect them.
pub struct Harness {
    pub engine: FinetuneEngine,
    pub registry: OperationRegistry,
    pub records: Arc<InMemoryRecordStore>,
    pub training: Arc<ScriptedTraining>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(WorkflowStore::in_memory())
    }

    pub fn with_store(store: WorkflowStore) -> Self {
        let records = Arc::new(InMemoryRecordStore::new());
        records.insert(support_dataset());
        Self::with_parts(store, records, 0.9)
    }

    /// Reuses `records` as is; callers seed it themselves.
    pub fn with_parts(store: WorkflowStore, records: Arc<InMemoryRecordStore>, score: f64) -> Self {
        let training = Arc::new(ScriptedTraining::default());
        let collaborators = Collaborators {
            records: records.clone(),
            topics: Arc::new(KeywordTopics),
            generator: Arc::new(ScriptedGenerator::default()),
            grader: Arc::new(FixedGrader(score)),
            training: training.clone(),
        };
        let config = EngineConfig::default().with_sample_seed(7);
        Self {
            engine: FinetuneEngine::new(store, collaborators, config),
            registry: OperationRegistry::with_default_operations(),
            records,
            training,
        }
    }

    /// Invoke an operation and return its envelope.
    pub async fn call(&self, operation: &str, params: Value) -> Value {
        self.registry
            .invoke(&self.engine, operation, params)
            .await
            .to_json()
    }

    /// Invoke an operation that must succeed.
    pub async fn ok(&self, operation: &str, params: Value) -> Value {
        let response = self.call(operation, params).await;
        assert_eq!(
            response["success"], true,
            "{} should succeed: {}",
            operation, response
        );
        response
    }

    pub async fn start(&self) -> String {
        let response = self
            .ok(
                "start_finetune_workflow",
                json!({"dataset_id": DATASET_ID, "training_goals": "Answer support questions"}),
            )
            .await;
        response["workflow_id"]
            .as_str()
            .expect("should return a workflow id")
            .to_string()
    }

    pub async fn advance(&self, workflow_id: &str, step: &str) {
        self.ok("advance_to_step", json!({"workflow_id": workflow_id, "step": step}))
            .await;
    }

    /// Start a workflow and walk it into `coverage_generation`.
    pub async fn at_coverage(&self) -> String {
        let id = self.start().await;
        self.ok("generate_topics", json!({"workflow_id": id})).await;
        self.advance(&id, "categorize").await;
        self.ok("categorize_records", json!({"workflow_id": id})).await;
        self.advance(&id, "coverage_generation").await;
        id
    }
}
