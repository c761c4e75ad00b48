//! Topic generation and record classification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use super::records::DatasetRecord;
use crate::error::CollaboratorError;
use crate::llm::{complete, parse_json_response, GenerationRequest, LlmProvider, Message};

/// Maximum number of sample inputs shown to the topic generator.
pub const MAX_SAMPLE_INPUTS: usize = 20;

/// Records classified per LLM request.
const CLASSIFY_BATCH_SIZE: usize = 20;

/// Input for generating a topic hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicGenerationRequest {
    pub goals: String,
    /// Representative user messages from the dataset.
    pub sample_inputs: Vec<String>,
    pub max_depth: usize,
    /// Children per node.
    pub degree: usize,
}

/// A topic chosen for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub record_id: String,
    pub topic: String,
    pub confidence: f64,
}

/// Proposes topic hierarchies and assigns records to leaf topics.
#[async_trait]
pub trait TopicService: Send + Sync {
    /// Topic paths from root to leaf, e.g. `["Billing", "Refunds"]`.
    async fn generate_topic_paths(
        &self,
        request: &TopicGenerationRequest,
    ) -> Result<Vec<Vec<String>>, CollaboratorError>;

    /// Assign each record to one of `topics`.
    ///
    /// Records the service cannot place may be omitted.
    async fn classify_records(
        &self,
        records: &[DatasetRecord],
        topics: &[String],
    ) -> Result<Vec<TopicAssignment>, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct TopicPathsResponse {
    paths: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    assignments: Vec<TopicAssignment>,
}

/// Topic service backed by a chat model.
pub struct LlmTopicService {
    llm: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmTopicService {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            model: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

fn topic_prompt(request: &TopicGenerationRequest) -> String {
    let samples = request
        .sample_inputs
        .iter()
        .take(MAX_SAMPLE_INPUTS)
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Training goals: {}\n\n\
         Sample user messages:\n{}\n\n\
         Propose a topic hierarchy at most {} levels deep with about {} children per node.\n\
         Return JSON: {{\"paths\": [[\"Top\", \"Sub\"], ...]}} listing every root-to-leaf path.",
        request.goals, samples, request.max_depth, request.degree
    )
}

fn classify_prompt(records: &[DatasetRecord], topics: &[String]) -> String {
    let listed = records
        .iter()
        .map(|r| {
            let text: String = r.first_user_message().unwrap_or("").chars().take(500).collect();
            format!("- id={} : {}", r.id, text)
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Topics: {}\n\nRecords:\n{}\n\n\
         Assign each record to exactly one topic from the list with a confidence between 0 and 1.\n\
         Return JSON: {{\"assignments\": [{{\"record_id\": \"...\", \"topic\": \"...\", \"confidence\": 0.9}}]}}",
        topics.join(", "),
        listed
    )
}

#[async_trait]
impl TopicService for LlmTopicService {
    async fn generate_topic_paths(
        &self,
        request: &TopicGenerationRequest,
    ) -> Result<Vec<Vec<String>>, CollaboratorError> {
        let llm_request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system("You organize conversation datasets into topic taxonomies."),
                Message::user(topic_prompt(request)),
            ],
        )
        .with_temperature(0.3)
        .json_output();

        let content = complete(self.llm.as_ref(), llm_request).await?;
        let response: TopicPathsResponse = parse_json_response(&content)?;
        let paths: Vec<Vec<String>> = response
            .paths
            .into_iter()
            .map(|path| path.into_iter().take(request.max_depth.max(1)).collect::<Vec<_>>())
            .filter(|path| !path.is_empty())
            .collect();
        tracing::debug!(paths = paths.len(), "Generated topic paths");
        Ok(paths)
    }

    async fn classify_records(
        &self,
        records: &[DatasetRecord],
        topics: &[String],
    ) -> Result<Vec<TopicAssignment>, CollaboratorError> {
        if topics.is_empty() {
            return Err(CollaboratorError::TopicService("no topics to classify into".into()));
        }
        let known: HashSet<&str> = topics.iter().map(String::as_str).collect();
        let mut assignments = Vec::with_capacity(records.len());

        for batch in records.chunks(CLASSIFY_BATCH_SIZE) {
            let llm_request = GenerationRequest::new(
                self.model.clone(),
                vec![
                    Message::system("You classify conversations into topics."),
                    Message::user(classify_prompt(batch, topics)),
                ],
            )
            .with_temperature(0.0)
            .json_output();

            let content = complete(self.llm.as_ref(), llm_request).await?;
            let response: ClassificationResponse = parse_json_response(&content)?;
            let batch_ids: HashSet<&str> = batch.iter().map(|r| r.id.as_str()).collect();
            assignments.extend(response.assignments.into_iter().filter_map(|mut a| {
                if !batch_ids.contains(a.record_id.as_str()) || !known.contains(a.topic.as_str()) {
                    tracing::warn!(record_id = %a.record_id, topic = %a.topic, "Dropping unknown assignment");
                    return None;
                }
                a.confidence = a.confidence.clamp(0.0, 1.0);
                Some(a)
            }));
        }
        Ok(assignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use serde_json::json;

    struct FixedLlm(String);

    #[async_trait]
    impl LlmProvider for FixedLlm {
        async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
            Ok(GenerationResponse {
                id: "resp".into(),
                model: request.model,
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.0.clone()),
                    finish_reason: "stop".into(),
                }],
                usage: Usage::default(),
            })
        }
    }

    fn service(reply: &str) -> LlmTopicService {
        LlmTopicService::new(Arc::new(FixedLlm(reply.to_string())))
    }

    #[tokio::test]
    async fn test_generate_paths_truncates_depth() {
        let svc = service(r#"{"paths": [["Billing", "Refunds", "Late"], ["Shipping"], []]}"#);
        let paths = svc
            .generate_topic_paths(&TopicGenerationRequest {
                goals: "support".into(),
                sample_inputs: vec!["where is my order".into()],
                max_depth: 2,
                degree: 2,
            })
            .await
            .expect("should generate");
        assert_eq!(
            paths,
            vec![vec!["Billing".to_string(), "Refunds".to_string()], vec!["Shipping".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_classify_drops_unknown_topics_and_records() {
        let svc = service(
            r#"{"assignments": [
                {"record_id": "r1", "topic": "Billing", "confidence": 1.4},
                {"record_id": "r2", "topic": "Weather", "confidence": 0.9},
                {"record_id": "zz", "topic": "Billing", "confidence": 0.9}
            ]}"#,
        );
        let records = vec![
            DatasetRecord::new("r1", json!({})),
            DatasetRecord::new("r2", json!({})),
        ];
        let topics = vec!["Billing".to_string(), "Shipping".to_string()];
        let assignments = svc.classify_records(&records, &topics).await.expect("should classify");
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].record_id, "r1");
        assert_eq!(assignments[0].confidence, 1.0);

        assert!(svc.classify_records(&records, &[]).await.is_err());
    }

    #[test]
    fn test_topic_prompt_limits_samples() {
        let request = TopicGenerationRequest {
            goals: "g".into(),
            sample_inputs: (0..30).map(|i| format!("sample {}", i)).collect(),
            max_depth: 3,
            degree: 3,
        };
        let prompt = topic_prompt(&request);
        assert!(prompt.contains("20. sample 19"));
        assert!(!prompt.contains("sample 20"));
    }
}
