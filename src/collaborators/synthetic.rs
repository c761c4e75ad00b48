//! Synthetic record generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CollaboratorError;
use crate::generation::GenerationStrategy;
use crate::llm::{complete, parse_json_response, GenerationRequest, LlmProvider, Message};

/// Seed records shown to the generator per topic.
pub const MAX_SEEDS: usize = 10;

/// What to generate for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRequest {
    pub topic: String,
    pub goals: String,
    pub strategy: GenerationStrategy,
    pub count: usize,
    pub max_turns: usize,
    /// Existing record payloads to imitate.
    #[serde(default)]
    pub seeds: Vec<serde_json::Value>,
}

/// Produces new record payloads for a topic.
#[async_trait]
pub trait SyntheticGenerator: Send + Sync {
    /// Record payloads in the dataset's `{"input": {"messages": [...]}}` shape.
    async fn generate_records(
        &self,
        request: &SyntheticRequest,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct GeneratedConversations {
    conversations: Vec<serde_json::Value>,
}

/// Generator backed by a chat model.
pub struct LlmSyntheticGenerator {
    llm: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmSyntheticGenerator {
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

fn generation_prompt(request: &SyntheticRequest) -> String {
    let seeds = request
        .seeds
        .iter()
        .take(MAX_SEEDS)
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Training goals: {goals}\nTopic: {topic}\nStrategy: {instruction}\n\n\
         Example records:\n{seeds}\n\n\
         Write {count} new conversations about the topic, each with at most {turns} user turns.\n\
         Return JSON: {{\"conversations\": [{{\"input\": {{\"messages\": [{{\"role\": \"user\", \"content\": \"...\"}}]}}, \
         \"output\": {{\"messages\": [{{\"role\": \"assistant\", \"content\": \"...\"}}]}}}}]}}",
        goals = request.goals,
        topic = request.topic,
        instruction = request.strategy.instruction(),
        seeds = if seeds.is_empty() { "(none)".to_string() } else { seeds },
        count = request.count,
        turns = request.max_turns,
    )
}

#[async_trait]
impl SyntheticGenerator for LlmSyntheticGenerator {
    async fn generate_records(
        &self,
        request: &SyntheticRequest,
    ) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        if request.count == 0 {
            return Ok(Vec::new());
        }
        let llm_request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system("You write realistic training conversations for fine-tuning."),
                Message::user(generation_prompt(request)),
            ],
        )
        .with_temperature(0.8)
        .json_output();

        let content = complete(self.llm.as_ref(), llm_request).await?;
        let generated: GeneratedConversations = parse_json_response(&content)?;
        let mut conversations = generated.conversations;
        conversations.truncate(request.count);
        tracing::debug!(
            topic = %request.topic,
            requested = request.count,
            generated = conversations.len(),
            "Generated synthetic conversations"
        );
        Ok(conversations)
    }
}
