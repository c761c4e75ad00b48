//! LLM integration for finetune-forge.
//!
//! ```ignore
//! use finetune_forge::llm::{LiteLlmClient, Message, GenerationRequest, LlmProvider};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Hello!")]);
//! let response = client.generate(request).await?;
//! ```

pub mod json;
pub mod litellm;

pub use json::{extract_json, parse_json_response};
pub use litellm::{
    complete, Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message,
    Usage, DEFAULT_MODEL,
};
