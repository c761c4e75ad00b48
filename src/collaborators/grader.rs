//! Record grading.
//!
//! A dataset carries one [`EvaluationConfig`]. The dry run and grader test
//! operations hand sampled records to a [`Grader`], which returns one score
//! in `[0, 1]` per record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::records::DatasetRecord;
use crate::error::{CollaboratorError, EngineError};
use crate::llm::{complete, parse_json_response, GenerationRequest, LlmProvider, Message};

/// Judge requests in flight at once per grader.
pub const DEFAULT_GRADING_CONCURRENCY: usize = 8;

/// Output schema requested from LLM judges when none is given.
pub const DEFAULT_OUTPUT_SCHEMA: &str = r#"{"type":"object","properties":{"score":{"type":"number"},"reasoning":{"type":"string"}},"required":["score","reasoning"]}"#;

/// Kind of evaluator attached to a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraderType {
    LlmAsJudge,
    Js,
}

impl GraderType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LlmAsJudge => "llm_as_judge",
            Self::Js => "js",
        }
    }
}

impl fmt::Display for GraderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GraderType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm_as_judge" => Ok(Self::LlmAsJudge),
            "js" => Ok(Self::Js),
            other => Err(EngineError::validation(format!(
                "grader_type must be \"llm_as_judge\" or \"js\", got '{}'",
                other
            ))),
        }
    }
}

fn default_judge_model() -> String {
    crate::llm::DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_output_schema() -> String {
    DEFAULT_OUTPUT_SCHEMA.to_string()
}

/// Settings for an LLM-as-judge evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmJudgeConfig {
    pub prompt_template: String,
    #[serde(default = "default_output_schema")]
    pub output_schema: String,
    #[serde(default = "default_judge_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

/// Settings for a script evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsGraderConfig {
    pub script: String,
}

/// Evaluator stored on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(flatten)]
    pub grader: GraderSettings,
    pub updated_at: DateTime<Utc>,
}

/// Evaluator settings, tagged by grader type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraderSettings {
    LlmAsJudge(LlmJudgeConfig),
    Js(JsGraderConfig),
}

impl EvaluationConfig {
    /// Build a config from a grader type and its raw settings object.
    ///
    /// `llm_as_judge` requires `prompt_template`; `js` requires `script`.
    pub fn from_params(grader_type: GraderType, config: &serde_json::Value) -> Result<Self, EngineError> {
        let object = config
            .as_object()
            .ok_or_else(|| EngineError::validation("config object is required"))?;
        let text = |key: &str| {
            object
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        };

        let grader = match grader_type {
            GraderType::LlmAsJudge => {
                let prompt_template = text("prompt_template").ok_or_else(|| {
                    EngineError::validation("prompt_template is required for llm_as_judge")
                })?;
                let temperature = object.get("temperature").and_then(|v| v.as_f64()).unwrap_or(0.0);
                if !(0.0..=2.0).contains(&temperature) {
                    return Err(EngineError::validation("temperature must be between 0 and 2"));
                }
                let max_tokens = match object.get("max_tokens").and_then(|v| v.as_u64()) {
                    Some(0) => return Err(EngineError::validation("max_tokens must be positive")),
                    Some(n) => u32::try_from(n)
                        .map_err(|_| EngineError::validation("max_tokens is too large"))?,
                    None => default_max_tokens(),
                };
                GraderSettings::LlmAsJudge(LlmJudgeConfig {
                    prompt_template,
                    output_schema: text("output_schema").unwrap_or_else(default_output_schema),
                    model: text("model").unwrap_or_else(default_judge_model),
                    temperature,
                    max_tokens,
                })
            }
            GraderType::Js => {
                let script = text("script")
                    .ok_or_else(|| EngineError::validation("script is required for js evaluator"))?;
                GraderSettings::Js(JsGraderConfig { script })
            }
        };

        Ok(Self {
            grader,
            updated_at: Utc::now(),
        })
    }

    pub fn grader_type(&self) -> GraderType {
        match self.grader {
            GraderSettings::LlmAsJudge(_) => GraderType::LlmAsJudge,
            GraderSettings::Js(_) => GraderType::Js,
        }
    }
}

/// Score assigned to one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeOutcome {
    pub record_id: String,
    pub score: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Scores records against an evaluation config.
#[async_trait]
pub trait Grader: Send + Sync {
    async fn grade(
        &self,
        config: &EvaluationConfig,
        records: &[DatasetRecord],
    ) -> Result<Vec<GradeOutcome>, CollaboratorError>;
}

/// Fill `{{input}}`, `{{output}}` and `{{record}}` placeholders.
pub fn render_prompt(template: &str, record: &DatasetRecord) -> String {
    let field = |key: &str| {
        record
            .data
            .get(key)
            .map(|v| serde_json::to_string_pretty(v).unwrap_or_default())
            .unwrap_or_default()
    };
    template
        .replace("{{input}}", &field("input"))
        .replace("{{output}}", &field("output"))
        .replace(
            "{{record}}",
            &serde_json::to_string_pretty(&record.data).unwrap_or_default(),
        )
}

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    score: f64,
    #[serde(default)]
    reasoning: String,
}

/// Grades records with an LLM judge, one request per record.
///
/// At most `concurrency` requests run at once, across all calls on the
/// same grader.
pub struct LlmJudgeGrader {
    llm: Arc<dyn LlmProvider>,
    permits: Semaphore,
}

impl LlmJudgeGrader {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self::with_concurrency(llm, DEFAULT_GRADING_CONCURRENCY)
    }

    /// A limit of zero is raised to one.
    pub fn with_concurrency(llm: Arc<dyn LlmProvider>, concurrency: usize) -> Self {
        Self {
            llm,
            permits: Semaphore::new(concurrency.max(1)),
        }
    }
}

#[async_trait]
impl Grader for LlmJudgeGrader {
    async fn grade(
        &self,
        config: &EvaluationConfig,
        records: &[DatasetRecord],
    ) -> Result<Vec<GradeOutcome>, CollaboratorError> {
        let judge = match &config.grader {
            GraderSettings::LlmAsJudge(judge) => judge,
            GraderSettings::Js(_) => {
                return Err(CollaboratorError::Grader(
                    "js evaluators are not supported by the LLM judge grader".into(),
                ))
            }
        };

        let system = format!(
            "You are an evaluator. Respond only with JSON matching this schema: {}",
            judge.output_schema
        );

        let grade_futures = records.iter().map(|record| {
            let request = GenerationRequest::new(
                judge.model.clone(),
                vec![
                    Message::system(system.clone()),
                    Message::user(render_prompt(&judge.prompt_template, record)),
                ],
            )
            .with_temperature(judge.temperature)
            .with_max_tokens(judge.max_tokens)
            .json_output();

            async move {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|e| CollaboratorError::Grader(e.to_string()))?;
                let content = complete(self.llm.as_ref(), request).await?;
                let verdict: JudgeVerdict = parse_json_response(&content)?;
                tracing::debug!(record_id = %record.id, score = verdict.score, "Graded record");
                Ok::<_, CollaboratorError>(GradeOutcome {
                    record_id: record.id.clone(),
                    score: verdict.score,
                    reasoning: verdict.reasoning,
                })
            }
        });

        futures::future::join_all(grade_futures)
            .await
            .into_iter()
            .collect()
    }
}
