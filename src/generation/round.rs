//! Synthetic-data generation strategies and recorded rounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// How synthetic records are derived from seed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    /// Rephrase existing conversations while keeping intent.
    #[default]
    MessageVariation,
    /// Use a handful of seed records as examples for new ones.
    FewShot,
    /// Generate from the topic description alone.
    TopicDescription,
    /// Extend seed conversations into new scenarios.
    ScenarioExpansion,
    /// Produce multi-step tool-calling conversations.
    ToolChain,
}

impl GenerationStrategy {
    pub const ALL: [GenerationStrategy; 5] = [
        Self::MessageVariation,
        Self::FewShot,
        Self::TopicDescription,
        Self::ScenarioExpansion,
        Self::ToolChain,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MessageVariation => "message_variation",
            Self::FewShot => "few_shot",
            Self::TopicDescription => "topic_description",
            Self::ScenarioExpansion => "scenario_expansion",
            Self::ToolChain => "tool_chain",
        }
    }

    /// Instruction handed to the generator for this strategy.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::MessageVariation => {
                "Rewrite the example conversations with different wording, personas and details while keeping the same intent."
            }
            Self::FewShot => {
                "Use the example conversations as style references and write new, distinct conversations on the topic."
            }
            Self::TopicDescription => {
                "Write new conversations from the topic description alone; do not copy the examples."
            }
            Self::ScenarioExpansion => {
                "Extend the example conversations into new scenarios with follow-up questions and edge cases."
            }
            Self::ToolChain => {
                "Write conversations where the assistant solves the request through a sequence of tool calls and tool results."
            }
        }
    }
}

impl fmt::Display for GenerationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStrategy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == s.trim())
            .ok_or_else(|| EngineError::validation(format!("Unknown generation strategy '{}'", s)))
    }
}

/// One recorded attempt to synthesize records for under-represented topics.
///
/// Immutable once appended to a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRound {
    /// 1-based position in the workflow's round history.
    pub round: usize,
    pub strategy: GenerationStrategy,
    pub topics_targeted: Vec<String>,
    pub records_generated: usize,
    pub records_valid: usize,
    pub balance_score_before: f64,
    pub balance_score_after: f64,
    pub timestamp: DateTime<Utc>,
}

impl GenerationRound {
    pub fn records_rejected(&self) -> usize {
        self.records_generated.saturating_sub(self.records_valid)
    }

    pub fn improvement(&self) -> f64 {
        self.balance_score_after - self.balance_score_before
    }
}

/// Audit-log entry written alongside each appended round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationHistoryEntry {
    pub id: String,
    pub workflow_id: String,
    pub round: GenerationRound,
    pub recorded_at: DateTime<Utc>,
}

impl GenerationHistoryEntry {
    pub fn new(workflow_id: impl Into<String>, round: GenerationRound) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            round,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parse_roundtrip() {
        for strategy in GenerationStrategy::ALL {
            let parsed: GenerationStrategy = strategy.as_str().parse().expect("should parse");
            assert_eq!(parsed, strategy);
        }
        assert!("freestyle".parse::<GenerationStrategy>().is_err());
        assert_eq!(
            GenerationStrategy::default(),
            GenerationStrategy::MessageVariation
        );
    }

    #[test]
    fn test_round_derived_values() {
        let round = GenerationRound {
            round: 1,
            strategy: GenerationStrategy::FewShot,
            topics_targeted: vec!["refunds".into()],
            records_generated: 10,
            records_valid: 8,
            balance_score_before: 0.25,
            balance_score_after: 0.5,
            timestamp: Utc::now(),
        };
        assert_eq!(round.records_rejected(), 2);
        assert_eq!(round.improvement(), 0.25);
    }
}
