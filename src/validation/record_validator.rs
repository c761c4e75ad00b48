//! Hygiene checks for conversation records.
//!
//! A record is valid when it carries `input.messages` with at least one
//! non-empty user message, known roles, a consistent tool-call chain and an
//! estimated size under the token limit. Duplicates are detected by hashing
//! the input messages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::collaborators::DatasetRecord;

/// Maximum number of individual errors kept in a report.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordIssueKind {
    InvalidDataStructure,
    MissingInput,
    MissingMessages,
    EmptyMessages,
    InvalidRole,
    NoUserMessage,
    EmptyUserMessage,
    UserMessageTooShort,
    MissingToolCallId,
    OrphanToolResult,
    ExceedsMaxTokens,
    Duplicate,
}

impl RecordIssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidDataStructure => "invalid_data_structure",
            Self::MissingInput => "missing_input",
            Self::MissingMessages => "missing_messages",
            Self::EmptyMessages => "empty_messages",
            Self::InvalidRole => "invalid_role",
            Self::NoUserMessage => "no_user_message",
            Self::EmptyUserMessage => "empty_user_message",
            Self::UserMessageTooShort => "user_message_too_short",
            Self::MissingToolCallId => "missing_tool_call_id",
            Self::OrphanToolResult => "orphan_tool_result",
            Self::ExceedsMaxTokens => "exceeds_max_tokens",
            Self::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for RecordIssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rejected record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub record_id: String,
    pub kind: RecordIssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Summary of validating a batch of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub record_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub duplicate_count: usize,
    pub errors_by_type: BTreeMap<RecordIssueKind, usize>,
    /// The first few rejected records.
    pub errors: Vec<RecordIssue>,
    pub recommendations: Vec<String>,
}

impl ValidationReport {
    pub fn validation_rate(&self) -> f64 {
        if self.record_count == 0 {
            0.0
        } else {
            self.valid_count as f64 / self.record_count as f64
        }
    }
}

/// Validator for conversation records.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    allowed_roles: HashSet<String>,
    min_user_message_length: usize,
    max_tokens: usize,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordValidator {
    pub fn new() -> Self {
        Self {
            allowed_roles: ["system", "user", "assistant", "tool"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            min_user_message_length: 1,
            max_tokens: 32_000,
        }
    }

    pub fn with_min_user_message_length(mut self, length: usize) -> Self {
        self.min_user_message_length = length;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check one record, returning the first problem found.
    pub fn validate(&self, record: &DatasetRecord) -> Result<(), (RecordIssueKind, Option<String>)> {
        let data = record
            .data
            .as_object()
            .ok_or((RecordIssueKind::InvalidDataStructure, None))?;
        let input = data
            .get("input")
            .filter(|v| !v.is_null())
            .ok_or((RecordIssueKind::MissingInput, None))?;
        let messages = input
            .get("messages")
            .filter(|v| !v.is_null())
            .ok_or((RecordIssueKind::MissingMessages, None))?
            .as_array()
            .filter(|m| !m.is_empty())
            .ok_or((RecordIssueKind::EmptyMessages, None))?;

        for (i, message) in messages.iter().enumerate() {
            let role = message.get("role").and_then(|r| r.as_str()).unwrap_or("");
            if !self.allowed_roles.contains(role) {
                return Err((
                    RecordIssueKind::InvalidRole,
                    Some(format!("message {} has invalid role '{}'", i, role)),
                ));
            }
        }

        let user_messages: Vec<&serde_json::Value> = messages
            .iter()
            .filter(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))
            .collect();
        if user_messages.is_empty() {
            return Err((RecordIssueKind::NoUserMessage, None));
        }
        for message in &user_messages {
            let content = message
                .get("content")
                .and_then(|c| c.as_str())
                .map(str::trim)
                .unwrap_or("");
            if content.is_empty() {
                return Err((RecordIssueKind::EmptyUserMessage, None));
            }
            if content.chars().count() < self.min_user_message_length {
                return Err((RecordIssueKind::UserMessageTooShort, None));
            }
        }

        check_tool_chain(messages)?;

        let tokens = estimate_tokens(messages);
        if tokens > self.max_tokens {
            return Err((
                RecordIssueKind::ExceedsMaxTokens,
                Some(format!("{} tokens exceeds limit of {}", tokens, self.max_tokens)),
            ));
        }

        Ok(())
    }

    /// Validate a batch, rejecting invalid records and duplicates.
    pub fn validate_batch(&self, records: &[DatasetRecord]) -> ValidationReport {
        let mut seen = HashSet::new();
        let mut errors_by_type: BTreeMap<RecordIssueKind, usize> = BTreeMap::new();
        let mut errors = Vec::new();
        let mut valid_count = 0;
        let mut duplicate_count = 0;

        for record in records {
            let outcome = self.validate(record).and_then(|_| {
                if seen.insert(content_hash(record)) {
                    Ok(())
                } else {
                    Err((RecordIssueKind::Duplicate, None))
                }
            });
            match outcome {
                Ok(()) => valid_count += 1,
                Err((kind, details)) => {
                    if kind == RecordIssueKind::Duplicate {
                        duplicate_count += 1;
                    }
                    *errors_by_type.entry(kind).or_insert(0) += 1;
                    if errors.len() < MAX_REPORTED_ERRORS {
                        errors.push(RecordIssue {
                            record_id: record.id.clone(),
                            kind,
                            details,
                        });
                    }
                }
            }
        }

        let recommendations = recommendations(&errors_by_type, records.len());
        ValidationReport {
            record_count: records.len(),
            valid_count,
            invalid_count: records.len() - valid_count,
            duplicate_count,
            errors_by_type,
            errors,
            recommendations,
        }
    }
}

fn check_tool_chain(messages: &[serde_json::Value]) -> Result<(), (RecordIssueKind, Option<String>)> {
    let mut call_ids = HashSet::new();
    let mut result_ids = Vec::new();

    for message in messages {
        match message.get("role").and_then(|r| r.as_str()) {
            Some("assistant") => {
                let calls = message.get("tool_calls").and_then(|c| c.as_array());
                for call in calls.into_iter().flatten() {
                    let id = call
                        .get("id")
                        .and_then(|id| id.as_str())
                        .filter(|id| !id.is_empty())
                        .ok_or((RecordIssueKind::MissingToolCallId, None))?;
                    call_ids.insert(id.to_string());
                }
            }
            Some("tool") => {
                let id = message
                    .get("tool_call_id")
                    .and_then(|id| id.as_str())
                    .filter(|id| !id.is_empty())
                    .ok_or((RecordIssueKind::MissingToolCallId, None))?;
                result_ids.push(id.to_string());
            }
            _ => {}
        }
    }

    match result_ids.into_iter().find(|id| !call_ids.contains(id)) {
        Some(orphan) => Err((
            RecordIssueKind::OrphanToolResult,
            Some(format!("tool result references unknown call '{}'", orphan)),
        )),
        None => Ok(()),
    }
}

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(messages: &[serde_json::Value]) -> usize {
    let chars: usize = messages
        .iter()
        .map(|m| {
            let content = m.get("content").and_then(|c| c.as_str()).map_or(0, str::len);
            let calls = m.get("tool_calls").map_or(0, |c| c.to_string().len());
            content + calls
        })
        .sum();
    chars.div_ceil(4)
}

fn content_hash(record: &DatasetRecord) -> String {
    let messages = record
        .data
        .get("input")
        .and_then(|i| i.get("messages"))
        .map(|m| m.to_string())
        .unwrap_or_default();
    hex::encode(Sha256::digest(messages.as_bytes()))
}

fn recommendations(errors: &BTreeMap<RecordIssueKind, usize>, total: usize) -> Vec<String> {
    if total == 0 {
        return Vec::new();
    }
    let count = |kind: RecordIssueKind| errors.get(&kind).copied().unwrap_or(0);
    let rate = |kind: RecordIssueKind| count(kind) as f64 / total as f64;
    let mut out = Vec::new();

    if rate(RecordIssueKind::NoUserMessage) > 0.05 {
        out.push(format!(
            "{:.1}% of records have no user message",
            rate(RecordIssueKind::NoUserMessage) * 100.0
        ));
    }
    if rate(RecordIssueKind::EmptyUserMessage) > 0.05 {
        out.push(format!(
            "{:.1}% of records have empty user messages; review data collection",
            rate(RecordIssueKind::EmptyUserMessage) * 100.0
        ));
    }
    let tool_errors =
        count(RecordIssueKind::OrphanToolResult) + count(RecordIssueKind::MissingToolCallId);
    if tool_errors > 0 {
        out.push(format!(
            "{} tool chain errors; check tool call and result pairing",
            tool_errors
        ));
    }
    let too_long = count(RecordIssueKind::ExceedsMaxTokens);
    if too_long > 0 {
        out.push(format!(
            "{} records exceed the token limit; truncate or split long conversations",
            too_long
        ));
    }
    let duplicates = count(RecordIssueKind::Duplicate);
    if duplicates > 0 {
        out.push(format!("{} duplicate records found", duplicates));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, data: serde_json::Value) -> DatasetRecord {
        DatasetRecord::new(id, data)
    }

    fn conversation(user: &str) -> serde_json::Value {
        json!({"input": {"messages": [
            {"role": "system", "content": "You are helpful."},
            {"role": "user", "content": user}
        ]}, "output": {"messages": [{"role": "assistant", "content": "Sure."}]}})
    }

    #[test]
    fn test_valid_record() {
        let validator = RecordValidator::new();
        assert!(validator.validate(&record("r1", conversation("hello"))).is_ok());
    }

    #[test]
    fn test_structural_failures() {
        let validator = RecordValidator::new();
        let cases = [
            (json!("text"), RecordIssueKind::InvalidDataStructure),
            (json!({"output": {}}), RecordIssueKind::MissingInput),
            (json!({"input": {}}), RecordIssueKind::MissingMessages),
            (json!({"input": {"messages": []}}), RecordIssueKind::EmptyMessages),
            (
                json!({"input": {"messages": [{"role": "robot", "content": "x"}]}}),
                RecordIssueKind::InvalidRole,
            ),
            (
                json!({"input": {"messages": [{"role": "system", "content": "x"}]}}),
                RecordIssueKind::NoUserMessage,
            ),
            (
                json!({"input": {"messages": [{"role": "user", "content": "  "}]}}),
                RecordIssueKind::EmptyUserMessage,
            ),
        ];
        for (data, expected) in cases {
            let (kind, _) = validator
                .validate(&record("r", data))
                .expect_err("record should be rejected");
            assert_eq!(kind, expected);
        }
    }

    #[test]
    fn test_tool_chain() {
        let validator = RecordValidator::new();
        let orphan = json!({"input": {"messages": [
            {"role": "user", "content": "weather?"},
            {"role": "assistant", "content": null, "tool_calls": [{"id": "c1", "type": "function"}]},
            {"role": "tool", "tool_call_id": "c2", "content": "sunny"}
        ]}});
        let (kind, details) = validator
            .validate(&record("r", orphan))
            .expect_err("orphan result");
        assert_eq!(kind, RecordIssueKind::OrphanToolResult);
        assert!(details.unwrap_or_default().contains("c2"));
    }

    #[test]
    fn test_token_limit() {
        let validator = RecordValidator::new().with_max_tokens(2);
        let (kind, _) = validator
            .validate(&record("r", conversation("a fairly long question")))
            .expect_err("too long");
        assert_eq!(kind, RecordIssueKind::ExceedsMaxTokens);
    }

    #[test]
    fn test_batch_report_with_duplicates() {
        let validator = RecordValidator::new();
        let records = vec![
            record("r1", conversation("hello")),
            record("r2", conversation("hello")),
            record("r3", conversation("other")),
            record("r4", json!({"output": {}})),
        ];
        let report = validator.validate_batch(&records);

        assert_eq!(report.record_count, 4);
        assert_eq!(report.valid_count, 2);
        assert_eq!(report.invalid_count, 2);
        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].record_id, "r2");
        assert_eq!(report.validation_rate(), 0.5);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("duplicate")));
    }

    #[test]
    fn test_report_keeps_first_errors_only() {
        let validator = RecordValidator::new();
        let records: Vec<DatasetRecord> = (0..15)
            .map(|i| record(&format!("r{}", i), json!({})))
            .collect();
        let report = validator.validate_batch(&records);
        assert_eq!(report.errors.len(), MAX_REPORTED_ERRORS);
        assert_eq!(report.invalid_count, 15);
    }
}
