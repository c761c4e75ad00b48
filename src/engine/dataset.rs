//! Dataset inspection and manual record edits, available at any step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{require_text, FinetuneEngine};
use crate::collaborators::{DatasetInfo, DatasetRecord};
use crate::error::EngineError;
use crate::validation::{RecordIssueKind, ValidationReport};

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetParams {
    pub dataset_id: String,
}

/// Fields to change on a record; at least one must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordUpdates {
    #[serde(default)]
    pub topic: Option<String>,
    /// New `input.messages`; other input fields and the output are kept.
    #[serde(default)]
    pub messages: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRecordParams {
    pub workflow_id: String,
    pub record_id: String,
    pub updates: RecordUpdates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedRecord {
    pub id: String,
    pub topic: Option<String>,
    pub message_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordUpdated {
    pub workflow_id: String,
    pub updated_record: UpdatedRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordValidationResult {
    pub dataset_id: String,
    #[serde(flatten)]
    pub report: ValidationReport,
    pub validation_rate: f64,
}

/// Validation outcome condensed for dataset statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizationSummary {
    pub valid_records: usize,
    pub invalid_records: usize,
    pub duplicate_records: usize,
    pub validation_rate: f64,
    pub errors_by_type: BTreeMap<RecordIssueKind, usize>,
    pub recommendations: Vec<String>,
}

impl From<&ValidationReport> for SanitizationSummary {
    fn from(report: &ValidationReport) -> Self {
        Self {
            valid_records: report.valid_count,
            invalid_records: report.invalid_count,
            duplicate_records: report.duplicate_count,
            validation_rate: report.validation_rate(),
            errors_by_type: report.errors_by_type.clone(),
            recommendations: report.recommendations.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub dataset_id: String,
    pub total_records: usize,
    pub generated_records: usize,
    pub original_records: usize,
    pub total_messages: usize,
    /// Rounded to two decimals.
    pub average_messages_per_record: f64,
    pub topic_distribution: BTreeMap<String, usize>,
    pub topic_count: usize,
    pub uncategorized_count: usize,
    pub has_topic_hierarchy: bool,
    pub has_evaluation_config: bool,
    pub sanitization: SanitizationSummary,
    pub calculated_at: DateTime<Utc>,
}

fn message_count(data: &Value) -> usize {
    data.pointer("/input/messages")
        .and_then(|m| m.as_array())
        .map(Vec::len)
        .unwrap_or(0)
}

/// Swap in new input messages, keeping every other field of the payload.
fn with_messages(data: &Value, messages: Vec<Value>) -> Value {
    let mut data = match data {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    let mut input = match data.remove("input") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    input.insert("messages".to_string(), Value::Array(messages));
    data.insert("input".to_string(), Value::Object(input));
    Value::Object(data)
}

impl DatasetStats {
    fn compute(dataset: &DatasetInfo, records: &[DatasetRecord], report: &ValidationReport) -> Self {
        let mut topic_distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut uncategorized_count = 0;
        let mut generated_records = 0;
        let mut total_messages = 0;

        for record in records {
            match &record.topic {
                Some(topic) => *topic_distribution.entry(topic.clone()).or_default() += 1,
                None => uncategorized_count += 1,
            }
            if record.is_generated {
                generated_records += 1;
            }
            total_messages += message_count(&record.data);
        }

        let average_messages_per_record = if records.is_empty() {
            0.0
        } else {
            (total_messages as f64 / records.len() as f64 * 100.0).round() / 100.0
        };

        Self {
            dataset_id: dataset.id.clone(),
            total_records: records.len(),
            generated_records,
            original_records: records.len() - generated_records,
            total_messages,
            average_messages_per_record,
            topic_count: topic_distribution.len(),
            topic_distribution,
            uncategorized_count,
            has_topic_hierarchy: dataset.topic_hierarchy.is_some(),
            has_evaluation_config: dataset.evaluation_config.is_some(),
            sanitization: SanitizationSummary::from(report),
            calculated_at: Utc::now(),
        }
    }
}

impl FinetuneEngine {
    /// Run record validation over a whole dataset.
    pub async fn validate_records(&self, params: DatasetParams) -> Result<RecordValidationResult, EngineError> {
        require_text(&params.dataset_id, "dataset_id")?;
        self.dataset(&params.dataset_id).await?;
        let records = self.records(&params.dataset_id).await?;
        let report = self.validator.validate_batch(&records);

        tracing::debug!(
            dataset_id = %params.dataset_id,
            records = report.record_count,
            valid = report.valid_count,
            duplicates = report.duplicate_count,
            "Records validated"
        );

        Ok(RecordValidationResult {
            dataset_id: params.dataset_id,
            validation_rate: report.validation_rate(),
            report,
        })
    }

    pub async fn get_dataset_stats(&self, params: DatasetParams) -> Result<DatasetStats, EngineError> {
        require_text(&params.dataset_id, "dataset_id")?;
        let dataset = self.dataset(&params.dataset_id).await?;
        let records = self.records(&params.dataset_id).await?;
        let report = self.validator.validate_batch(&records);
        Ok(DatasetStats::compute(&dataset, &records, &report))
    }

    /// Correct one record of the workflow's dataset by hand.
    ///
    /// A new topic must be a leaf of the dataset's hierarchy when one exists.
    /// New messages must leave the record valid.
    pub async fn update_record(&self, params: UpdateRecordParams) -> Result<RecordUpdated, EngineError> {
        require_text(&params.workflow_id, "workflow_id")?;
        require_text(&params.record_id, "record_id")?;
        let RecordUpdates { topic, messages } = params.updates;
        if topic.is_none() && messages.is_none() {
            return Err(EngineError::validation(
                "updates must include a topic or messages",
            ));
        }

        let state = self.store.get(&params.workflow_id).await?;
        let dataset = self.dataset(&state.dataset_id).await?;
        let records = self.records(&state.dataset_id).await?;
        let record = records
            .into_iter()
            .find(|r| r.id == params.record_id)
            .ok_or_else(|| {
                EngineError::validation(format!(
                    "record '{}' not found in dataset '{}'",
                    params.record_id, state.dataset_id
                ))
            })?;

        let topic = match topic {
            Some(topic) => {
                let topic = topic.trim().to_string();
                require_text(&topic, "updates.topic")?;
                if dataset.topic_hierarchy.is_some()
                    && !Self::hierarchy(&dataset)?.leaf_names().contains(&topic)
                {
                    return Err(EngineError::validation(format!(
                        "topic '{}' is not a leaf of the dataset's hierarchy",
                        topic
                    )));
                }
                Some(topic)
            }
            None => None,
        };

        let data = match messages {
            Some(messages) => {
                let candidate = DatasetRecord {
                    data: with_messages(&record.data, messages),
                    ..record.clone()
                };
                self.validator.validate(&candidate).map_err(|(kind, detail)| {
                    EngineError::validation(match detail {
                        Some(detail) => format!("updated record is invalid: {} ({})", kind, detail),
                        None => format!("updated record is invalid: {}", kind),
                    })
                })?;
                Some(candidate.data)
            }
            None => None,
        };

        let message_count = message_count(data.as_ref().unwrap_or(&record.data));
        let topic_changed = topic.is_some();
        let messages_changed = data.is_some();
        self.collaborators
            .records
            .update_record_data(&state.dataset_id, &record.id, topic.as_deref(), data)
            .await?;

        tracing::info!(
            workflow_id = %state.id,
            record_id = %record.id,
            topic_changed = topic_changed,
            messages_changed = messages_changed,
            "Record updated"
        );

        Ok(RecordUpdated {
            workflow_id: state.id,
            updated_record: UpdatedRecord {
                id: record.id,
                topic: topic.or(record.topic),
                message_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::RecordValidator;
    use serde_json::json;

    fn conversation(turns: usize) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = (0..turns)
            .map(|i| {
                let role = if i % 2 == 0 { "user" } else { "assistant" };
                json!({"role": role, "content": format!("message {}", i)})
            })
            .collect();
        json!({"input": {"messages": messages}})
    }

    #[test]
    fn test_stats_count_topics_messages_and_generated() {
        let dataset = DatasetInfo::new("ds-1", "Support");
        let records = vec![
            DatasetRecord::new("a", conversation(2)).with_topic("Billing"),
            DatasetRecord::new("b", conversation(3)),
            DatasetRecord::generated(conversation(2), "Billing"),
        ];
        let report = RecordValidator::new().validate_batch(&records);
        let stats = DatasetStats::compute(&dataset, &records, &report);

        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.generated_records, 1);
        assert_eq!(stats.original_records, 2);
        assert_eq!(stats.total_messages, 7);
        assert_eq!(stats.average_messages_per_record, 2.33);
        assert_eq!(stats.topic_distribution.get("Billing"), Some(&2));
        assert_eq!(stats.topic_count, 1);
        assert_eq!(stats.uncategorized_count, 1);
        assert!(!stats.has_topic_hierarchy);
        assert!(!stats.has_evaluation_config);
    }

    #[test]
    fn test_with_messages_keeps_other_fields() {
        let data = json!({
            "input": {"messages": [{"role": "user", "content": "old"}], "tools": []},
            "output": "kept"
        });
        let updated = with_messages(&data, vec![json!({"role": "user", "content": "new"})]);
        assert_eq!(updated["input"]["messages"][0]["content"], "new");
        assert_eq!(updated["input"]["tools"], json!([]));
        assert_eq!(updated["output"], "kept");
        assert_eq!(message_count(&updated), 1);

        let from_scalar = with_messages(&json!("bad"), vec![]);
        assert_eq!(from_scalar, json!({"input": {"messages": []}}));
    }

    #[test]
    fn test_stats_for_empty_dataset() {
        let dataset = DatasetInfo::new("ds-1", "Empty");
        let report = RecordValidator::new().validate_batch(&[]);
        let stats = DatasetStats::compute(&dataset, &[], &report);
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.average_messages_per_record, 0.0);
        assert_eq!(stats.sanitization.valid_records, 0);
    }
}
