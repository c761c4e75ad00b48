//! Dataset and record storage.
//!
//! The engine reads records and writes topics, hierarchies and evaluator
//! configurations through [`RecordStore`]. Two implementations are provided:
//! an in-memory store for tests and embedding, and a file store that keeps
//! one JSON document per dataset.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tokio::fs;
use uuid::Uuid;

use super::grader::EvaluationConfig;
use crate::error::CollaboratorError;
use crate::hierarchy::TopicHierarchyNode;

/// A single training record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    /// Conversation payload, normally `{"input": {"messages": [...]}, "output": ...}`.
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub is_generated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl DatasetRecord {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
            topic: None,
            is_generated: false,
            created_at: Some(Utc::now()),
        }
    }

    /// A synthetic record with a fresh id.
    pub fn generated(data: serde_json::Value, topic: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data,
            topic: Some(topic.into()),
            is_generated: true,
            created_at: Some(Utc::now()),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// The first user message of the input conversation, if any.
    pub fn first_user_message(&self) -> Option<&str> {
        self.data
            .get("input")?
            .get("messages")?
            .as_array()?
            .iter()
            .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("user"))?
            .get("content")?
            .as_str()
    }
}

/// A topic hierarchy as persisted on a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHierarchyConfig {
    #[serde(default)]
    pub goals: String,
    pub hierarchy: Vec<TopicHierarchyNode>,
    pub depth: usize,
    pub generated_at: DateTime<Utc>,
}

/// Dataset metadata owned by the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_hierarchy: Option<TopicHierarchyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_config: Option<EvaluationConfig>,
}

impl DatasetInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            topic_hierarchy: None,
            evaluation_config: None,
        }
    }
}

/// Access to datasets and their records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>, CollaboratorError>;

    async fn get_records(&self, dataset_id: &str) -> Result<Vec<DatasetRecord>, CollaboratorError>;

    async fn update_record_topic(
        &self,
        dataset_id: &str,
        record_id: &str,
        topic: &str,
    ) -> Result<(), CollaboratorError>;

    /// Replace a record's topic and/or data; `None` leaves a field as is.
    async fn update_record_data(
        &self,
        dataset_id: &str,
        record_id: &str,
        topic: Option<&str>,
        data: Option<serde_json::Value>,
    ) -> Result<(), CollaboratorError>;

    async fn add_records(
        &self,
        dataset_id: &str,
        records: Vec<DatasetRecord>,
    ) -> Result<usize, CollaboratorError>;

    async fn save_topic_hierarchy(
        &self,
        dataset_id: &str,
        hierarchy: TopicHierarchyConfig,
    ) -> Result<(), CollaboratorError>;

    async fn save_evaluation_config(
        &self,
        dataset_id: &str,
        config: EvaluationConfig,
    ) -> Result<(), CollaboratorError>;
}

/// A dataset together with its records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub dataset: DatasetInfo,
    #[serde(default)]
    pub records: Vec<DatasetRecord>,
}

impl DatasetDocument {
    pub fn new(dataset: DatasetInfo, records: Vec<DatasetRecord>) -> Self {
        Self { dataset, records }
    }

    fn record_mut(&mut self, record_id: &str) -> Result<&mut DatasetRecord, CollaboratorError> {
        let dataset_id = &self.dataset.id;
        self.records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| {
                CollaboratorError::RecordStore(format!(
                    "record '{}' not found in dataset '{}'",
                    record_id, dataset_id
                ))
            })
    }

    fn set_topic(&mut self, record_id: &str, topic: &str) -> Result<(), CollaboratorError> {
        self.record_mut(record_id)?.topic = Some(topic.to_string());
        Ok(())
    }

    fn edit_record(
        &mut self,
        record_id: &str,
        topic: Option<&str>,
        data: Option<serde_json::Value>,
    ) -> Result<(), CollaboratorError> {
        let record = self.record_mut(record_id)?;
        if let Some(topic) = topic {
            record.topic = Some(topic.to_string());
        }
        if let Some(data) = data {
            record.data = data;
        }
        Ok(())
    }
}

fn dataset_missing(dataset_id: &str) -> CollaboratorError {
    CollaboratorError::RecordStore(format!("dataset '{}' not found", dataset_id))
}

/// Record store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    datasets: RwLock<HashMap<String, DatasetDocument>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a dataset.
    pub fn insert(&self, document: DatasetDocument) {
        self.datasets
            .write()
            .expect("dataset lock poisoned")
            .insert(document.dataset.id.clone(), document);
    }

    fn with_document<T>(
        &self,
        dataset_id: &str,
        f: impl FnOnce(&mut DatasetDocument) -> Result<T, CollaboratorError>,
    ) -> Result<T, CollaboratorError> {
        let mut datasets = self.datasets.write().expect("dataset lock poisoned");
        let document = datasets
            .get_mut(dataset_id)
            .ok_or_else(|| dataset_missing(dataset_id))?;
        f(document)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>, CollaboratorError> {
        let datasets = self.datasets.read().expect("dataset lock poisoned");
        Ok(datasets.get(dataset_id).map(|d| d.dataset.clone()))
    }

    async fn get_records(&self, dataset_id: &str) -> Result<Vec<DatasetRecord>, CollaboratorError> {
        let datasets = self.datasets.read().expect("dataset lock poisoned");
        datasets
            .get(dataset_id)
            .map(|d| d.records.clone())
            .ok_or_else(|| dataset_missing(dataset_id))
    }

    async fn update_record_topic(
        &self,
        dataset_id: &str,
        record_id: &str,
        topic: &str,
    ) -> Result<(), CollaboratorError> {
        self.with_document(dataset_id, |d| d.set_topic(record_id, topic))
    }

    async fn update_record_data(
        &self,
        dataset_id: &str,
        record_id: &str,
        topic: Option<&str>,
        data: Option<serde_json::Value>,
    ) -> Result<(), CollaboratorError> {
        self.with_document(dataset_id, |d| d.edit_record(record_id, topic, data))
    }

    async fn add_records(
        &self,
        dataset_id: &str,
        records: Vec<DatasetRecord>,
    ) -> Result<usize, CollaboratorError> {
        self.with_document(dataset_id, |d| {
            let count = records.len();
            d.records.extend(records);
            Ok(count)
        })
    }

    async fn save_topic_hierarchy(
        &self,
        dataset_id: &str,
        hierarchy: TopicHierarchyConfig,
    ) -> Result<(), CollaboratorError> {
        self.with_document(dataset_id, |d| {
            d.dataset.topic_hierarchy = Some(hierarchy);
            Ok(())
        })
    }

    async fn save_evaluation_config(
        &self,
        dataset_id: &str,
        config: EvaluationConfig,
    ) -> Result<(), CollaboratorError> {
        self.with_document(dataset_id, |d| {
            d.dataset.evaluation_config = Some(config);
            Ok(())
        })
    }
}

/// Record store backed by one `<dataset_id>.json` file per dataset.
///
/// Writes go to a temporary file that is renamed over the original.
pub struct FileRecordStore {
    base_path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileRecordStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn dataset_path(&self, dataset_id: &str) -> Result<PathBuf, CollaboratorError> {
        let safe = !dataset_id.is_empty()
            && dataset_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !dataset_id.starts_with('.');
        if !safe {
            return Err(CollaboratorError::RecordStore(format!(
                "invalid dataset id '{}'",
                dataset_id
            )));
        }
        Ok(self.base_path.join(format!("{}.json", dataset_id)))
    }

    async fn read_document(&self, dataset_id: &str) -> Result<Option<DatasetDocument>, CollaboratorError> {
        let path = self.dataset_path(dataset_id)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).await.map_err(|e| {
            CollaboratorError::RecordStore(format!("failed to read {:?}: {}", path, e))
        })?;
        let document = serde_json::from_str(&raw).map_err(|e| {
            CollaboratorError::RecordStore(format!("invalid dataset file {:?}: {}", path, e))
        })?;
        Ok(Some(document))
    }

    /// Persist a dataset document, creating the directory if needed.
    pub async fn write_document(&self, document: &DatasetDocument) -> Result<(), CollaboratorError> {
        let path = self.dataset_path(&document.dataset.id)?;
        let io_error =
            |e: std::io::Error| CollaboratorError::RecordStore(format!("failed to write {:?}: {}", path, e));

        fs::create_dir_all(&self.base_path).await.map_err(io_error)?;
        let json = serde_json::to_string_pretty(document)
            .map_err(|e| CollaboratorError::RecordStore(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(io_error)?;
        fs::rename(&tmp, &path).await.map_err(io_error)?;
        Ok(())
    }

    async fn update<T>(
        &self,
        dataset_id: &str,
        f: impl FnOnce(&mut DatasetDocument) -> Result<T, CollaboratorError>,
    ) -> Result<T, CollaboratorError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self
            .read_document(dataset_id)
            .await?
            .ok_or_else(|| dataset_missing(dataset_id))?;
        let out = f(&mut document)?;
        self.write_document(&document).await?;
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<DatasetInfo>, CollaboratorError> {
        Ok(self.read_document(dataset_id).await?.map(|d| d.dataset))
    }

    async fn get_records(&self, dataset_id: &str) -> Result<Vec<DatasetRecord>, CollaboratorError> {
        self.read_document(dataset_id)
            .await?
            .map(|d| d.records)
            .ok_or_else(|| dataset_missing(dataset_id))
    }

    async fn update_record_topic(
        &self,
        dataset_id: &str,
        record_id: &str,
        topic: &str,
    ) -> Result<(), CollaboratorError> {
        self.update(dataset_id, |d| d.set_topic(record_id, topic)).await
    }

    async fn update_record_data(
        &self,
        dataset_id: &str,
        record_id: &str,
        topic: Option<&str>,
        data: Option<serde_json::Value>,
    ) -> Result<(), CollaboratorError> {
        self.update(dataset_id, |d| d.edit_record(record_id, topic, data))
            .await
    }

    async fn add_records(
        &self,
        dataset_id: &str,
        records: Vec<DatasetRecord>,
    ) -> Result<usize, CollaboratorError> {
        self.update(dataset_id, |d| {
            let count = records.len();
            d.records.extend(records);
            Ok(count)
        })
        .await
    }

    async fn save_topic_hierarchy(
        &self,
        dataset_id: &str,
        hierarchy: TopicHierarchyConfig,
    ) -> Result<(), CollaboratorError> {
        self.update(dataset_id, |d| {
            d.dataset.topic_hierarchy = Some(hierarchy);
            Ok(())
        })
        .await
    }

    async fn save_evaluation_config(
        &self,
        dataset_id: &str,
        config: EvaluationConfig,
    ) -> Result<(), CollaboratorError> {
        self.update(dataset_id, |d| {
            d.dataset.evaluation_config = Some(config);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn document() -> DatasetDocument {
        DatasetDocument::new(
            DatasetInfo::new("support", "Support chats"),
            vec![DatasetRecord::new(
                "r1",
                json!({"input": {"messages": [{"role": "user", "content": "refund please"}]}}),
            )],
        )
    }

    #[test]
    fn test_first_user_message() {
        let record = &document().records[0];
        assert_eq!(record.first_user_message(), Some("refund please"));
        assert_eq!(DatasetRecord::new("x", json!({})).first_user_message(), None);
    }

    #[tokio::test]
    async fn test_in_memory_store_updates() {
        let store = InMemoryRecordStore::new();
        store.insert(document());

        store
            .update_record_topic("support", "r1", "Billing")
            .await
            .expect("should update topic");
        let added = store
            .add_records("support", vec![DatasetRecord::generated(json!({}), "Billing")])
            .await
            .expect("should add");
        assert_eq!(added, 1);

        let records = store.get_records("support").await.expect("should list");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].topic.as_deref(), Some("Billing"));
        assert!(records[1].is_generated);

        store
            .update_record_data("support", "r1", None, Some(json!({"input": {"messages": []}})))
            .await
            .expect("should replace data");
        let records = store.get_records("support").await.expect("should list");
        assert_eq!(records[0].topic.as_deref(), Some("Billing"));
        assert_eq!(records[0].data, json!({"input": {"messages": []}}));

        assert!(store.update_record_topic("support", "nope", "x").await.is_err());
        assert!(store
            .update_record_data("support", "nope", Some("x"), None)
            .await
            .is_err());
        assert!(store.get_records("missing").await.is_err());
        assert!(store.get_dataset("missing").await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_documents() {
        let dir = TempDir::new().expect("should create temp dir");
        let store = FileRecordStore::new(dir.path());
        store.write_document(&document()).await.expect("should write");

        store
            .save_topic_hierarchy(
                "support",
                TopicHierarchyConfig {
                    goals: "help customers".into(),
                    hierarchy: vec![TopicHierarchyNode::leaf("billing", "Billing")],
                    depth: 1,
                    generated_at: Utc::now(),
                },
            )
            .await
            .expect("should save hierarchy");
        store
            .update_record_data("support", "r1", Some("Billing"), None)
            .await
            .expect("should update topic");

        let reopened = FileRecordStore::new(dir.path());
        let info = reopened
            .get_dataset("support")
            .await
            .expect("should read")
            .expect("dataset exists");
        assert_eq!(info.topic_hierarchy.map(|h| h.depth), Some(1));
        let records = reopened.get_records("support").await.expect("should read");
        assert_eq!(records[0].topic.as_deref(), Some("Billing"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_like_ids() {
        let dir = TempDir::new().expect("should create temp dir");
        let store = FileRecordStore::new(dir.path());
        assert!(store.get_dataset("../etc").await.is_err());
        assert!(store.get_dataset("unknown").await.expect("lookup").is_none());
    }
}
