//! Topic hierarchy and categorization operations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use super::{check_range, FinetuneEngine};
use crate::collaborators::{TopicGenerationRequest, TopicHierarchyConfig, MAX_SAMPLE_INPUTS};
use crate::error::EngineError;
use crate::hierarchy::{normalize_hierarchy, HierarchyBuilder, RawTopicNode, TopicHierarchy, TopicHierarchyNode};
use crate::workflow::gate;
use crate::workflow::{
    Categorization, HierarchyMethod, Step, StepData, TopicAssignmentStats, TopicsConfig,
    WorkflowState,
};

const DEFAULT_MAX_DEPTH: usize = 3;
const DEFAULT_DEGREE: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct ApplyHierarchyParams {
    pub workflow_id: String,
    pub hierarchy: Vec<RawTopicNode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyApplied {
    pub workflow_id: String,
    pub topic_count: usize,
    pub depth: usize,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateTopicsParams {
    pub workflow_id: String,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub degree: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicsGenerated {
    pub workflow_id: String,
    pub hierarchy: Vec<TopicHierarchyNode>,
    pub topic_count: usize,
    pub depth: usize,
    pub topics: Vec<String>,
    /// False when run from `grader_config`, where only the dataset changes.
    pub step_data_updated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorizeParams {
    pub workflow_id: String,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorizationResult {
    pub workflow_id: String,
    pub total_records: usize,
    pub assigned_count: usize,
    pub low_confidence_count: usize,
    /// Records the topic service did not place on any known topic.
    pub unclassified_count: usize,
    pub confidence_threshold: f64,
    pub by_topic: BTreeMap<String, TopicAssignmentStats>,
}

impl FinetuneEngine {
    /// Store the hierarchy on the workflow's dataset.
    async fn save_hierarchy(
        &self,
        state: &WorkflowState,
        hierarchy: &TopicHierarchy,
    ) -> Result<(), EngineError> {
        self.collaborators
            .records
            .save_topic_hierarchy(
                &state.dataset_id,
                TopicHierarchyConfig {
                    goals: state.training_goals.clone(),
                    hierarchy: hierarchy.nodes.clone(),
                    depth: hierarchy.depth,
                    generated_at: Utc::now(),
                },
            )
            .await?;
        Ok(())
    }

    /// Store a caller-supplied hierarchy on the dataset.
    pub async fn apply_topic_hierarchy(
        &self,
        params: ApplyHierarchyParams,
    ) -> Result<HierarchyApplied, EngineError> {
        let state = self
            .store
            .guarded(&params.workflow_id, gate::APPLY_TOPIC_HIERARCHY)
            .await?;

        let hierarchy = normalize_hierarchy(&params.hierarchy);
        hierarchy.validate()?;
        self.dataset(&state.dataset_id).await?;

        let topics_config = TopicsConfig {
            topic_count: hierarchy.leaf_count,
            depth: hierarchy.depth,
            method: HierarchyMethod::Manual,
            max_depth: None,
            degree: None,
            configured_at: Utc::now(),
        };
        self.store
            .write_through(
                &state.id,
                gate::APPLY_TOPIC_HIERARCHY,
                self.save_hierarchy(&state, &hierarchy),
                |_| Some(StepData::TopicsConfig(topics_config)),
            )
            .await?;

        tracing::info!(
            workflow_id = %state.id,
            topics = hierarchy.leaf_count,
            depth = hierarchy.depth,
            "Topic hierarchy applied"
        );

        Ok(HierarchyApplied {
            workflow_id: state.id,
            topic_count: hierarchy.leaf_count,
            depth: hierarchy.depth,
            topics: hierarchy.leaf_names(),
        })
    }

    /// Ask the topic service for a hierarchy built from goals and sample inputs.
    pub async fn generate_topics(&self, params: GenerateTopicsParams) -> Result<TopicsGenerated, EngineError> {
        let max_depth = check_range(params.max_depth.unwrap_or(DEFAULT_MAX_DEPTH), 1, 5, "max_depth")?;
        let degree = check_range(params.degree.unwrap_or(DEFAULT_DEGREE), 1, 10, "degree")?;

        let state = self
            .store
            .guarded(&params.workflow_id, gate::GENERATE_TOPICS)
            .await?;
        self.dataset(&state.dataset_id).await?;

        let sample_inputs: Vec<String> = self
            .records(&state.dataset_id)
            .await?
            .iter()
            .take(MAX_SAMPLE_INPUTS)
            .filter_map(|r| r.first_user_message().map(str::to_string))
            .collect();

        let request = TopicGenerationRequest {
            goals: state.training_goals.clone(),
            sample_inputs,
            max_depth,
            degree,
        };
        let paths = self.collaborators.topics.generate_topic_paths(&request).await?;
        let hierarchy = HierarchyBuilder::from_paths(&paths);
        hierarchy.validate()?;

        let (topic_count, depth) = (hierarchy.leaf_count, hierarchy.depth);
        let written = self
            .store
            .write_through(
                &state.id,
                gate::GENERATE_TOPICS,
                self.save_hierarchy(&state, &hierarchy),
                |current| {
                    (current.current_step == Step::TopicsConfig).then(|| {
                        StepData::TopicsConfig(TopicsConfig {
                            topic_count,
                            depth,
                            method: HierarchyMethod::Auto,
                            max_depth: Some(max_depth),
                            degree: Some(degree),
                            configured_at: Utc::now(),
                        })
                    })
                },
            )
            .await?;
        let step_data_updated = written.current_step == Step::TopicsConfig;

        tracing::info!(
            workflow_id = %state.id,
            step = %written.current_step,
            topics = topic_count,
            depth = depth,
            "Topic hierarchy generated"
        );

        Ok(TopicsGenerated {
            workflow_id: state.id,
            topic_count: hierarchy.leaf_count,
            depth: hierarchy.depth,
            topics: hierarchy.leaf_names(),
            hierarchy: hierarchy.nodes,
            step_data_updated,
        })
    }

    /// Classify records into leaf topics, applying confident assignments.
    pub async fn categorize_records(
        &self,
        params: CategorizeParams,
    ) -> Result<CategorizationResult, EngineError> {
        let threshold = check_range(
            params
                .confidence_threshold
                .unwrap_or(self.config.confidence_threshold),
            0.0,
            1.0,
            "confidence_threshold",
        )?;

        let state = self
            .store
            .guarded(&params.workflow_id, gate::CATEGORIZE_RECORDS)
            .await?;
        let dataset = self.dataset(&state.dataset_id).await?;
        let leaves: HashSet<String> = Self::hierarchy(&dataset)?.leaf_names().into_iter().collect();
        let mut topics: Vec<String> = leaves.iter().cloned().collect();
        topics.sort();

        let records = self.records(&state.dataset_id).await?;
        let known: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let assignments = self
            .collaborators
            .topics
            .classify_records(&records, &topics)
            .await?;

        let mut seen = HashSet::new();
        let mut confidences: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut low_confidence_count = 0;
        for assignment in assignments {
            if !known.contains(assignment.record_id.as_str())
                || !leaves.contains(&assignment.topic)
                || !seen.insert(assignment.record_id.clone())
            {
                continue;
            }
            if assignment.confidence < threshold {
                low_confidence_count += 1;
                continue;
            }
            self.collaborators
                .records
                .update_record_topic(&state.dataset_id, &assignment.record_id, &assignment.topic)
                .await?;
            confidences
                .entry(assignment.topic)
                .or_default()
                .push(assignment.confidence);
        }

        let by_topic: BTreeMap<String, TopicAssignmentStats> = confidences
            .into_iter()
            .map(|(topic, values)| {
                let stats = TopicAssignmentStats {
                    count: values.len(),
                    avg_confidence: values.iter().sum::<f64>() / values.len() as f64,
                };
                (topic, stats)
            })
            .collect();
        let assigned_count: usize = by_topic.values().map(|s| s.count).sum();

        self.store
            .update_step_data(
                &state.id,
                StepData::Categorize(Categorization {
                    assigned_count,
                    low_confidence_count,
                    confidence_threshold: threshold,
                    by_topic: by_topic.clone(),
                    categorized_at: Utc::now(),
                }),
            )
            .await?;

        tracing::info!(
            workflow_id = %state.id,
            assigned = assigned_count,
            low_confidence = low_confidence_count,
            threshold = threshold,
            "Records categorized"
        );

        Ok(CategorizationResult {
            workflow_id: state.id,
            total_records: records.len(),
            assigned_count,
            low_confidence_count,
            unclassified_count: records.len() - assigned_count - low_confidence_count,
            confidence_threshold: threshold,
            by_topic,
        })
    }
}
