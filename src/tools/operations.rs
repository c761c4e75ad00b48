//! The engine operations exposed through the registry.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::Operation;
use crate::engine::{
    AdvanceParams, AnalyzeCoverageParams, ApplyHierarchyParams, CategorizeParams,
    CheckTrainingParams, ConfigureGraderParams, DatasetParams, DeployModelParams, DryRunParams,
    FinetuneEngine, GenerateSyntheticParams, GenerateTopicsParams, RollbackParams,
    StartTrainingParams, StartWorkflowParams, StatusParams, TestGraderParams, UpdateRecordParams,
};
use crate::error::EngineError;
use crate::workflow::{gate, Step};

const UNGATED: &[Step] = &[];

fn parse_params<P: DeserializeOwned>(args: Value) -> Result<P, EngineError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| EngineError::validation(format!("Invalid parameters: {}", e)))
}

fn to_value<R: Serialize>(result: R) -> Result<Value, EngineError> {
    serde_json::to_value(result).map_err(|e| EngineError::Domain(format!("Unserializable result: {}", e)))
}

fn workflow_id_schema() -> Value {
    json!({"type": "string", "description": "The workflow ID"})
}

/// Declares a unit struct implementing [`Operation`] by delegating to an
/// engine method.
macro_rules! engine_operation {
    (
        $(#[$meta:meta])*
        $ty:ident {
            name: $name:literal,
            description: $description:literal,
            steps: $steps:expr,
            params: $params:ty,
            method: $method:ident,
            schema: $schema:expr $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $ty;

        #[async_trait]
        impl Operation for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn description(&self) -> &str {
                $description
            }

            fn allowed_steps(&self) -> &'static [Step] {
                $steps
            }

            fn parameters_schema(&self) -> Value {
                $schema
            }

            async fn execute(&self, engine: &FinetuneEngine, args: Value) -> Result<Value, EngineError> {
                let params: $params = parse_params(args)?;
                to_value(engine.$method(params).await?)
            }
        }
    };
}

engine_operation!(StartFinetuneWorkflow {
    name: "start_finetune_workflow",
    description: "Initialize a finetune workflow for a dataset. Validates records and sets up the workflow state.",
    steps: UNGATED,
    params: StartWorkflowParams,
    method: start_finetune_workflow,
    schema: json!({
        "type": "object",
        "properties": {
            "dataset_id": {"type": "string", "description": "The dataset to create a workflow for"},
            "training_goals": {"type": "string", "description": "Desired model behaviors"}
        },
        "required": ["dataset_id", "training_goals"]
    }),
});

engine_operation!(GetWorkflowStatus {
    name: "get_workflow_status",
    description: "Get the current state of a workflow including step progress, coverage and results.",
    steps: UNGATED,
    params: StatusParams,
    method: get_workflow_status,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": {"type": "string", "description": "The workflow ID (optional if dataset_id is given)"},
            "dataset_id": {"type": "string", "description": "The dataset ID (optional if workflow_id is given)"}
        },
        "required": []
    }),
});

engine_operation!(AdvanceToStep {
    name: "advance_to_step",
    description: "Move the workflow to the next step once the current step's requirements are met.",
    steps: UNGATED,
    params: AdvanceParams,
    method: advance_to_step,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "step": {"type": "string", "enum": Step::ALL.iter().map(|s| s.as_str()).collect::<Vec<_>>()}
        },
        "required": ["workflow_id", "step"]
    }),
});

engine_operation!(RollbackToStep {
    name: "rollback_to_step",
    description: "Return to an earlier step or restore a snapshot. Data of later steps is cleared.",
    steps: UNGATED,
    params: RollbackParams,
    method: rollback_to_step,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "step": {"type": "string", "description": "An earlier step"},
            "snapshot_id": {"type": "string", "description": "A snapshot recorded on advance"}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(ApplyTopicHierarchy {
    name: "apply_topic_hierarchy",
    description: "Apply a user-edited topic hierarchy to the dataset.",
    steps: gate::APPLY_TOPIC_HIERARCHY,
    params: ApplyHierarchyParams,
    method: apply_topic_hierarchy,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "hierarchy": {
                "type": "array",
                "description": "Topic nodes with id, name (or label/title) and optional children",
                "items": {"type": "object"}
            }
        },
        "required": ["workflow_id", "hierarchy"]
    }),
});

engine_operation!(GenerateTopics {
    name: "generate_topics",
    description: "Generate a topic hierarchy from the training goals and sample records.",
    steps: gate::GENERATE_TOPICS,
    params: GenerateTopicsParams,
    method: generate_topics,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "max_depth": {"type": "integer", "default": 3, "minimum": 1, "maximum": 5},
            "degree": {"type": "integer", "default": 3, "minimum": 1, "maximum": 10}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(CategorizeRecords {
    name: "categorize_records",
    description: "Assign records to leaf topics, keeping assignments above the confidence threshold.",
    steps: gate::CATEGORIZE_RECORDS,
    params: CategorizeParams,
    method: categorize_records,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "confidence_threshold": {"type": "number", "default": 0.7, "minimum": 0, "maximum": 1}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(AnalyzeCoverage {
    name: "analyze_coverage",
    description: "Measure how evenly records cover the leaf topics.",
    steps: gate::ANALYZE_COVERAGE,
    params: AnalyzeCoverageParams,
    method: analyze_coverage,
    schema: json!({
        "type": "object",
        "properties": {"workflow_id": workflow_id_schema()},
        "required": ["workflow_id"]
    }),
});

engine_operation!(GenerateSyntheticData {
    name: "generate_synthetic_data",
    description: "Generate synthetic records for under-represented topics and record the round.",
    steps: gate::GENERATE_SYNTHETIC_DATA,
    params: GenerateSyntheticParams,
    method: generate_synthetic_data,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "strategy": {
                "type": "string",
                "enum": ["message_variation", "few_shot", "topic_description", "scenario_expansion", "tool_chain"],
                "default": "message_variation"
            },
            "target_topics": {"type": "array", "items": {"type": "string"}},
            "count_per_topic": {"type": "integer", "default": 10, "minimum": 1, "maximum": 100},
            "max_turns": {"type": "integer", "default": 3, "minimum": 1, "maximum": 10}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(ConfigureGrader {
    name: "configure_grader",
    description: "Configure the evaluator used for dry runs and training rewards.",
    steps: gate::CONFIGURE_GRADER,
    params: ConfigureGraderParams,
    method: configure_grader,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "grader_type": {"type": "string", "enum": ["llm_as_judge", "js"]},
            "config": {
                "type": "object",
                "description": "llm_as_judge: prompt_template, output_schema, model, temperature, max_tokens; js: script"
            }
        },
        "required": ["workflow_id", "grader_type", "config"]
    }),
});

engine_operation!(TestGraderSample {
    name: "test_grader_sample",
    description: "Grade a few sample records to preview the evaluator.",
    steps: gate::TEST_GRADER_SAMPLE,
    params: TestGraderParams,
    method: test_grader_sample,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "sample_size": {"type": "integer", "default": 5, "minimum": 1, "maximum": 50}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(RunDryRun {
    name: "run_dry_run",
    description: "Grade a sample of the dataset and decide whether it is ready for training.",
    steps: gate::RUN_DRY_RUN,
    params: DryRunParams,
    method: run_dry_run,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "sample_percentage": {"type": "number", "default": 10, "minimum": 1, "maximum": 100}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(StartTraining {
    name: "start_training",
    description: "Submit a fine-tuning job once the dry run allows it.",
    steps: gate::START_TRAINING,
    params: StartTrainingParams,
    method: start_training,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "base_model": {"type": "string", "default": "llama-v3-8b-instruct"},
            "training_params": {"type": "object"},
            "display_name": {"type": "string"}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(CheckTrainingStatus {
    name: "check_training_status",
    description: "Poll the training backend for the job's status and progress.",
    steps: gate::CHECK_TRAINING_STATUS,
    params: CheckTrainingParams,
    method: check_training_status,
    schema: json!({
        "type": "object",
        "properties": {"workflow_id": workflow_id_schema()},
        "required": ["workflow_id"]
    }),
});

engine_operation!(DeployModel {
    name: "deploy_model",
    description: "Deploy the fine-tuned model and complete the workflow.",
    steps: gate::DEPLOY_MODEL,
    params: DeployModelParams,
    method: deploy_model,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "deployment_name": {"type": "string"}
        },
        "required": ["workflow_id"]
    }),
});

engine_operation!(ValidateRecords {
    name: "validate_records",
    description: "Check every record of a dataset for structural problems and duplicates.",
    steps: UNGATED,
    params: DatasetParams,
    method: validate_records,
    schema: json!({
        "type": "object",
        "properties": {"dataset_id": {"type": "string"}},
        "required": ["dataset_id"]
    }),
});

engine_operation!(GetDatasetStats {
    name: "get_dataset_stats",
    description: "Summarize a dataset: record counts, messages, topics and validation results.",
    steps: UNGATED,
    params: DatasetParams,
    method: get_dataset_stats,
    schema: json!({
        "type": "object",
        "properties": {"dataset_id": {"type": "string"}},
        "required": ["dataset_id"]
    }),
});

engine_operation!(UpdateRecord {
    name: "update_record",
    description: "Manually correct a record's topic assignment or its input messages.",
    steps: UNGATED,
    params: UpdateRecordParams,
    method: update_record,
    schema: json!({
        "type": "object",
        "properties": {
            "workflow_id": workflow_id_schema(),
            "record_id": {"type": "string", "description": "The record to update"},
            "updates": {
                "type": "object",
                "description": "Fields to update",
                "properties": {
                    "topic": {"type": "string", "description": "A leaf topic of the dataset's hierarchy"},
                    "messages": {"type": "array", "items": {"type": "object"}, "description": "Replacement input messages"}
                }
            }
        },
        "required": ["workflow_id", "record_id", "updates"]
    }),
});

/// Every engine operation.
pub fn all() -> Vec<Arc<dyn Operation>> {
    vec![
        Arc::new(StartFinetuneWorkflow),
        Arc::new(GetWorkflowStatus),
        Arc::new(AdvanceToStep),
        Arc::new(RollbackToStep),
        Arc::new(ApplyTopicHierarchy),
        Arc::new(GenerateTopics),
        Arc::new(CategorizeRecords),
        Arc::new(AnalyzeCoverage),
        Arc::new(GenerateSyntheticData),
        Arc::new(ConfigureGrader),
        Arc::new(TestGraderSample),
        Arc::new(RunDryRun),
        Arc::new(StartTraining),
        Arc::new(CheckTrainingStatus),
        Arc::new(DeployModel),
        Arc::new(ValidateRecords),
        Arc::new(GetDatasetStats),
        Arc::new(UpdateRecord),
    ]
}
