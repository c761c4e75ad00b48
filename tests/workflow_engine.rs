//! End-to-end workflow tests through the operation registry.

mod common;

use common::{Harness, DATASET_ID};
use finetune_forge::collaborators::{InMemoryRecordStore, RecordStore};
use finetune_forge::workflow::SqliteRepository;
use finetune_forge::WorkflowStore;
use serde_json::json;
use std::sync::Arc;

async fn status(harness: &Harness, workflow_id: &str) -> serde_json::Value {
    harness
        .ok("get_workflow_status", json!({"workflow_id": workflow_id}))
        .await
}

#[tokio::test]
async fn test_full_lifecycle_reaches_completed() {
    let harness = Harness::new();
    let id = harness.start().await;

    let topics = harness
        .ok("generate_topics", json!({"workflow_id": id, "max_depth": 2, "degree": 3}))
        .await;
    assert_eq!(topics["topic_count"], 3);
    assert_eq!(topics["depth"], 2);

    harness.advance(&id, "categorize").await;
    let categorized = harness.ok("categorize_records", json!({"workflow_id": id})).await;
    assert_eq!(categorized["assigned_count"], 8);
    assert_eq!(categorized["unclassified_count"], 0);

    harness.advance(&id, "coverage_generation").await;
    let coverage = harness.ok("analyze_coverage", json!({"workflow_id": id})).await;
    let before = coverage["balance_score"].as_f64().expect("balance score");
    assert!(before < 1.0, "skewed dataset should not be balanced: {}", coverage);

    let round = harness
        .ok("generate_synthetic_data", json!({"workflow_id": id, "count_per_topic": 3}))
        .await;
    let targeted = round["topics_targeted"].as_array().expect("targets").len();
    assert!(targeted > 0);
    assert_eq!(round["round"], 1);
    assert_eq!(round["records_valid"], 3 * targeted);
    assert_eq!(round["records_rejected"], targeted);
    assert!(round["balance_score_after"].as_f64().expect("after") > before);

    harness.advance(&id, "grader_config").await;
    harness
        .ok(
            "configure_grader",
            json!({
                "workflow_id": id,
                "grader_type": "llm_as_judge",
                "config": {"prompt_template": "Rate this reply: {{output}}"}
            }),
        )
        .await;
    let preview = harness
        .ok("test_grader_sample", json!({"workflow_id": id, "sample_size": 3}))
        .await;
    assert_eq!(preview["sample_size"], 3);

    harness.advance(&id, "dry_run").await;
    let dry_run = harness
        .ok("run_dry_run", json!({"workflow_id": id, "sample_percentage": 50}))
        .await;
    assert_eq!(dry_run["verdict"], "GO");
    assert_eq!(dry_run["ready_for_training"], true);

    harness.advance(&id, "training").await;
    let started = harness.ok("start_training", json!({"workflow_id": id})).await;
    assert_eq!(started["job_id"], "job-1");
    assert_eq!(started["status"], "queued");
    {
        let submissions = harness.training.submissions.lock().expect("submissions lock poisoned");
        assert_eq!(submissions[0].display_name, "Support Fine-tune");
        assert_eq!(submissions[0].records.len(), started["record_count"].as_u64().expect("count") as usize);
    }

    let running = harness.ok("check_training_status", json!({"workflow_id": id})).await;
    assert_eq!(running["status"], "running");
    let blocked = harness
        .call("advance_to_step", json!({"workflow_id": id, "step": "deployment"}))
        .await;
    assert_eq!(blocked["success"], false);

    harness.training.complete("ft-support-1");
    let done = harness.ok("check_training_status", json!({"workflow_id": id})).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["progress"], 100);
    assert_eq!(done["persisted"], true);

    harness.advance(&id, "deployment").await;
    let deployed = harness.ok("deploy_model", json!({"workflow_id": id})).await;
    assert_eq!(deployed["current_step"], "completed");
    assert_eq!(deployed["model_id"], "ft-support-1");
    assert_eq!(deployed["deployment_name"], format!("{}-deployment", DATASET_ID));

    let after = harness.ok("check_training_status", json!({"workflow_id": id})).await;
    assert_eq!(after["persisted"], false);

    let final_status = status(&harness, &id).await;
    assert_eq!(final_status["workflow"]["current_step"], "completed");
    assert!(final_status.get("next_step").is_none());
}

#[tokio::test]
async fn test_gated_operation_leaves_state_untouched() {
    let harness = Harness::new();
    let id = harness.start().await;
    let before = status(&harness, &id).await;

    let response = harness
        .call("run_dry_run", json!({"workflow_id": id}))
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "state");

    let after = status(&harness, &id).await;
    assert_eq!(before["workflow"], after["workflow"]);
}

#[tokio::test]
async fn test_steps_cannot_be_skipped() {
    let harness = Harness::new();
    let id = harness.start().await;
    harness.ok("generate_topics", json!({"workflow_id": id})).await;

    let skipped = harness
        .call("advance_to_step", json!({"workflow_id": id, "step": "coverage_generation"}))
        .await;
    assert_eq!(skipped["success"], false);
    assert_eq!(skipped["error_kind"], "state");
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let harness = Harness::new();
    let id = harness.at_coverage().await;

    let zero = harness
        .call("generate_synthetic_data", json!({"workflow_id": id, "count_per_topic": 0}))
        .await;
    assert_eq!(zero["error_kind"], "validation");

    let unknown = harness
        .call("generate_synthetic_data", json!({"workflow_id": id, "target_topics": ["Returns"]}))
        .await;
    assert_eq!(unknown["error_kind"], "validation");

    let missing = harness.call("analyze_coverage", json!({})).await;
    assert_eq!(missing["error_kind"], "validation");

    let unknown_op = harness.call("summon_model", json!({})).await;
    assert_eq!(unknown_op["success"], false);
}

#[tokio::test]
async fn test_repeated_generation_rounds_are_numbered() {
    let harness = Harness::new();
    let id = harness.at_coverage().await;
    harness.ok("analyze_coverage", json!({"workflow_id": id})).await;

    for expected in 1..=3 {
        let round = harness
            .ok("generate_synthetic_data", json!({"workflow_id": id, "count_per_topic": 2}))
            .await;
        assert_eq!(round["round"], expected);
    }

    let current = status(&harness, &id).await;
    assert_eq!(current["generation_rounds"], 3);
    let coverage = harness.ok("analyze_coverage", json!({"workflow_id": id})).await;
    assert_eq!(coverage["generation_rounds"], 3);
    assert!(coverage["synthetic_count"].as_u64().expect("synthetic count") > 0);
}

#[tokio::test]
async fn test_concurrent_generation_keeps_every_round() {
    let harness = Harness::new();
    let id = harness.at_coverage().await;

    let calls = (0..4).map(|_| {
        harness.call(
            "generate_synthetic_data",
            json!({"workflow_id": id, "count_per_topic": 1}),
        )
    });
    let responses = futures::future::join_all(calls).await;
    assert!(responses.iter().all(|r| r["success"] == true));

    let mut rounds: Vec<u64> = responses
        .iter()
        .map(|r| r["round"].as_u64().expect("round number"))
        .collect();
    rounds.sort_unstable();
    assert_eq!(rounds, vec![1, 2, 3, 4]);

    let current = status(&harness, &id).await;
    assert_eq!(current["generation_rounds"], 4);
}

#[tokio::test]
async fn test_rollback_clears_later_steps_and_keeps_snapshots() {
    let harness = Harness::new();
    let id = harness.at_coverage().await;
    harness.ok("analyze_coverage", json!({"workflow_id": id})).await;

    let rolled = harness
        .ok("rollback_to_step", json!({"workflow_id": id, "step": "categorize"}))
        .await;
    assert_eq!(rolled["previous_step"], "coverage_generation");
    assert_eq!(rolled["current_step"], "categorize");

    let current = status(&harness, &id).await;
    assert!(current["workflow"].get("coverage_generation").is_none());
    assert!(current["workflow"].get("categorization").is_some());
    let snapshots = current["snapshots"].as_array().expect("snapshots");
    assert_eq!(snapshots.len(), 2);

    let first = snapshots
        .iter()
        .find(|s| s["step"] == "topics_config")
        .expect("snapshot taken when leaving topics_config");
    let restored = harness
        .ok(
            "rollback_to_step",
            json!({"workflow_id": id, "snapshot_id": first["snapshot_id"]}),
        )
        .await;
    assert_eq!(restored["current_step"], "topics_config");

    let both = harness
        .call(
            "rollback_to_step",
            json!({"workflow_id": id, "step": "topics_config", "snapshot_id": "x"}),
        )
        .await;
    assert_eq!(both["error_kind"], "validation");
}

#[tokio::test]
async fn test_low_scores_block_training() {
    let records = Arc::new(InMemoryRecordStore::new());
    records.insert(common::support_dataset());
    let harness = Harness::with_parts(WorkflowStore::in_memory(), records, 0.2);
    let id = harness.at_coverage().await;
    harness.ok("analyze_coverage", json!({"workflow_id": id})).await;
    harness.advance(&id, "grader_config").await;
    harness
        .ok(
            "configure_grader",
            json!({
                "workflow_id": id,
                "grader_type": "llm_as_judge",
                "config": {"prompt_template": "Rate: {{output}}"}
            }),
        )
        .await;
    harness.advance(&id, "dry_run").await;

    let dry_run = harness.ok("run_dry_run", json!({"workflow_id": id})).await;
    assert_eq!(dry_run["verdict"], "NO-GO");

    let blocked = harness
        .call("advance_to_step", json!({"workflow_id": id, "step": "training"}))
        .await;
    assert_eq!(blocked["success"], false);
    assert_eq!(blocked["error_kind"], "state");
}

#[tokio::test]
async fn test_status_lookup_by_dataset() {
    let harness = Harness::new();
    let missing = harness
        .ok("get_workflow_status", json!({"dataset_id": DATASET_ID}))
        .await;
    assert_eq!(missing["exists"], false);

    let id = harness.start().await;
    let found = harness
        .ok("get_workflow_status", json!({"dataset_id": DATASET_ID}))
        .await;
    assert_eq!(found["exists"], true);
    assert_eq!(found["workflow"]["id"], id);
    assert_eq!(found["next_step"], "categorize");

    let unknown = harness
        .call("get_workflow_status", json!({"workflow_id": "nope"}))
        .await;
    assert_eq!(unknown["error_kind"], "state");
}

#[tokio::test]
async fn test_workflow_survives_reopening_sqlite() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let url = format!("sqlite://{}", dir.path().join("workflows.db").display());
    let records = Arc::new(InMemoryRecordStore::new());
    records.insert(common::support_dataset());

    let id = {
        let repository = SqliteRepository::connect(&url).await.expect("should open db");
        let harness = Harness::with_parts(
            WorkflowStore::new(Arc::new(repository)),
            records.clone(),
            0.9,
        );
        let id = harness.at_coverage().await;
        harness
            .ok("generate_synthetic_data", json!({"workflow_id": id, "count_per_topic": 1}))
            .await;
        id
    };

    let repository = SqliteRepository::connect(&url).await.expect("should reopen db");
    let harness = Harness::with_parts(WorkflowStore::new(Arc::new(repository)), records, 0.9);
    let current = status(&harness, &id).await;
    assert_eq!(current["workflow"]["current_step"], "coverage_generation");
    assert_eq!(current["generation_rounds"], 1);
    assert_eq!(current["snapshots"].as_array().expect("snapshots").len(), 2);
}

#[tokio::test]
async fn test_dataset_operations_run_at_any_step() {
    let harness = Harness::new();
    let validation = harness
        .ok("validate_records", json!({"dataset_id": DATASET_ID}))
        .await;
    assert_eq!(validation["valid_count"], 8);

    let stats = harness
        .ok("get_dataset_stats", json!({"dataset_id": DATASET_ID}))
        .await;
    assert_eq!(stats["total_records"], 8);
    assert_eq!(stats["uncategorized_count"], 8);
    assert_eq!(stats["has_topic_hierarchy"], false);

    let missing = harness
        .call("get_dataset_stats", json!({"dataset_id": "unknown"}))
        .await;
    assert_eq!(missing["error_kind"], "state");
}

#[tokio::test]
async fn test_update_record_corrects_topic_and_messages() {
    let harness = Harness::new();
    let id = harness.start().await;
    harness.ok("generate_topics", json!({"workflow_id": id})).await;

    let retopic = harness
        .ok(
            "update_record",
            json!({"workflow_id": id, "record_id": "late-0", "updates": {"topic": "Invoices"}}),
        )
        .await;
    assert_eq!(retopic["updated_record"]["topic"], "Invoices");
    assert_eq!(retopic["updated_record"]["message_count"], 2);

    let rewritten = harness
        .ok(
            "update_record",
            json!({
                "workflow_id": id,
                "record_id": "late-0",
                "updates": {"messages": [{"role": "user", "content": "Where is my parcel?"}]}
            }),
        )
        .await;
    assert_eq!(rewritten["updated_record"]["topic"], "Invoices");
    assert_eq!(rewritten["updated_record"]["message_count"], 1);

    let records = harness
        .records
        .get_records(DATASET_ID)
        .await
        .expect("should list records");
    let late = records.iter().find(|r| r.id == "late-0").expect("record kept");
    assert_eq!(late.topic.as_deref(), Some("Invoices"));
    assert_eq!(late.first_user_message(), Some("Where is my parcel?"));
}

#[tokio::test]
async fn test_update_record_rejects_bad_edits() {
    let harness = Harness::new();
    let id = harness.start().await;
    harness.ok("generate_topics", json!({"workflow_id": id})).await;

    let cases = [
        json!({"workflow_id": id, "record_id": "late-0", "updates": {}}),
        json!({"workflow_id": id, "record_id": "late-0", "updates": {"topic": "Returns"}}),
        json!({"workflow_id": id, "record_id": "late-0", "updates": {"messages": []}}),
        json!({"workflow_id": id, "record_id": "missing", "updates": {"topic": "Delays"}}),
    ];
    for params in cases {
        let response = harness.call("update_record", params.clone()).await;
        assert_eq!(response["error_kind"], "validation", "{} -> {}", params, response);
    }

    let unknown = harness
        .call(
            "update_record",
            json!({"workflow_id": "nope", "record_id": "late-0", "updates": {"topic": "Delays"}}),
        )
        .await;
    assert_eq!(unknown["error_kind"], "state");

    let records = harness
        .records
        .get_records(DATASET_ID)
        .await
        .expect("should list records");
    let late = records.iter().find(|r| r.id == "late-0").expect("record kept");
    assert!(late.topic.is_none());
    assert_eq!(late.first_user_message(), Some("My parcel is late, where is it?"));
}

#[tokio::test]
async fn test_hierarchy_with_shared_leaf_names_is_rejected() {
    let harness = Harness::new();
    let id = harness.start().await;

    let response = harness
        .call(
            "apply_topic_hierarchy",
            json!({
                "workflow_id": id,
                "hierarchy": [
                    {"name": "Billing", "children": [{"name": "Other"}]},
                    {"name": "Shipping", "children": [{"name": "Other"}]},
                    {"name": "Returns"}
                ]
            }),
        )
        .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "domain");

    let stats = harness
        .ok("get_dataset_stats", json!({"dataset_id": DATASET_ID}))
        .await;
    assert_eq!(stats["has_topic_hierarchy"], false);
    let current = status(&harness, &id).await;
    assert!(current["workflow"]["topics_config"].is_null());
}
