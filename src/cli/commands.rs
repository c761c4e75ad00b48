//! CLI command definitions for finetune-forge.

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::collaborators::{
    FileRecordStore, HttpTrainingBackend, LlmJudgeGrader, LlmSyntheticGenerator, LlmTopicService,
};
use crate::config::EngineConfig;
use crate::engine::{Collaborators, FinetuneEngine};
use crate::llm::{LiteLlmClient, LlmProvider};
use crate::metrics::{export_metrics, init_metrics};
use crate::tools::OperationRegistry;
use crate::workflow::{SqliteRepository, WorkflowStore};

/// Guided fine-tuning workflows for conversation datasets.
#[derive(Parser)]
#[command(name = "finetune-forge")]
#[command(about = "Walk conversation datasets through topic coverage, grading and fine-tuning")]
#[command(version)]
#[command(
    long_about = "finetune-forge drives a dataset through topic configuration, categorization, coverage \
balancing, grader setup, a dry run, training and deployment.\n\nExample usage:\n  \
finetune-forge run start_finetune_workflow --params '{\"dataset_id\":\"support\",\"training_goals\":\"Answer billing questions\"}'"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file; environment variables override it.
    #[arg(short, long, global = true, env = "FINETUNE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Workflow database URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Directory holding `<dataset_id>.json` files.
    #[arg(long, global = true)]
    pub records_path: Option<PathBuf>,

    /// Print Prometheus metrics after the command finishes.
    #[arg(long, global = true)]
    pub print_metrics: bool,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a single operation and print its JSON envelope.
    Run {
        /// Operation name, e.g. `analyze_coverage`.
        operation: String,

        /// Parameters as a JSON object.
        #[arg(short, long, conflicts_with = "params_file")]
        params: Option<String>,

        /// Read parameters from a JSON file.
        #[arg(long)]
        params_file: Option<PathBuf>,
    },

    /// Run `{"operation": ..., ...}` requests, one JSON object per line.
    Batch {
        /// Request file; standard input when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// List available operations.
    #[command(alias = "ops")]
    Operations {
        /// Print full function-calling schemas instead of names.
        #[arg(long)]
        schema: bool,
    },

    /// List stored workflows, newest first.
    Workflows,

    /// Delete a workflow with its snapshots and generation history.
    Delete {
        workflow_id: String,
    },
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse CLI args and run the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    if cli.print_metrics {
        init_metrics().context("failed to initialize metrics")?;
    }
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Operations { schema } => {
            let registry = OperationRegistry::with_default_operations();
            if schema {
                println!("{}", serde_json::to_string_pretty(&registry.to_json_schema())?);
            } else {
                for name in registry.list_operations() {
                    println!("{}", name);
                }
            }
        }
        Commands::Workflows => {
            let engine = build_engine(config).await?;
            for state in engine.list_workflows().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    state.id,
                    state.dataset_id,
                    state.current_step,
                    state.updated_at.to_rfc3339()
                );
            }
        }
        Commands::Delete { workflow_id } => {
            let engine = build_engine(config).await?;
            engine.delete_workflow(&workflow_id).await?;
            info!(workflow_id = %workflow_id, "Workflow deleted");
        }
        Commands::Run {
            operation,
            params,
            params_file,
        } => {
            let args = read_params(params, params_file)?;
            let engine = build_engine(config).await?;
            let registry = OperationRegistry::with_default_operations();
            let response = registry.invoke(&engine, &operation, args).await;
            println!("{}", serde_json::to_string_pretty(&response.to_json())?);
        }
        Commands::Batch { input } => {
            let engine = build_engine(config).await?;
            run_batch(&engine, input).await?;
        }
    }

    if cli.print_metrics {
        print!("{}", export_metrics());
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    }
    .merge_env()?;

    if let Some(url) = &cli.database_url {
        config = config.with_database_url(url.clone());
    }
    if let Some(path) = &cli.records_path {
        config = config.with_records_path(path.clone());
    }
    config.validate()?;
    Ok(config)
}

fn read_params(params: Option<String>, params_file: Option<PathBuf>) -> anyhow::Result<Value> {
    let raw = match (params, params_file) {
        (Some(raw), _) => raw,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => return Ok(Value::Object(Default::default())),
    };
    serde_json::from_str(&raw).context("parameters must be valid JSON")
}

async fn build_engine(config: EngineConfig) -> anyhow::Result<FinetuneEngine> {
    let repository = SqliteRepository::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open workflow database {}", config.database_url))?;

    let llm: Arc<dyn LlmProvider> = Arc::new(LiteLlmClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize LLM client: {}. Set LITELLM_API_BASE (and LITELLM_API_KEY if required).",
            e
        )
    })?);
    let training = HttpTrainingBackend::new(
        config.require_training_api_base()?,
        config.training_api_key.clone(),
    )?;
    info!(
        database = %config.database_url,
        records = %config.records_path.display(),
        training_api = %training.api_base(),
        grading_concurrency = config.grading_concurrency,
        "Engine configured"
    );

    let collaborators = Collaborators {
        records: Arc::new(FileRecordStore::new(config.records_path.clone())),
        topics: Arc::new(LlmTopicService::new(llm.clone())),
        generator: Arc::new(LlmSyntheticGenerator::new(llm.clone())),
        grader: Arc::new(LlmJudgeGrader::with_concurrency(llm, config.grading_concurrency)),
        training: Arc::new(training),
    };
    Ok(FinetuneEngine::new(
        WorkflowStore::new(Arc::new(repository)),
        collaborators,
        config,
    ))
}

async fn run_batch(engine: &FinetuneEngine, input: Option<PathBuf>) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(std::io::BufReader::new(
            std::fs::File::open(&path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(std::io::BufReader::new(std::io::stdin())),
    };

    let registry = OperationRegistry::with_default_operations();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = serde_json::from_str(&line)
            .with_context(|| format!("line {} is not valid JSON", index + 1))?;
        let response = registry.dispatch(engine, request).await;
        println!("{}", serde_json::to_string(&response.to_json())?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_with_params() {
        let cli = Cli::try_parse_from([
            "finetune-forge",
            "run",
            "analyze_coverage",
            "--params",
            r#"{"workflow_id":"wf-1"}"#,
            "--log-level",
            "debug",
        ])
        .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Run { operation, params, .. } => {
                assert_eq!(operation, "analyze_coverage");
                assert!(params.is_some());
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_read_params_defaults_to_empty_object() {
        assert_eq!(read_params(None, None).expect("empty"), serde_json::json!({}));
        let value = read_params(Some(r#"{"step":"categorize"}"#.into()), None).expect("json");
        assert_eq!(value["step"], "categorize");
        assert!(read_params(Some("{".into()), None).is_err());
    }
}
