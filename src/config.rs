//! Engine configuration.
//!
//! Values come from defaults, an optional YAML file and `FINETUNE_*`
//! environment variables, in that order of precedence (environment wins).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::collaborators::DEFAULT_GRADING_CONCURRENCY;
use crate::dry_run::{DEFAULT_PASS_THRESHOLD, DEFAULT_SAMPLE_PERCENTAGE};
use crate::training::DEFAULT_BASE_MODEL;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Configuration for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Workflow database, e.g. `sqlite://finetune-forge.db`.
    pub database_url: String,
    /// Directory holding `<dataset_id>.json` record files.
    pub records_path: PathBuf,
    /// Score at or above which a dry-run sample passes.
    pub pass_threshold: f64,
    /// Default minimum confidence for applying a topic assignment.
    pub confidence_threshold: f64,
    /// Default share of records graded in a dry run, 1-100.
    pub sample_percentage: f64,
    /// Seed for dry-run sampling; random when unset.
    pub sample_seed: Option<u64>,
    /// Grading requests in flight at once.
    pub grading_concurrency: usize,
    pub default_base_model: String,
    pub training_api_base: Option<String>,
    pub training_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://finetune-forge.db".to_string(),
            records_path: PathBuf::from("./datasets"),
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            confidence_threshold: 0.7,
            sample_percentage: DEFAULT_SAMPLE_PERCENTAGE,
            sample_seed: None,
            grading_concurrency: DEFAULT_GRADING_CONCURRENCY,
            default_base_model: DEFAULT_BASE_MODEL.to_string(),
            training_api_base: None,
            training_api_key: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a YAML file; missing keys keep their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FINETUNE_DATABASE_URL`: workflow database (default: sqlite://finetune-forge.db)
    /// - `FINETUNE_RECORDS_PATH`: dataset file directory (default: ./datasets)
    /// - `FINETUNE_PASS_THRESHOLD`: dry-run pass threshold (default: 0.5)
    /// - `FINETUNE_CONFIDENCE_THRESHOLD`: categorization confidence (default: 0.7)
    /// - `FINETUNE_SAMPLE_PERCENTAGE`: dry-run sample share (default: 10)
    /// - `FINETUNE_SAMPLE_SEED`: dry-run sampling seed
    /// - `FINETUNE_GRADING_CONCURRENCY`: grading requests in flight (default: 8)
    /// - `FINETUNE_DEFAULT_BASE_MODEL`: base model (default: llama-v3-8b-instruct)
    /// - `FINETUNE_TRAINING_API_BASE` / `FINETUNE_TRAINING_API_KEY`: training backend
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Override fields from `FINETUNE_*` environment variables.
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("FINETUNE_DATABASE_URL") {
            self.database_url = val;
        }
        if let Ok(val) = std::env::var("FINETUNE_RECORDS_PATH") {
            self.records_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("FINETUNE_PASS_THRESHOLD") {
            self.pass_threshold = parse_env_value(&val, "FINETUNE_PASS_THRESHOLD")?;
        }
        if let Ok(val) = std::env::var("FINETUNE_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_env_value(&val, "FINETUNE_CONFIDENCE_THRESHOLD")?;
        }
        if let Ok(val) = std::env::var("FINETUNE_SAMPLE_PERCENTAGE") {
            self.sample_percentage = parse_env_value(&val, "FINETUNE_SAMPLE_PERCENTAGE")?;
        }
        if let Ok(val) = std::env::var("FINETUNE_SAMPLE_SEED") {
            self.sample_seed = Some(parse_env_value(&val, "FINETUNE_SAMPLE_SEED")?);
        }
        if let Ok(val) = std::env::var("FINETUNE_GRADING_CONCURRENCY") {
            self.grading_concurrency = parse_env_value(&val, "FINETUNE_GRADING_CONCURRENCY")?;
        }
        if let Ok(val) = std::env::var("FINETUNE_DEFAULT_BASE_MODEL") {
            self.default_base_model = val;
        }
        if let Ok(val) = std::env::var("FINETUNE_TRAINING_API_BASE") {
            self.training_api_base = Some(val);
        }
        if let Ok(val) = std::env::var("FINETUNE_TRAINING_API_KEY") {
            self.training_api_key = Some(val);
        }

        self.validate()?;
        Ok(self)
    }

    /// The training backend URL, required by commands that train or deploy.
    pub fn require_training_api_base(&self) -> Result<&str, ConfigError> {
        self.training_api_base
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("FINETUNE_TRAINING_API_BASE".to_string()))
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(ConfigError::ValidationFailed(
                "pass_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::ValidationFailed(
                "confidence_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(1.0..=100.0).contains(&self.sample_percentage) {
            return Err(ConfigError::ValidationFailed(
                "sample_percentage must be between 1 and 100".to_string(),
            ));
        }
        if self.grading_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "grading_concurrency must be at least 1".to_string(),
            ));
        }
        if self.default_base_model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_base_model cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn with_records_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.records_path = path.into();
        self
    }

    pub fn with_pass_threshold(mut self, threshold: f64) -> Self {
        self.pass_threshold = threshold;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_sample_percentage(mut self, percentage: f64) -> Self {
        self.sample_percentage = percentage;
        self
    }

    pub fn with_sample_seed(mut self, seed: u64) -> Self {
        self.sample_seed = Some(seed);
        self
    }

    pub fn with_grading_concurrency(mut self, concurrency: usize) -> Self {
        self.grading_concurrency = concurrency;
        self
    }

    pub fn with_default_base_model(mut self, model: impl Into<String>) -> Self {
        self.default_base_model = model.into();
        self
    }

    pub fn with_training_api(mut self, base: impl Into<String>, key: Option<String>) -> Self {
        self.training_api_base = Some(base.into());
        self.training_api_key = key;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.database_url, "sqlite://finetune-forge.db");
        assert_eq!(config.pass_threshold, 0.5);
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.default_base_model, "llama-v3-8b-instruct");
        assert_eq!(config.grading_concurrency, 8);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        assert!(EngineConfig::new().with_pass_threshold(1.5).validate().is_err());
        assert!(EngineConfig::new().with_confidence_threshold(-0.1).validate().is_err());
        assert!(EngineConfig::new().with_sample_percentage(0.0).validate().is_err());
        assert!(EngineConfig::new().with_database_url("").validate().is_err());
        assert!(EngineConfig::new().with_grading_concurrency(0).validate().is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let seed: u64 = parse_env_value(" 42 ", "FINETUNE_SAMPLE_SEED").expect("should parse");
        assert_eq!(seed, 42);
        let err = parse_env_value::<f64>("high", "FINETUNE_PASS_THRESHOLD").expect_err("not a float");
        assert!(err.to_string().contains("FINETUNE_PASS_THRESHOLD"));
    }

    #[test]
    fn test_yaml_file_keeps_defaults_for_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
        writeln!(file, "pass_threshold: 0.6\nsample_seed: 7").expect("should write");
        let config = EngineConfig::from_yaml_file(file.path()).expect("should load");
        assert_eq!(config.pass_threshold, 0.6);
        assert_eq!(config.sample_seed, Some(7));
        assert_eq!(config.confidence_threshold, 0.7);
    }

    #[test]
    fn test_training_api_required() {
        let config = EngineConfig::new();
        assert!(matches!(
            config.require_training_api_base(),
            Err(ConfigError::MissingEnvVar(_))
        ));
        let config = config.with_training_api("http://train", None);
        assert_eq!(config.require_training_api_base().expect("set"), "http://train");
    }
}
