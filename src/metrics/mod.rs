//! Prometheus metrics for engine operations.
//!
//! ```ignore
//! use finetune_forge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! MetricsCollector::new().record_dry_run_verdict("GO");
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{
    export_metrics, init_metrics, BALANCE_SCORE, DRY_RUN_VERDICTS, GENERATED_RECORDS,
    OPERATIONS_TOTAL, OPERATION_DURATION, REGISTRY, STEP_TRANSITIONS,
};
