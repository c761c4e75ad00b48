//! Prometheus metrics registration and export.
//!
//! All metrics live in process-wide statics so that recording never needs a
//! handle; recording before [`init_metrics`] is a no-op.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all finetune_forge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Engine operations invoked, labeled by operation and status (ok/error kind).
pub static OPERATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Operation latency in seconds, labeled by operation.
pub static OPERATION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Step transitions, labeled by source and target step.
pub static STEP_TRANSITIONS: OnceLock<CounterVec> = OnceLock::new();

/// Balance scores observed by coverage analysis.
pub static BALANCE_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Dry runs, labeled by verdict.
pub static DRY_RUN_VERDICTS: OnceLock<CounterVec> = OnceLock::new();

/// Synthetic records, labeled by outcome (generated/valid).
pub static GENERATED_RECORDS: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling it more than once keeps the first registry.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }
    let registry = Registry::new();

    let operations_total = CounterVec::new(
        Opts::new("finetune_forge_operations_total", "Total engine operations invoked"),
        &["operation", "status"],
    )?;

    let operation_duration = HistogramVec::new(
        HistogramOpts::new(
            "finetune_forge_operation_duration_seconds",
            "Engine operation latency in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["operation"],
    )?;

    let step_transitions = CounterVec::new(
        Opts::new("finetune_forge_step_transitions_total", "Workflow step transitions"),
        &["from", "to"],
    )?;

    let balance_score = Histogram::with_opts(
        HistogramOpts::new("finetune_forge_balance_score", "Observed topic balance scores")
            .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
    )?;

    let dry_run_verdicts = CounterVec::new(
        Opts::new("finetune_forge_dry_run_verdicts_total", "Dry-run verdicts"),
        &["verdict"],
    )?;

    let generated_records = CounterVec::new(
        Opts::new("finetune_forge_generated_records_total", "Synthetic records produced"),
        &["outcome"],
    )?;

    registry.register(Box::new(operations_total.clone()))?;
    registry.register(Box::new(operation_duration.clone()))?;
    registry.register(Box::new(step_transitions.clone()))?;
    registry.register(Box::new(balance_score.clone()))?;
    registry.register(Box::new(dry_run_verdicts.clone()))?;
    registry.register(Box::new(generated_records.clone()))?;

    // A concurrent initializer may win; either registry is complete.
    let _ = REGISTRY.set(registry);
    let _ = OPERATIONS_TOTAL.set(operations_total);
    let _ = OPERATION_DURATION.set(operation_duration);
    let _ = STEP_TRANSITIONS.set(step_transitions);
    let _ = BALANCE_SCORE.set(balance_score);
    let _ = DRY_RUN_VERDICTS.set(dry_run_verdicts);
    let _ = GENERATED_RECORDS.set(generated_records);

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_init() {
        init_metrics().expect("should init");
        if let Some(ops) = OPERATIONS_TOTAL.get() {
            ops.with_label_values(&["test_export", "ok"]).inc();
        }
        let text = export_metrics();
        assert!(!text.starts_with("# Error"));
        assert!(text.contains("finetune_forge_operations_total"));
    }
}
