//! High-level recording interface over the Prometheus statics.

use std::time::Duration;

use super::prometheus::{
    BALANCE_SCORE, DRY_RUN_VERDICTS, GENERATED_RECORDS, OPERATIONS_TOTAL, OPERATION_DURATION,
    STEP_TRANSITIONS,
};

/// Records engine metrics. Cheap to clone; a no-op until metrics are initialized.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one operation invocation.
    ///
    /// `status` is `ok` or the error kind code.
    pub fn record_operation(&self, operation: &str, status: &str, elapsed: Duration) {
        if let Some(total) = OPERATIONS_TOTAL.get() {
            total.with_label_values(&[operation, status]).inc();
        }
        if let Some(duration) = OPERATION_DURATION.get() {
            duration
                .with_label_values(&[operation])
                .observe(elapsed.as_secs_f64());
        }

        tracing::trace!(
            operation = operation,
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Recorded operation metric"
        );
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        if let Some(transitions) = STEP_TRANSITIONS.get() {
            transitions.with_label_values(&[from, to]).inc();
        }
    }

    /// Record a balance score; values are clamped to [0, 1].
    pub fn record_balance_score(&self, score: f64) {
        if let Some(histogram) = BALANCE_SCORE.get() {
            histogram.observe(score.clamp(0.0, 1.0));
        }
    }

    pub fn record_dry_run_verdict(&self, verdict: &str) {
        if let Some(verdicts) = DRY_RUN_VERDICTS.get() {
            verdicts.with_label_values(&[verdict]).inc();
        }
    }

    pub fn record_generated(&self, generated: usize, valid: usize) {
        if let Some(records) = GENERATED_RECORDS.get() {
            records.with_label_values(&["generated"]).inc_by(generated as f64);
            records.with_label_values(&["valid"]).inc_by(valid as f64);
        }
    }
}
