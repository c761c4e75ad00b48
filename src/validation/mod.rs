//! Record validation for finetune-forge.
//!
//! Records are checked before a workflow starts and on demand through the
//! `validate_records` operation.

pub mod record_validator;

pub use record_validator::{
    estimate_tokens, RecordIssue, RecordIssueKind, RecordValidator, ValidationReport,
    MAX_REPORTED_ERRORS,
};
