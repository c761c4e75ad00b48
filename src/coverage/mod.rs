//! Coverage analysis for topic-labelled datasets.
//!
//! [`CoverageAnalyzer`] is pure: the same records and hierarchy always
//! produce the same [`CoverageReport`]. [`GenerationPlan`] turns a report
//! into per-topic generation targets.

pub mod analyzer;
pub mod targets;

pub use analyzer::{
    balance_score, BalanceRating, CoverageAnalyzer, CoverageDistributionEntry, CoverageReport,
    CoverageStatus, UNCATEGORIZED_TOPIC,
};
pub use targets::{GapPriority, GenerationPlan, GenerationTarget, MIN_TARGET_TOTAL};
