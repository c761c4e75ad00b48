//! Synthetic-data generation bookkeeping.
//!
//! Each attempt to fill coverage gaps is recorded as an immutable
//! [`GenerationRound`] appended to the workflow's coverage bag.

pub mod round;
pub mod tracker;

pub use round::{GenerationHistoryEntry, GenerationRound, GenerationStrategy};
pub use tracker::{CoverageGeneration, GenerationOutcome, GenerationRoundTracker};
