//! Uniform record sampling for grading passes.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::EngineError;

/// Default share of the dataset graded in a dry run.
pub const DEFAULT_SAMPLE_PERCENTAGE: f64 = 10.0;

/// Number of records to grade for a dataset of `total` records.
///
/// Always at least one record when the dataset is non-empty.
pub fn sample_size(total: usize, percentage: f64) -> Result<usize, EngineError> {
    if !(percentage > 0.0 && percentage <= 100.0) {
        return Err(EngineError::validation(format!(
            "sample_percentage must be in (0, 100], got {}",
            percentage
        )));
    }
    if total == 0 {
        return Ok(0);
    }
    let size = (total as f64 * percentage / 100.0).floor() as usize;
    Ok(size.clamp(1, total))
}

/// Draws samples without replacement, optionally from a fixed seed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordSampler {
    seed: Option<u64>,
}

impl RecordSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    fn create_rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Pick `size` distinct items, keeping their original relative order.
    pub fn sample<T: Clone>(&self, items: &[T], size: usize) -> Vec<T> {
        if size >= items.len() {
            return items.to_vec();
        }
        let mut indices: Vec<usize> = (0..items.len()).collect();
        indices.shuffle(&mut self.create_rng());
        let mut chosen: Vec<usize> = indices.into_iter().take(size).collect();
        chosen.sort_unstable();
        chosen.into_iter().map(|i| items[i].clone()).collect()
    }
}
