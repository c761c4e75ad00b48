//! Score statistics for dry-run grading passes.

use serde::{Deserialize, Serialize};

/// Score percentiles using linear interpolation between closest ranks.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

/// Share of scores falling in a fixed-width range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub range: String,
    pub count: usize,
    pub fraction: f64,
}

/// Descriptive statistics over a set of scores in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Percentage (0-100) of scores strictly above zero.
    pub percent_above_zero: f64,
    /// Percentage (0-100) of scores equal to 1.0.
    pub percent_perfect: f64,
    pub percentiles: Percentiles,
    pub buckets: Vec<ScoreBucket>,
}

const BUCKET_EDGES: [f64; 4] = [0.2, 0.4, 0.6, 0.8];
const BUCKET_LABELS: [&str; 5] = ["0.0-0.2", "0.2-0.4", "0.4-0.6", "0.6-0.8", "0.8-1.0"];

impl ScoreStatistics {
    pub fn from_scores(scores: &[f64]) -> Self {
        let count = scores.len();
        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean = mean(scores);
        let std = std_dev(scores, mean);
        let percentiles = Percentiles {
            p10: percentile(&sorted, 10.0),
            p25: percentile(&sorted, 25.0),
            p50: percentile(&sorted, 50.0),
            p75: percentile(&sorted, 75.0),
            p90: percentile(&sorted, 90.0),
        };

        let share = |n: usize| {
            if count == 0 {
                0.0
            } else {
                n as f64 / count as f64
            }
        };

        let mut bucket_counts = [0usize; 5];
        for score in scores {
            let idx = BUCKET_EDGES
                .iter()
                .position(|edge| *score < *edge)
                .unwrap_or(BUCKET_EDGES.len());
            bucket_counts[idx] += 1;
        }
        let buckets = BUCKET_LABELS
            .iter()
            .zip(bucket_counts)
            .map(|(label, n)| ScoreBucket {
                range: label.to_string(),
                count: n,
                fraction: share(n),
            })
            .collect();

        Self {
            count,
            mean,
            std,
            median: percentiles.p50,
            min: sorted.first().copied().unwrap_or(0.0),
            max: sorted.last().copied().unwrap_or(0.0),
            percent_above_zero: 100.0 * share(scores.iter().filter(|s| **s > 0.0).count()),
            percent_perfect: 100.0 * share(scores.iter().filter(|s| **s >= 1.0).count()),
            percentiles,
            buckets,
        }
    }
}

pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

pub fn std_dev(scores: &[f64], mean: f64) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let variance =
        scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    variance.sqrt()
}

/// Percentile `p` (0-100) of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    sorted[lower] * (upper as f64 - index) + sorted[upper] * (index - lower as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_statistics() {
        let stats = ScoreStatistics::from_scores(&[0.0, 0.5, 1.0, 1.0]);
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 0.625).abs() < 1e-9);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 1.0);
        assert_eq!(stats.median, 0.75);
        assert_eq!(stats.percent_above_zero, 75.0);
        assert_eq!(stats.percent_perfect, 50.0);
    }

    #[test]
    fn test_std_is_population() {
        let scores = [0.2, 0.4, 0.6, 0.8];
        let m = mean(&scores);
        assert!((std_dev(&scores, m) - 0.223_606_797_7).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];
        assert!((percentile(&sorted, 25.0) - 0.25).abs() < 1e-9);
        assert!((percentile(&sorted, 90.0) - 0.9).abs() < 1e-9);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_buckets_cover_all_scores() {
        let stats = ScoreStatistics::from_scores(&[0.1, 0.2, 0.45, 0.79, 0.8, 1.0]);
        let counts: Vec<usize> = stats.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 2]);
        let total: f64 = stats.buckets.iter().map(|b| b.fraction).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_scores() {
        let stats = ScoreStatistics::from_scores(&[]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.percent_above_zero, 0.0);
        assert!(stats.buckets.iter().all(|b| b.count == 0));
    }
}
