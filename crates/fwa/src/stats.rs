//! Per-feature descriptive statistics.
//!
//! Computed once during model fitting and reused for every subsequent
//! prediction until the model is refit.

use serde::{Deserialize, Serialize};

/// Mean, spread, and quartiles for one feature dimension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureStatistics {
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p25: f64,
    pub p75: f64,
}

impl FeatureStatistics {
    /// Compute statistics over a value slice. An empty slice yields all-zero
    /// statistics (no variance = no anomaly signal).
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Self {
            mean,
            std_dev: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            p25: percentile_sorted(&sorted, 0.25),
            p75: percentile_sorted(&sorted, 0.75),
        }
    }

    /// Z-score of a value against these statistics. Returns 0 when the
    /// distribution has no variance.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev <= f64::EPSILON {
            return 0.0;
        }
        (value - self.mean) / self.std_dev
    }

    /// Interquartile range.
    pub fn iqr(&self) -> f64 {
        self.p75 - self.p25
    }

    /// Whether the distribution is degenerate (all values equal).
    pub fn is_degenerate(&self) -> bool {
        self.std_dev <= f64::EPSILON
    }
}

/// Linear-interpolation percentile over a pre-sorted slice. `q` in [0, 1].
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_stats() {
        let stats = FeatureStatistics::from_values(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((stats.mean - 3.0).abs() < 1e-10);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 5.0);
        assert!((stats.p25 - 2.0).abs() < 1e-10);
        assert!((stats.p75 - 4.0).abs() < 1e-10);
        assert!((stats.iqr() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn empty_values_yield_zeros() {
        let stats = FeatureStatistics::from_values(&[]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.std_dev, 0.0);
        assert!(stats.is_degenerate());
    }

    #[test]
    fn z_score_zero_variance() {
        let stats = FeatureStatistics::from_values(&[5.0, 5.0, 5.0]);
        assert!(stats.is_degenerate());
        assert_eq!(stats.z_score(100.0), 0.0);
    }

    #[test]
    fn z_score_symmetric() {
        let stats = FeatureStatistics::from_values(&[0.0, 10.0]);
        let above = stats.z_score(stats.mean + 3.0);
        let below = stats.z_score(stats.mean - 3.0);
        assert!((above + below).abs() < 1e-10);
    }

    #[test]
    fn percentile_interpolates() {
        let sorted = vec![0.0, 10.0];
        assert!((percentile_sorted(&sorted, 0.5) - 5.0).abs() < 1e-10);
        assert_eq!(percentile_sorted(&sorted, 0.0), 0.0);
        assert_eq!(percentile_sorted(&sorted, 1.0), 10.0);
    }

    #[test]
    fn percentile_single_value() {
        assert_eq!(percentile_sorted(&[7.0], 0.75), 7.0);
    }
}
