//! Dispersion statistics over repetition weights.
//!
//! The coefficient of variation uses the population standard deviation
//! (divide by N). A zero mean leaves the CV undefined, and an undefined CV
//! never satisfies a threshold.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// CV threshold (percent) for regular seed lots
pub const FINE_CV_THRESHOLD: f64 = 4.0;

/// CV threshold (percent) for coarse seed lots
pub const COARSE_CV_THRESHOLD: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightStatistics {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Coefficient of variation in percent; `None` when the mean is zero
    pub cv: Option<f64>,
}

impl WeightStatistics {
    /// Returns `None` for an empty slice.
    pub fn from_weights(weights: &[f64]) -> Option<Self> {
        if weights.is_empty() {
            return None;
        }

        let mean = weights.iter().mean();
        let std_dev = weights.iter().population_std_dev();

        let cv = if mean == 0.0 || !mean.is_finite() {
            None
        } else {
            Some(std_dev / mean * 100.0).filter(|cv| cv.is_finite())
        };

        Some(Self {
            count: weights.len(),
            mean,
            std_dev,
            cv,
        })
    }
}

/// Coefficient of variation (percent) of `weights`.
pub fn compute_cv(weights: &[f64]) -> Option<f64> {
    WeightStatistics::from_weights(weights).and_then(|s| s.cv)
}

pub fn cv_threshold(is_coarse_seed: bool) -> f64 {
    if is_coarse_seed {
        COARSE_CV_THRESHOLD
    } else {
        FINE_CV_THRESHOLD
    }
}

/// An undefined CV is never acceptable.
pub fn is_acceptable(cv: Option<f64>, threshold: f64) -> bool {
    matches!(cv, Some(cv) if cv <= threshold)
}
