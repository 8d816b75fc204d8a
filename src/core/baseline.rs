//! Per-user baseline calibration.
//!
//! Every feature keeps its own running mean and variance (Welford's online
//! algorithm), so the baseline never stores individual windows. During the
//! warm-up phase the caller feeds windows into [`BaselineCalibrator::add`];
//! afterwards it normalizes new windows against the learned baseline. The
//! calibrator has no mode flag of its own: the caller compares
//! [`BaselineCalibrator::count`] with its configured warm-up length.

use crate::core::features::{FeatureKey, FeatureVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of windows absorbed before scoring starts.
pub const DEFAULT_BASELINE_WINDOWS: usize = 10;

/// Floor for the standard deviation used in normalization.
pub const STD_EPSILON: f64 = 1e-6;

/// Running statistics for a single feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BaselineStats {
    /// Number of samples absorbed
    pub count: u64,
    /// Running mean
    pub mean: f64,
    /// Sum of squared deltas from the mean
    pub m2: f64,
}

impl BaselineStats {
    /// Absorb one sample.
    pub fn add(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample variance; 1.0 until two samples exist.
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            1.0
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// z-score of `x` against these statistics.
    pub fn z_score(&self, x: f64) -> f64 {
        (x - self.mean) / self.std_dev().max(STD_EPSILON)
    }
}

/// Online baseline over every feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineCalibrator {
    stats: BTreeMap<FeatureKey, BaselineStats>,
}

impl Default for BaselineCalibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl BaselineCalibrator {
    pub fn new() -> Self {
        Self {
            stats: FeatureKey::ALL
                .iter()
                .map(|&key| (key, BaselineStats::default()))
                .collect(),
        }
    }

    /// Absorb one window into every feature's statistics.
    pub fn add(&mut self, vector: &FeatureVector) {
        for (key, value) in vector.iter() {
            self.stats.entry(key).or_default().add(value);
        }
    }

    /// Number of windows absorbed. All features are updated together, so any
    /// feature's count is the calibrator's count.
    pub fn count(&self) -> u64 {
        self.stats
            .get(&FeatureKey::KeysPerMin)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    /// Whether fewer than `required` windows have been absorbed.
    pub fn is_calibrating(&self, required: usize) -> bool {
        self.count() < required as u64
    }

    /// z-score every feature against the baseline.
    pub fn normalize(&self, vector: &FeatureVector) -> FeatureVector {
        FeatureVector::from_fn(|key| self.stats(key).z_score(vector.get(key)))
    }

    /// Statistics for one feature.
    pub fn stats(&self, key: FeatureKey) -> BaselineStats {
        self.stats.get(&key).copied().unwrap_or_default()
    }

    pub fn mean(&self, key: FeatureKey) -> f64 {
        self.stats(key).mean
    }

    pub fn std_dev(&self, key: FeatureKey) -> f64 {
        self.stats(key).std_dev()
    }

    /// The baseline mean of every feature as a vector.
    pub fn mean_vector(&self) -> FeatureVector {
        FeatureVector::from_fn(|key| self.mean(key))
    }

    /// Forget everything (post-hoc recalibration).
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Load a calibrator from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut loaded: Self = serde_json::from_str(json)?;
        // Files written before a feature existed still get a slot for it.
        for key in FeatureKey::ALL {
            loaded.stats.entry(key).or_default();
        }
        Ok(loaded)
    }

    /// Serialize the calibrator to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
