//! Linear risk scoring and the hysteresis trigger.
//!
//! The score is a weighted sum of z-scores: deliberately simple and auditable.
//! It is not clamped, so its magnitude communicates how far a window sits from
//! the user's own baseline.

use crate::core::features::{FeatureKey, FeatureVector};
use serde::{Deserialize, Serialize};

/// Default score at or above which a window counts as elevated.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 3.0;

/// Default number of consecutive elevated windows needed to fire.
pub const DEFAULT_CONSECUTIVE_WINDOWS: u32 = 2;

fn unit_weight() -> f64 {
    1.0
}

/// Per-feature weights. Missing keys in a configuration file default to 1.0
/// when the file is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureWeights {
    #[serde(default = "unit_weight")]
    pub keys_per_min: f64,
    #[serde(default = "unit_weight")]
    pub backspaces_per_min: f64,
    #[serde(default = "unit_weight")]
    pub pause_ratio: f64,
    #[serde(default = "unit_weight")]
    pub errors_per_min: f64,
    #[serde(default = "unit_weight")]
    pub undo_redo_per_min: f64,
    #[serde(default = "unit_weight")]
    pub cursor_jumps_per_min: f64,
    #[serde(default = "unit_weight")]
    pub file_switches_per_min: f64,
    #[serde(default = "unit_weight")]
    pub code_churn_loc_per_min: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self::uniform(1.0)
    }
}

impl FeatureWeights {
    /// The same weight for every feature.
    pub fn uniform(weight: f64) -> Self {
        Self::from_vector(FeatureVector::from_fn(|_| weight))
    }

    fn from_vector(v: FeatureVector) -> Self {
        Self {
            keys_per_min: v.keys_per_min,
            backspaces_per_min: v.backspaces_per_min,
            pause_ratio: v.pause_ratio,
            errors_per_min: v.errors_per_min,
            undo_redo_per_min: v.undo_redo_per_min,
            cursor_jumps_per_min: v.cursor_jumps_per_min,
            file_switches_per_min: v.file_switches_per_min,
            code_churn_loc_per_min: v.code_churn_loc_per_min,
        }
    }

    fn as_vector(&self) -> FeatureVector {
        FeatureVector {
            keys_per_min: self.keys_per_min,
            backspaces_per_min: self.backspaces_per_min,
            pause_ratio: self.pause_ratio,
            errors_per_min: self.errors_per_min,
            undo_redo_per_min: self.undo_redo_per_min,
            cursor_jumps_per_min: self.cursor_jumps_per_min,
            file_switches_per_min: self.file_switches_per_min,
            code_churn_loc_per_min: self.code_churn_loc_per_min,
        }
    }

    pub fn get(&self, key: FeatureKey) -> f64 {
        self.as_vector().get(key)
    }

    /// Return a copy with one weight replaced.
    pub fn with(self, key: FeatureKey, weight: f64) -> Self {
        Self::from_vector(self.as_vector().with(key, weight))
    }
}

/// Weighted-sum scorer over normalized feature vectors.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: FeatureWeights,
}

impl RiskScorer {
    pub fn new(weights: FeatureWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &FeatureWeights {
        &self.weights
    }

    /// Σ weight[k] · z[k]
    pub fn score(&self, normalized: &FeatureVector) -> f64 {
        normalized
            .iter()
            .map(|(key, z)| self.weights.get(key) * z)
            .sum()
    }
}

/// Trigger bookkeeping carried between windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub above_threshold_streak: u32,
    pub last_score: f64,
}

/// Outcome of feeding one window's score to the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPhase {
    /// Score below threshold; streak is zero
    Below,
    /// Elevated, but not for long enough yet
    Accumulating,
    /// Fired on this window; streak has been reset
    Triggered,
}

impl TriggerPhase {
    pub fn fired(&self) -> bool {
        matches!(self, TriggerPhase::Triggered)
    }
}

/// Edge-triggered "N consecutive elevated windows" detector.
#[derive(Debug, Clone)]
pub struct HysteresisTrigger {
    threshold: f64,
    consecutive_required: u32,
    state: RiskState,
}

impl HysteresisTrigger {
    /// `consecutive_required` is clamped to at least one window.
    pub fn new(threshold: f64, consecutive_required: u32) -> Self {
        Self {
            threshold,
            consecutive_required: consecutive_required.max(1),
            state: RiskState::default(),
        }
    }

    /// Feed one window's score.
    pub fn observe(&mut self, score: f64) -> TriggerPhase {
        self.state.last_score = score;

        // NaN compares false, so a degenerate score never counts as elevated.
        if score >= self.threshold {
            self.state.above_threshold_streak += 1;
        } else {
            self.state.above_threshold_streak = 0;
            return TriggerPhase::Below;
        }

        if self.state.above_threshold_streak >= self.consecutive_required {
            self.state.above_threshold_streak = 0;
            TriggerPhase::Triggered
        } else {
            TriggerPhase::Accumulating
        }
    }

    pub fn state(&self) -> RiskState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn consecutive_required(&self) -> u32 {
        self.consecutive_required
    }

    /// Clear the streak without changing configuration.
    pub fn reset(&mut self) {
        self.state = RiskState::default();
    }
}

impl Default for HysteresisTrigger {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_THRESHOLD, DEFAULT_CONSECUTIVE_WINDOWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unweighted_score_is_sum() {
        let scorer = RiskScorer::default();
        let z = FeatureVector::from_fn(|key| if key == FeatureKey::PauseRatio { -1.0 } else { 0.5 });
        assert!((scorer.score(&z) - (7.0 * 0.5 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_weighted_score() {
        let weights = FeatureWeights::uniform(0.0).with(FeatureKey::BackspacesPerMin, 2.0);
        let scorer = RiskScorer::new(weights);
        let z = FeatureVector::from_fn(|_| 1.5);
        assert_eq!(scorer.score(&z), 3.0);
    }

    #[test]
    fn test_score_is_not_clamped() {
        let scorer = RiskScorer::default();
        let z = FeatureVector::from_fn(|_| 100.0);
        assert_eq!(scorer.score(&z), 800.0);
    }

    #[test]
    fn test_partial_weights_fill_defaults() {
        let weights: FeatureWeights = serde_json::from_str(r#"{"errorsPerMin": 2.5}"#).unwrap();
        assert_eq!(weights.get(FeatureKey::ErrorsPerMin), 2.5);
        assert_eq!(weights.get(FeatureKey::KeysPerMin), 1.0);
        assert_eq!(weights.get(FeatureKey::CodeChurnLocPerMin), 1.0);
    }

    #[test]
    fn test_streak_resets_on_low_window() {
        let mut trigger = HysteresisTrigger::new(3.0, 2);
        let phases: Vec<TriggerPhase> = [4.0, 1.0, 4.0, 4.0]
            .iter()
            .map(|&s| trigger.observe(s))
            .collect();

        assert_eq!(
            phases,
            vec![
                TriggerPhase::Accumulating,
                TriggerPhase::Below,
                TriggerPhase::Accumulating,
                TriggerPhase::Triggered,
            ]
        );
        assert_eq!(trigger.state().above_threshold_streak, 0);
        assert_eq!(trigger.state().last_score, 4.0);
    }

    #[test]
    fn test_plateau_fires_once_per_rebuilt_streak() {
        let mut trigger = HysteresisTrigger::new(3.0, 3);
        let fired: Vec<usize> = (1..=9)
            .filter(|_| trigger.observe(3.0).fired())
            .collect();
        assert_eq!(fired, vec![3, 6, 9]);
    }

    #[test]
    fn test_zero_required_is_clamped() {
        let mut trigger = HysteresisTrigger::new(3.0, 0);
        assert_eq!(trigger.consecutive_required(), 1);
        assert_eq!(trigger.observe(1.0), TriggerPhase::Below);
        assert_eq!(trigger.observe(3.5), TriggerPhase::Triggered);
    }

    #[test]
    fn test_nan_score_is_below() {
        let mut trigger = HysteresisTrigger::new(3.0, 1);
        assert_eq!(trigger.observe(f64::NAN), TriggerPhase::Below);
    }
}
