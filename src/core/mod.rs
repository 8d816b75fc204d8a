//! Core functionality for the editor agent.
//!
//! This module contains:
//! - Active/idle time accounting
//! - Windowed feature extraction
//! - Baseline calibration and normalization
//! - Risk scoring with a hysteresis trigger
//! - Interval gates that drive the window and idle cadences

pub mod activity;
pub mod baseline;
pub mod features;
pub mod risk;
pub mod windowing;

// Re-export commonly used types
pub use activity::{ActivityOutcome, TimeAccountant, DEFAULT_IDLE_MS};
pub use baseline::{BaselineCalibrator, BaselineStats, DEFAULT_BASELINE_WINDOWS, STD_EPSILON};
pub use features::{FeatureExtractor, FeatureKey, FeatureVector, AVG_LINE_LENGTH};
pub use risk::{
    FeatureWeights, HysteresisTrigger, RiskScorer, RiskState, TriggerPhase,
    DEFAULT_CONSECUTIVE_WINDOWS, DEFAULT_SCORE_THRESHOLD,
};
pub use windowing::{IntervalGate, MAX_CATCH_UP_TICKS};
