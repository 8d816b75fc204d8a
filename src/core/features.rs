//! Windowed feature extraction from editor activity.
//!
//! Raw counters accumulate between window boundaries and are converted into
//! per-minute rates on each snapshot. All features are computed from counts,
//! lengths and timing only - never content.

use crate::collector::types::EditDelta;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Average characters per line used to turn deleted characters into an
/// estimated number of deleted lines.
///
/// This is a heuristic, not a diff: deletions are reported as character
/// counts and converting them with a fixed line length keeps the churn
/// feature comparable with existing baselines.
pub const AVG_LINE_LENGTH: f64 = 40.0;

/// The closed set of features produced for every window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKey {
    KeysPerMin,
    BackspacesPerMin,
    PauseRatio,
    ErrorsPerMin,
    UndoRedoPerMin,
    CursorJumpsPerMin,
    FileSwitchesPerMin,
    CodeChurnLocPerMin,
}

impl FeatureKey {
    /// Every key, in the canonical (CSV column) order.
    pub const ALL: [FeatureKey; 8] = [
        FeatureKey::KeysPerMin,
        FeatureKey::BackspacesPerMin,
        FeatureKey::PauseRatio,
        FeatureKey::ErrorsPerMin,
        FeatureKey::UndoRedoPerMin,
        FeatureKey::CursorJumpsPerMin,
        FeatureKey::FileSwitchesPerMin,
        FeatureKey::CodeChurnLocPerMin,
    ];

    /// The external (camelCase) name of the key.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKey::KeysPerMin => "keysPerMin",
            FeatureKey::BackspacesPerMin => "backspacesPerMin",
            FeatureKey::PauseRatio => "pauseRatio",
            FeatureKey::ErrorsPerMin => "errorsPerMin",
            FeatureKey::UndoRedoPerMin => "undoRedoPerMin",
            FeatureKey::CursorJumpsPerMin => "cursorJumpsPerMin",
            FeatureKey::FileSwitchesPerMin => "fileSwitchesPerMin",
            FeatureKey::CodeChurnLocPerMin => "codeChurnLocPerMin",
        }
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One window's worth of features.
///
/// Raw vectors hold non-negative rates; normalized vectors (z-scores) share
/// the same shape but may be negative.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub keys_per_min: f64,
    pub backspaces_per_min: f64,
    pub pause_ratio: f64,
    pub errors_per_min: f64,
    pub undo_redo_per_min: f64,
    pub cursor_jumps_per_min: f64,
    pub file_switches_per_min: f64,
    pub code_churn_loc_per_min: f64,
}

impl FeatureVector {
    /// Build a vector by evaluating `f` for every key.
    pub fn from_fn(mut f: impl FnMut(FeatureKey) -> f64) -> Self {
        Self {
            keys_per_min: f(FeatureKey::KeysPerMin),
            backspaces_per_min: f(FeatureKey::BackspacesPerMin),
            pause_ratio: f(FeatureKey::PauseRatio),
            errors_per_min: f(FeatureKey::ErrorsPerMin),
            undo_redo_per_min: f(FeatureKey::UndoRedoPerMin),
            cursor_jumps_per_min: f(FeatureKey::CursorJumpsPerMin),
            file_switches_per_min: f(FeatureKey::FileSwitchesPerMin),
            code_churn_loc_per_min: f(FeatureKey::CodeChurnLocPerMin),
        }
    }

    /// Read a single feature.
    pub fn get(&self, key: FeatureKey) -> f64 {
        match key {
            FeatureKey::KeysPerMin => self.keys_per_min,
            FeatureKey::BackspacesPerMin => self.backspaces_per_min,
            FeatureKey::PauseRatio => self.pause_ratio,
            FeatureKey::ErrorsPerMin => self.errors_per_min,
            FeatureKey::UndoRedoPerMin => self.undo_redo_per_min,
            FeatureKey::CursorJumpsPerMin => self.cursor_jumps_per_min,
            FeatureKey::FileSwitchesPerMin => self.file_switches_per_min,
            FeatureKey::CodeChurnLocPerMin => self.code_churn_loc_per_min,
        }
    }

    /// Return a copy with one feature replaced.
    pub fn with(mut self, key: FeatureKey, value: f64) -> Self {
        let slot = match key {
            FeatureKey::KeysPerMin => &mut self.keys_per_min,
            FeatureKey::BackspacesPerMin => &mut self.backspaces_per_min,
            FeatureKey::PauseRatio => &mut self.pause_ratio,
            FeatureKey::ErrorsPerMin => &mut self.errors_per_min,
            FeatureKey::UndoRedoPerMin => &mut self.undo_redo_per_min,
            FeatureKey::CursorJumpsPerMin => &mut self.cursor_jumps_per_min,
            FeatureKey::FileSwitchesPerMin => &mut self.file_switches_per_min,
            FeatureKey::CodeChurnLocPerMin => &mut self.code_churn_loc_per_min,
        };
        *slot = value;
        self
    }

    /// Iterate `(key, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureKey, f64)> + '_ {
        FeatureKey::ALL.iter().map(move |&key| (key, self.get(key)))
    }
}

/// Accumulates raw counters for the current window.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    /// Nominal window length, used for the pause ratio
    window_duration: Duration,
    /// When the current window started (last snapshot)
    window_start: DateTime<Utc>,
    /// Most recent user interaction seen by the extractor
    last_activity_at: Option<DateTime<Utc>>,
    inserted_chars: u64,
    deleted_chars: u64,
    inserted_newlines: u64,
    backspaces: u64,
    cursor_jumps: u64,
    file_switches: u64,
    undo_redo: u64,
    /// Current diagnostics error level
    errors_now: u32,
}

impl FeatureExtractor {
    /// Create an extractor whose first window starts at `now`.
    pub fn new(now: DateTime<Utc>, window_duration: Duration) -> Self {
        Self {
            window_duration,
            window_start: now,
            last_activity_at: None,
            inserted_chars: 0,
            deleted_chars: 0,
            inserted_newlines: 0,
            backspaces: 0,
            cursor_jumps: 0,
            file_switches: 0,
            undo_redo: 0,
            errors_now: 0,
        }
    }

    /// Record a text change.
    pub fn record_edit(&mut self, delta: EditDelta) {
        self.inserted_chars += delta.inserted_len;
        self.deleted_chars += delta.deleted_len;
        self.inserted_newlines += delta.inserted_newlines;
        if delta.is_pure_deletion() {
            self.backspaces += 1;
        }
    }

    pub fn record_cursor_jump(&mut self) {
        self.cursor_jumps += 1;
    }

    pub fn record_file_switch(&mut self) {
        self.file_switches += 1;
    }

    pub fn record_undo_redo(&mut self) {
        self.undo_redo += 1;
    }

    /// Set the current error count. Diagnostics are a level signal, so this
    /// replaces rather than adds.
    pub fn record_errors_now(&mut self, count: u32) {
        self.errors_now = count;
    }

    /// Note that the user interacted at `now`.
    pub fn note_activity(&mut self, now: DateTime<Utc>) {
        if self.last_activity_at.map_or(true, |last| now > last) {
            self.last_activity_at = Some(now);
        }
    }

    /// Start of the window currently being filled.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    /// Convert the accumulated counters into a feature vector and start a new
    /// window at `now`.
    pub fn snapshot(&mut self, now: DateTime<Utc>) -> FeatureVector {
        let elapsed_secs = seconds_between(self.window_start, now);
        let per_minute = |raw: f64| raw * 60.0 / elapsed_secs.max(1.0);

        let idle_since = self.last_activity_at.unwrap_or(self.window_start);
        let idle_secs = seconds_between(idle_since, now);
        let window_secs = self.window_duration.num_milliseconds() as f64 / 1000.0;
        let pause_ratio = if window_secs > 0.0 {
            (idle_secs / window_secs).min(1.0)
        } else {
            1.0
        };

        let estimated_deleted_lines = self.deleted_chars as f64 / AVG_LINE_LENGTH;
        let churn = self.inserted_newlines as f64 + estimated_deleted_lines;

        let vector = FeatureVector {
            keys_per_min: per_minute(self.inserted_chars as f64),
            backspaces_per_min: per_minute(self.backspaces as f64),
            pause_ratio,
            errors_per_min: per_minute(self.errors_now as f64),
            undo_redo_per_min: per_minute(self.undo_redo as f64),
            cursor_jumps_per_min: per_minute(self.cursor_jumps as f64),
            file_switches_per_min: per_minute(self.file_switches as f64),
            code_churn_loc_per_min: per_minute(churn),
        };

        self.reset(now);
        vector
    }

    /// Zero every accumulator. The error level is carried over.
    fn reset(&mut self, now: DateTime<Utc>) {
        self.window_start = now;
        self.inserted_chars = 0;
        self.deleted_chars = 0;
        self.inserted_newlines = 0;
        self.backspaces = 0;
        self.cursor_jumps = 0;
        self.file_switches = 0;
        self.undo_redo = 0;
    }
}

/// Non-negative seconds from `from` to `to`.
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    ((to - from).num_milliseconds().max(0)) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(t0(), Duration::seconds(60))
    }

    #[test]
    fn test_rates_over_full_window() {
        let mut fx = extractor();
        fx.record_edit(EditDelta::new(120, 0, 4));
        fx.record_edit(EditDelta::new(0, 3, 0));
        fx.record_cursor_jump();
        fx.record_file_switch();
        fx.record_file_switch();
        fx.record_undo_redo();
        fx.note_activity(t0() + Duration::seconds(60));

        let v = fx.snapshot(t0() + Duration::seconds(60));
        assert_eq!(v.keys_per_min, 120.0);
        assert_eq!(v.backspaces_per_min, 1.0);
        assert_eq!(v.cursor_jumps_per_min, 1.0);
        assert_eq!(v.file_switches_per_min, 2.0);
        assert_eq!(v.undo_redo_per_min, 1.0);
        assert_eq!(v.pause_ratio, 0.0);
        assert!((v.code_churn_loc_per_min - (4.0 + 3.0 / AVG_LINE_LENGTH)).abs() < 1e-9);
    }

    #[test]
    fn test_short_window_is_scaled_by_elapsed_time() {
        let mut fx = extractor();
        fx.record_edit(EditDelta::new(30, 0, 0));
        fx.note_activity(t0() + Duration::seconds(30));

        let v = fx.snapshot(t0() + Duration::seconds(30));
        assert_eq!(v.keys_per_min, 60.0);
    }

    #[test]
    fn test_elapsed_floor_of_one_second() {
        let mut fx = extractor();
        fx.record_edit(EditDelta::new(2, 0, 0));
        let v = fx.snapshot(t0() + Duration::milliseconds(200));
        assert_eq!(v.keys_per_min, 120.0);
    }

    #[test]
    fn test_snapshot_resets_counters() {
        let mut fx = extractor();
        fx.record_edit(EditDelta::new(50, 10, 2));
        fx.record_cursor_jump();
        fx.snapshot(t0() + Duration::seconds(60));

        let v = fx.snapshot(t0() + Duration::seconds(120));
        assert_eq!(v.keys_per_min, 0.0);
        assert_eq!(v.cursor_jumps_per_min, 0.0);
        assert_eq!(v.code_churn_loc_per_min, 0.0);
        assert_eq!(fx.window_start(), t0() + Duration::seconds(120));
    }

    #[test]
    fn test_error_level_is_not_accumulated() {
        let mut fx = extractor();
        fx.record_errors_now(5);
        fx.record_errors_now(2);
        let first = fx.snapshot(t0() + Duration::seconds(60));
        assert_eq!(first.errors_per_min, 2.0);

        // The level persists into the next window until diagnostics change.
        let second = fx.snapshot(t0() + Duration::seconds(120));
        assert_eq!(second.errors_per_min, 2.0);
    }

    #[test]
    fn test_pause_ratio() {
        let mut fx = extractor();
        fx.note_activity(t0() + Duration::seconds(30));
        let v = fx.snapshot(t0() + Duration::seconds(60));
        assert!((v.pause_ratio - 0.5).abs() < 1e-9);

        // No activity in the next window at all: capped at 1.
        let v = fx.snapshot(t0() + Duration::seconds(150));
        assert_eq!(v.pause_ratio, 1.0);
    }

    #[test]
    fn test_pause_ratio_without_any_activity() {
        let mut fx = extractor();
        let v = fx.snapshot(t0() + Duration::seconds(15));
        assert!((v.pause_ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_vector_accessors() {
        let v = FeatureVector::from_fn(|key| key as usize as f64);
        for (i, (key, value)) in v.iter().enumerate() {
            assert_eq!(key, FeatureKey::ALL[i]);
            assert_eq!(value, i as f64);
        }
        let v = v.with(FeatureKey::PauseRatio, 0.75);
        assert_eq!(v.get(FeatureKey::PauseRatio), 0.75);
    }

    #[test]
    fn test_vector_serializes_with_external_names() {
        let json = serde_json::to_value(FeatureVector::default()).unwrap();
        for key in FeatureKey::ALL {
            assert!(json.get(key.as_str()).is_some(), "missing {key}");
        }
    }
}
