//! Day-scoped aggregate record.
//!
//! One [`DayStats`] exists per calendar day. It is the unit of persistence
//! and export; every other component reads from and writes to it.

use crate::collector::types::FileKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Weight of the previous average in the inter-key moving average.
const INTER_KEY_SMOOTHING: f64 = 0.8;

/// Per-file counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStats {
    pub keystrokes: u64,
    pub active_ms: u64,
}

/// Kind of entry in the idle event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleEventKind {
    Idle,
    Resume,
}

/// An idle transition. An `idle` entry without a duration is the currently
/// open idle span; `resume` entries carry the duration of the span they closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdleEvent {
    #[serde(rename = "type")]
    pub kind: IdleEventKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

impl IdleEvent {
    pub fn idle(at: DateTime<Utc>) -> Self {
        Self {
            kind: IdleEventKind::Idle,
            at,
            duration_ms: None,
        }
    }

    pub fn resume(at: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            kind: IdleEventKind::Resume,
            at,
            duration_ms: Some(duration_ms),
        }
    }

    /// An idle span that has not been closed yet.
    pub fn is_open(&self) -> bool {
        self.kind == IdleEventKind::Idle && self.duration_ms.is_none()
    }
}

/// Score history entry for one scored window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSample {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub score: f64,
    pub triggered: bool,
}

/// Summary of a day's score history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub windows: usize,
    pub mean: f64,
    /// Sample standard deviation; zero with fewer than two windows
    pub std_dev: f64,
    pub max: f64,
    pub triggers: usize,
}

/// Aggregate statistics for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    /// ISO date (`YYYY-MM-DD`) in the configured time zone
    pub day: String,
    pub keystrokes: u64,
    pub active_ms: u64,
    pub idle_ms: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    pub currently_idle: bool,
    #[serde(default)]
    pub inter_key_avg_ms: Option<f64>,
    #[serde(default)]
    pub idle_events: Vec<IdleEvent>,
    #[serde(default)]
    pub per_file: BTreeMap<FileKey, FileStats>,
    #[serde(default)]
    pub scores: Vec<ScoreSample>,
    /// Time of the previous keystroke, for the inter-key average
    #[serde(skip)]
    last_key_at: Option<DateTime<Utc>>,
}

impl DayStats {
    /// Zeroed statistics for `day`, started at `now`.
    pub fn new(day: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            day: day.into(),
            keystrokes: 0,
            active_ms: 0,
            idle_ms: 0,
            started_at: now,
            last_activity_at: None,
            currently_idle: false,
            inter_key_avg_ms: None,
            idle_events: Vec::new(),
            per_file: BTreeMap::new(),
            scores: Vec::new(),
            last_key_at: None,
        }
    }

    /// Credit active time and keystrokes to a file, creating its entry on
    /// first reference.
    pub fn attribute_file(&mut self, key: &str, delta_active_ms: u64, delta_keystrokes: u64) {
        let stats = self.per_file.entry(key.to_string()).or_default();
        stats.active_ms += delta_active_ms;
        stats.keystrokes += delta_keystrokes;
    }

    /// Count one keystroke and fold the gap since the previous one into the
    /// inter-key moving average. Gaps longer than `max_gap_ms` are pauses and
    /// do not move the average.
    pub fn record_keystroke(&mut self, now: DateTime<Utc>, file: Option<&str>, max_gap_ms: u64) {
        self.keystrokes += 1;
        if let Some(file) = file {
            self.attribute_file(file, 0, 1);
        }

        if let Some(previous) = self.last_key_at {
            let gap_ms = (now - previous).num_milliseconds();
            if gap_ms >= 0 && gap_ms as u64 <= max_gap_ms {
                let gap = gap_ms as f64;
                self.inter_key_avg_ms = Some(match self.inter_key_avg_ms {
                    Some(avg) => avg * INTER_KEY_SMOOTHING + gap * (1.0 - INTER_KEY_SMOOTHING),
                    None => gap,
                });
            }
        }
        self.last_key_at = Some(now);
    }

    /// The open idle span, if the day is currently idle.
    pub fn open_idle_span(&self) -> Option<&IdleEvent> {
        self.idle_events.iter().rev().find(|e| e.is_open())
    }

    /// Close the open idle span at `now`, crediting its duration to idle
    /// time. Returns the closed duration.
    pub fn close_idle_span(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let span = self.idle_events.iter_mut().rev().find(|e| e.is_open())?;
        let duration_ms = (now - span.at).num_milliseconds().max(0) as u64;
        span.duration_ms = Some(duration_ms);
        self.idle_ms += duration_ms;
        self.currently_idle = false;
        Some(duration_ms)
    }

    /// Open a new idle span at `now`.
    pub fn open_idle_span_at(&mut self, now: DateTime<Utc>) {
        self.currently_idle = true;
        self.idle_events.push(IdleEvent::idle(now));
    }

    /// Append a scored window to the history.
    pub fn append_score(&mut self, sample: ScoreSample) {
        self.scores.push(sample);
    }

    /// Time attributed to either state.
    pub fn accounted_ms(&self) -> u64 {
        self.active_ms + self.idle_ms
    }

    /// Total active time attributed to files.
    pub fn file_active_ms(&self) -> u64 {
        self.per_file.values().map(|f| f.active_ms).sum()
    }

    /// Summary statistics over the score history.
    pub fn score_summary(&self) -> Option<ScoreSummary> {
        if self.scores.is_empty() {
            return None;
        }

        let values: Vec<f64> = self.scores.iter().map(|s| s.score).collect();
        let std_dev = if values.len() > 1 {
            values.iter().std_dev()
        } else {
            0.0
        };

        Some(ScoreSummary {
            windows: values.len(),
            mean: values.iter().mean(),
            std_dev,
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            triggers: self.scores.iter().filter(|s| s.triggered).count(),
        })
    }

    /// The exported view of this day.
    pub fn export(&self) -> DayExport {
        DayExport::from(self)
    }
}

/// External JSON shape of a day. Score history is internal and not exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayExport {
    pub day: String,
    pub keystrokes: u64,
    pub active_ms: u64,
    pub idle_ms: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option", default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    pub currently_idle: bool,
    #[serde(default)]
    pub inter_key_avg_ms: Option<f64>,
    #[serde(default)]
    pub idle_events: Vec<IdleEvent>,
    #[serde(default)]
    pub per_file: BTreeMap<FileKey, FileStats>,
}

impl DayExport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<&DayStats> for DayExport {
    fn from(stats: &DayStats) -> Self {
        Self {
            day: stats.day.clone(),
            keystrokes: stats.keystrokes,
            active_ms: stats.active_ms,
            idle_ms: stats.idle_ms,
            started_at: stats.started_at,
            last_activity_at: stats.last_activity_at,
            currently_idle: stats.currently_idle,
            inter_key_avg_ms: stats.inter_key_avg_ms,
            idle_events: stats.idle_events.clone(),
            per_file: stats.per_file.clone(),
        }
    }
}

impl From<DayExport> for DayStats {
    fn from(export: DayExport) -> Self {
        Self {
            day: export.day,
            keystrokes: export.keystrokes,
            active_ms: export.active_ms,
            idle_ms: export.idle_ms,
            started_at: export.started_at,
            last_activity_at: export.last_activity_at,
            currently_idle: export.currently_idle,
            inter_key_avg_ms: export.inter_key_avg_ms,
            idle_events: export.idle_events,
            per_file: export.per_file,
            scores: Vec::new(),
            last_key_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn sample_day() -> DayStats {
        let mut day = DayStats::new("2024-01-15", t0());
        day.keystrokes = 42;
        day.active_ms = 120_000;
        day.idle_ms = 5_000;
        day.last_activity_at = Some(t0() + Duration::seconds(130));
        day.inter_key_avg_ms = Some(180.5);
        day.idle_events.push(IdleEvent {
            kind: IdleEventKind::Idle,
            at: t0() + Duration::seconds(65),
            duration_ms: Some(5_000),
        });
        day.idle_events.push(IdleEvent::resume(t0() + Duration::seconds(70), 5_000));
        day.attribute_file("src/main.rs", 90_000, 30);
        day.attribute_file("README.md", 30_000, 12);
        day
    }

    #[test]
    fn test_export_shape() {
        let json: serde_json::Value = serde_json::to_value(sample_day().export()).unwrap();

        assert_eq!(json["day"], "2024-01-15");
        assert_eq!(json["activeMs"], 120_000);
        assert_eq!(json["startedAt"], t0().timestamp_millis());
        assert_eq!(json["idleEvents"][0]["type"], "idle");
        assert_eq!(json["idleEvents"][1]["type"], "resume");
        assert_eq!(json["perFile"]["src/main.rs"]["keystrokes"], 30);
        assert!(json.get("scores").is_none());
    }

    #[test]
    fn test_export_round_trip() {
        let export = sample_day().export();
        let json = export.to_json().unwrap();
        let imported = DayExport::from_json(&json).unwrap();
        assert_eq!(imported, export);

        let rebuilt: DayStats = imported.into();
        assert_eq!(rebuilt.export(), export);
    }

    #[test]
    fn test_open_idle_span_serializes_null_duration() {
        let mut day = DayStats::new("2024-01-15", t0());
        day.open_idle_span_at(t0() + Duration::seconds(65));
        let json = serde_json::to_value(day.export()).unwrap();
        assert!(json["idleEvents"][0]["durationMs"].is_null());
        assert!(day.open_idle_span().is_some());
    }

    #[test]
    fn test_close_idle_span() {
        let mut day = DayStats::new("2024-01-15", t0());
        day.open_idle_span_at(t0() + Duration::seconds(65));
        assert_eq!(day.close_idle_span(t0() + Duration::seconds(70)), Some(5_000));
        assert_eq!(day.idle_ms, 5_000);
        assert!(!day.currently_idle);
        assert!(day.open_idle_span().is_none());
        assert_eq!(day.close_idle_span(t0() + Duration::seconds(80)), None);
    }

    #[test]
    fn test_inter_key_moving_average() {
        let mut day = DayStats::new("2024-01-15", t0());
        day.record_keystroke(t0(), Some("a.rs"), 5_000);
        assert_eq!(day.inter_key_avg_ms, None);

        day.record_keystroke(t0() + Duration::milliseconds(200), Some("a.rs"), 5_000);
        assert_eq!(day.inter_key_avg_ms, Some(200.0));

        day.record_keystroke(t0() + Duration::milliseconds(300), None, 5_000);
        assert!((day.inter_key_avg_ms.unwrap() - (200.0 * 0.8 + 100.0 * 0.2)).abs() < 1e-9);

        // A long pause leaves the average alone.
        day.record_keystroke(t0() + Duration::seconds(60), None, 5_000);
        assert!((day.inter_key_avg_ms.unwrap() - 180.0).abs() < 1e-9);

        assert_eq!(day.keystrokes, 4);
        assert_eq!(day.per_file["a.rs"].keystrokes, 2);
    }

    #[test]
    fn test_score_summary() {
        let mut day = DayStats::new("2024-01-15", t0());
        assert!(day.score_summary().is_none());

        for (i, score) in [1.0, 3.0, 5.0].iter().enumerate() {
            day.append_score(ScoreSample {
                at: t0() + Duration::minutes(i as i64),
                score: *score,
                triggered: i == 2,
            });
        }

        let summary = day.score_summary().unwrap();
        assert_eq!(summary.windows, 3);
        assert!((summary.mean - 3.0).abs() < 1e-12);
        assert!((summary.std_dev - 2.0).abs() < 1e-12);
        assert_eq!(summary.max, 5.0);
        assert_eq!(summary.triggers, 1);
    }

    #[test]
    fn test_persisted_form_keeps_scores() {
        let mut day = sample_day();
        day.append_score(ScoreSample {
            at: t0(),
            score: 1.25,
            triggered: false,
        });
        let json = serde_json::to_string(&day).unwrap();
        let loaded: DayStats = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.scores, day.scores);
        assert_eq!(loaded.export(), day.export());
    }
}
