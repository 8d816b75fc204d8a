//! The monitor loop state.
//!
//! [`Monitor`] owns every stateful component and applies editor events to them
//! one at a time, in delivery order:
//!
//! ```text
//!  EditorEvent ──▶ TimeAccountant ──▶ DayStats (active/idle, per file)
//!       │
//!       └────────▶ FeatureExtractor ──(window tick)──▶ BaselineCalibrator (warm-up)
//!                                                  └─▶ RiskScorer + HysteresisTrigger
//!                                                          │
//!                                   WindowReport ◀─────────┘──▶ sinks, score history
//! ```
//!
//! Timers are [`IntervalGate`]s advanced by the time of each event (or by the
//! wall clock while the stream is quiet), so nothing runs concurrently with
//! event handling.

use crate::collector::types::{EditorEvent, EditorEventKind, FileKey};
use crate::config::Config;
use crate::core::{
    BaselineCalibrator, FeatureExtractor, FeatureVector, HysteresisTrigger, IntervalGate,
    RiskScorer, TimeAccountant,
};
use crate::sink::WindowSink;
use crate::store::{DayExport, DayRepository, ScoreSample, SessionStore, StoreError};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A selection that moves further than this many lines counts as a jump.
pub const CURSOR_JUMP_LINES: u32 = 5;

/// Errors surfaced by the monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Baseline file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid baseline: {0}")]
    Baseline(#[from] serde_json::Error),
}

/// A handle to something that must be released when the monitor stops.
pub trait Subscription: Send {
    fn name(&self) -> &str;

    /// Release the resource. Called exactly once.
    fn dispose(&mut self);
}

/// Subscriptions owned by the monitor.
#[derive(Default)]
pub struct SubscriptionList {
    items: Vec<Box<dyn Subscription>>,
}

impl SubscriptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, subscription: Box<dyn Subscription>) {
        self.items.push(subscription);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Dispose every subscription, newest first. Returns how many were
    /// disposed; a second call disposes nothing.
    pub fn dispose_all(&mut self) -> usize {
        let count = self.items.len();
        while let Some(mut subscription) = self.items.pop() {
            debug!(name = subscription.name(), "Disposing subscription");
            subscription.dispose();
        }
        count
    }
}

impl Drop for SubscriptionList {
    fn drop(&mut self) {
        self.dispose_all();
    }
}

/// Whether a window fed the baseline or was scored against it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WindowPhase {
    Calibrating { collected: u64, required: usize },
    Scored { score: f64, triggered: bool },
}

/// Emitted once per window tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowReport {
    pub at: DateTime<Utc>,
    pub day: String,
    pub features: FeatureVector,
    pub phase: WindowPhase,
    pub self_report: Option<i32>,
}

impl WindowReport {
    pub fn score(&self) -> Option<f64> {
        match self.phase {
            WindowPhase::Scored { score, .. } => Some(score),
            WindowPhase::Calibrating { .. } => None,
        }
    }

    pub fn triggered(&self) -> bool {
        matches!(self.phase, WindowPhase::Scored { triggered: true, .. })
    }
}

pub struct Monitor {
    config: Config,
    store: SessionStore,
    current_day: String,
    accountant: TimeAccountant,
    extractor: FeatureExtractor,
    calibrator: BaselineCalibrator,
    scorer: RiskScorer,
    trigger: HysteresisTrigger,
    sinks: Vec<Box<dyn WindowSink>>,
    subscriptions: SubscriptionList,
    idle_gate: IntervalGate,
    window_gate: IntervalGate,
    /// Last selection line per file, for cursor jump detection
    last_line: HashMap<FileKey, u32>,
    pending_self_report: Option<i32>,
    transparency: SharedTransparencyLog,
    baseline_path: Option<PathBuf>,
    stopped: bool,
}

impl Monitor {
    /// Create a monitor whose first window and idle cadence start at `now`.
    pub fn new(config: Config, repository: Box<dyn DayRepository>, now: DateTime<Utc>) -> Self {
        let mut store = SessionStore::new(repository, config.tz());
        let current_day = store.day_key(now);
        store.get_or_create(&current_day, now);

        let mut idle_gate = IntervalGate::unbounded(config.idle_check_interval());
        let mut window_gate = IntervalGate::new(config.window_chrono());
        idle_gate.start(now);
        window_gate.start(now);

        Self {
            extractor: FeatureExtractor::new(now, config.window_chrono()),
            scorer: RiskScorer::new(config.weights),
            trigger: HysteresisTrigger::new(config.score_threshold, config.consecutive_windows),
            config,
            store,
            current_day,
            accountant: TimeAccountant::new(),
            calibrator: BaselineCalibrator::new(),
            sinks: Vec::new(),
            subscriptions: SubscriptionList::new(),
            idle_gate,
            window_gate,
            last_line: HashMap::new(),
            pending_self_report: None,
            transparency: create_shared_log(),
            baseline_path: None,
            stopped: false,
        }
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    /// Resume the baseline stored at `path` (if any) and save it there on
    /// stop. An unreadable file means starting calibration over.
    pub fn with_baseline_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match load_baseline(&path) {
            Ok(Some(calibrator)) => {
                info!(windows = calibrator.count(), "Resumed baseline");
                self.calibrator = calibrator;
            }
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), "Could not load baseline, recalibrating: {e}"),
        }
        self.baseline_path = Some(path);
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn WindowSink>) {
        self.sinks.push(sink);
    }

    pub fn add_subscription(&mut self, subscription: Box<dyn Subscription>) {
        self.subscriptions.push(subscription);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn calibrator(&self) -> &BaselineCalibrator {
        &self.calibrator
    }

    /// Replace the baseline, e.g. with one restored from disk.
    pub fn load_calibrator(&mut self, calibrator: BaselineCalibrator) {
        self.calibrator = calibrator;
    }

    pub fn trigger(&self) -> &HysteresisTrigger {
        &self.trigger
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }

    /// Whether the next window still feeds the baseline.
    pub fn is_calibrating(&self) -> bool {
        self.calibrator.is_calibrating(self.config.baseline_windows)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Key of the day the monitor is currently writing to.
    pub fn current_day(&self) -> &str {
        &self.current_day
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Export of the current day.
    pub fn export_today(&mut self, now: DateTime<Utc>) -> DayExport {
        let key = self.ensure_day(now);
        self.store.get_or_create(&key, now).export()
    }

    /// Apply one editor event. Timers that fell due before the event fire
    /// first; their reports are returned.
    pub fn handle_event(&mut self, event: &EditorEvent) -> Vec<WindowReport> {
        if self.stopped {
            return Vec::new();
        }

        let now = event.at;
        let reports = self.advance_to(now);
        self.transparency.record_event(event);

        let file = event.file();
        let switched = matches!(event.kind, EditorEventKind::FileSwitch { .. })
            && file != self.accountant.current_file();
        if switched {
            self.extractor.record_file_switch();
            self.accountant.set_current_file(file.map(str::to_string));
        }

        let key = self.ensure_day(now);
        let day = self.store.get_or_create(&key, now);

        if event.is_interaction() {
            let outcome = self.accountant.mark_activity(day, now, file);
            self.extractor.note_activity(now);
            if let Some(idle_ms) = outcome.resumed_after_ms {
                info!(idle_ms, "Activity resumed");
            }
        }

        match &event.kind {
            EditorEventKind::Edit { .. } => {
                if let Some(delta) = event.edit_delta().filter(|d| !d.is_empty()) {
                    self.extractor.record_edit(delta);
                    let file = file.or(self.accountant.current_file());
                    day.record_keystroke(now, file, self.config.idle_ms);
                }
            }
            EditorEventKind::Selection { line, .. } => {
                if let Some(key) = file.or(self.accountant.current_file()) {
                    let previous = self.last_line.insert(key.to_string(), *line);
                    if previous.map_or(false, |p| p.abs_diff(*line) > CURSOR_JUMP_LINES) {
                        self.extractor.record_cursor_jump();
                    }
                }
            }
            EditorEventKind::Diagnostics { errors } => self.extractor.record_errors_now(*errors),
            EditorEventKind::UndoRedo { .. } => self.extractor.record_undo_redo(),
            EditorEventKind::SelfReport { value } => self.pending_self_report = Some(*value),
            EditorEventKind::FileSwitch { .. }
            | EditorEventKind::Focus { .. }
            | EditorEventKind::Save { .. } => {}
        }

        reports
    }

    /// Run every idle check and window tick due at or before `now`, in time
    /// order. Idle checks go first on ties.
    pub fn advance_to(&mut self, now: DateTime<Utc>) -> Vec<WindowReport> {
        if self.stopped {
            return Vec::new();
        }

        let idle_ticks = self.idle_gate.due(now);
        let window_ticks = self.window_gate.due(now);

        let mut reports = Vec::with_capacity(window_ticks.len());
        let mut idle = idle_ticks.into_iter().peekable();
        for tick in window_ticks {
            while let Some(check) = idle.next_if(|check| *check <= tick) {
                self.check_idle(check);
            }
            reports.push(self.tick_window(tick));
        }
        for check in idle {
            self.check_idle(check);
        }
        reports
    }

    /// Idle check at `now`. Returns `true` if the user just went idle.
    pub fn check_idle(&mut self, now: DateTime<Utc>) -> bool {
        let key = self.ensure_day(now);
        let day = self.store.get_or_create(&key, now);
        let went_idle = self.accountant.check_idle(day, now, self.config.idle_ms);
        if went_idle {
            info!(at = %now, "User idle");
        }
        went_idle
    }

    /// Close the current window at `now`: calibrate or score it, record the
    /// result and hand the report to every sink.
    pub fn tick_window(&mut self, now: DateTime<Utc>) -> WindowReport {
        let features = self.extractor.snapshot(now);
        let required = self.config.baseline_windows;
        let key = self.ensure_day(now);

        let phase = if self.calibrator.is_calibrating(required) {
            self.calibrator.add(&features);
            let collected = self.calibrator.count();
            debug!(collected, required, "Baseline window absorbed");
            if !self.calibrator.is_calibrating(required) {
                info!(windows = collected, "Baseline calibrated");
            }
            WindowPhase::Calibrating {
                collected,
                required,
            }
        } else {
            let normalized = self.calibrator.normalize(&features);
            let score = self.scorer.score(&normalized);
            let triggered = self.trigger.observe(score).fired();
            if triggered {
                warn!(score, "Sustained elevated risk");
                self.transparency.record_trigger_fired();
            }
            self.store.append(
                &key,
                ScoreSample {
                    at: now,
                    score,
                    triggered,
                },
                now,
            );
            WindowPhase::Scored { score, triggered }
        };

        let report = WindowReport {
            at: now,
            day: key,
            features,
            phase,
            self_report: self.pending_self_report.take(),
        };

        for sink in &mut self.sinks {
            match sink.record(&report) {
                Ok(rows) => self.transparency.record_rows_logged(rows as u64),
                Err(e) => warn!(sink = sink.name(), "Could not record window: {e}"),
            }
        }
        self.transparency.record_window_completed();

        if let Err(e) = self.store.flush() {
            warn!("Could not persist day statistics: {e}");
        }

        report
    }

    /// Stop timers, dispose subscriptions, flush sinks and persist state.
    /// Only the first call does anything.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        self.idle_gate.reset();
        self.window_gate.reset();
        let disposed = self.subscriptions.dispose_all();

        for sink in &mut self.sinks {
            match sink.flush() {
                Ok(rows) => self.transparency.record_rows_logged(rows as u64),
                Err(e) => warn!(sink = sink.name(), "Could not flush buffered rows: {e}"),
            }
        }

        // Every store is attempted; the first failure is reported.
        let stored = self.store.flush().map_err(MonitorError::from);
        let baseline = match &self.baseline_path {
            Some(path) => save_baseline(path, &self.calibrator),
            None => Ok(()),
        };
        if let Err(e) = &baseline {
            warn!("Could not save baseline: {e}");
        }
        if let Err(e) = self.transparency.save() {
            warn!("Could not save transparency stats: {e}");
        }

        info!(subscriptions = disposed, "Monitor stopped");
        stored.and(baseline)
    }

    /// Key for `now`, rolling state over to a new day when it changed.
    fn ensure_day(&mut self, now: DateTime<Utc>) -> String {
        let key = self.store.day_key(now);
        if key > self.current_day {
            let accountant = &mut self.accountant;
            self.store.roll_over(&self.current_day, &key, now, |old, new| {
                accountant.roll_over(old, new, now);
            });
            info!(from = %self.current_day, to = %key, "Day rolled over");
            self.current_day = key.clone();
        }
        // Late events for an earlier day still land on the current record.
        self.current_day.clone()
    }
}

/// Read a persisted baseline. A missing file is not an error.
pub fn load_baseline(path: &Path) -> Result<Option<BaselineCalibrator>, MonitorError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(BaselineCalibrator::from_json(&content)?))
}

/// Write a baseline so it survives restarts.
pub fn save_baseline(path: &Path, calibrator: &BaselineCalibrator) -> Result<(), MonitorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, calibrator.to_json()?)?;
    Ok(())
}
