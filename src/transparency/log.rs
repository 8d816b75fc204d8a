//! Privacy-preserving transparency log.
//!
//! Counts what the agent processed, per event kind, without storing any
//! document content, file contents or keystroke identities.

use crate::collector::types::{EditorEvent, EditorEventKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Edit events (insertions and deletions)
    edits: AtomicU64,
    /// Selection / cursor moves
    selections: AtomicU64,
    /// Active file changes
    file_switches: AtomicU64,
    /// Diagnostics updates
    diagnostics: AtomicU64,
    /// Undo and redo operations
    undo_redo: AtomicU64,
    /// Focus, save and self-report events
    other_events: AtomicU64,
    /// Number of windows completed
    windows_completed: AtomicU64,
    /// Number of times the trigger fired
    triggers_fired: AtomicU64,
    /// Number of CSV rows written
    rows_logged: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            edits: AtomicU64::new(0),
            selections: AtomicU64::new(0),
            file_switches: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
            undo_redo: AtomicU64::new(0),
            other_events: AtomicU64::new(0),
            windows_completed: AtomicU64::new(0),
            triggers_fired: AtomicU64::new(0),
            rows_logged: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        // Try to load existing stats
        if let Err(e) = log.load() {
            warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    /// Count one processed event under its kind.
    pub fn record_event(&self, event: &EditorEvent) {
        let counter = match event.kind {
            EditorEventKind::Edit { .. } => &self.edits,
            EditorEventKind::Selection { .. } => &self.selections,
            EditorEventKind::FileSwitch { .. } => &self.file_switches,
            EditorEventKind::Diagnostics { .. } => &self.diagnostics,
            EditorEventKind::UndoRedo { .. } => &self.undo_redo,
            EditorEventKind::Focus { .. }
            | EditorEventKind::Save { .. }
            | EditorEventKind::SelfReport { .. } => &self.other_events,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed window.
    pub fn record_window_completed(&self) {
        self.windows_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trigger_fired(&self) {
        self.triggers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rows_logged(&self, count: u64) {
        self.rows_logged.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            edits: self.edits.load(Ordering::Relaxed),
            selections: self.selections.load(Ordering::Relaxed),
            file_switches: self.file_switches.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
            undo_redo: self.undo_redo.load(Ordering::Relaxed),
            other_events: self.other_events.load(Ordering::Relaxed),
            windows_completed: self.windows_completed.load(Ordering::Relaxed),
            triggers_fired: self.triggers_fired.load(Ordering::Relaxed),
            rows_logged: self.rows_logged.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Edit events processed: {}\n\
             - Selection events processed: {}\n\
             - File switches processed: {}\n\
             - Diagnostics updates processed: {}\n\
             - Undo/redo events processed: {}\n\
             - Other events processed: {}\n\
             - Windows completed: {}\n\
             - Triggers fired: {}\n\
             - Log rows written: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No document content captured\n\
             - No keystroke identities captured\n\
             - Only counts, lengths and timing retained",
            stats.edits,
            stats.selections,
            stats.file_switches,
            stats.diagnostics,
            stats.undo_redo,
            stats.other_events,
            stats.windows_completed,
            stats.triggers_fired,
            stats.rows_logged,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                edits: stats.edits,
                selections: stats.selections,
                file_switches: stats.file_switches,
                diagnostics: stats.diagnostics,
                undo_redo: stats.undo_redo,
                other_events: stats.other_events,
                windows_completed: stats.windows_completed,
                triggers_fired: stats.triggers_fired,
                rows_logged: stats.rows_logged,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
            debug!(path = %path.display(), "Saved transparency stats");
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.edits.store(persisted.edits, Ordering::Relaxed);
                self.selections
                    .store(persisted.selections, Ordering::Relaxed);
                self.file_switches
                    .store(persisted.file_switches, Ordering::Relaxed);
                self.diagnostics
                    .store(persisted.diagnostics, Ordering::Relaxed);
                self.undo_redo.store(persisted.undo_redo, Ordering::Relaxed);
                self.other_events
                    .store(persisted.other_events, Ordering::Relaxed);
                self.windows_completed
                    .store(persisted.windows_completed, Ordering::Relaxed);
                self.triggers_fired
                    .store(persisted.triggers_fired, Ordering::Relaxed);
                self.rows_logged
                    .store(persisted.rows_logged, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.edits,
            &self.selections,
            &self.file_switches,
            &self.diagnostics,
            &self.undo_redo,
            &self.other_events,
            &self.windows_completed,
            &self.triggers_fired,
            &self.rows_logged,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub edits: u64,
    pub selections: u64,
    pub file_switches: u64,
    pub diagnostics: u64,
    pub undo_redo: u64,
    pub other_events: u64,
    pub windows_completed: u64,
    pub triggers_fired: u64,
    pub rows_logged: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

impl TransparencyStats {
    /// Every processed editor event, across kinds.
    pub fn total_events(&self) -> u64 {
        self.edits
            + self.selections
            + self.file_switches
            + self.diagnostics
            + self.undo_redo
            + self.other_events
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    edits: u64,
    #[serde(default)]
    selections: u64,
    #[serde(default)]
    file_switches: u64,
    #[serde(default)]
    diagnostics: u64,
    #[serde(default)]
    undo_redo: u64,
    #[serde(default)]
    other_events: u64,
    #[serde(default)]
    windows_completed: u64,
    #[serde(default)]
    triggers_fired: u64,
    #[serde(default)]
    rows_logged: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EditorEventKind) -> EditorEvent {
        EditorEvent::new(Utc::now(), kind)
    }

    #[test]
    fn test_counts_by_kind() {
        let log = TransparencyLog::new();

        log.record_event(&event(EditorEventKind::Edit {
            file: None,
            inserted_len: 1,
            deleted_len: 0,
            inserted_newlines: 0,
        }));
        log.record_event(&event(EditorEventKind::Edit {
            file: Some("a.rs".into()),
            inserted_len: 0,
            deleted_len: 1,
            inserted_newlines: 0,
        }));
        log.record_event(&event(EditorEventKind::Diagnostics { errors: 3 }));
        log.record_event(&event(EditorEventKind::SelfReport { value: 4 }));
        log.record_window_completed();
        log.record_trigger_fired();
        log.record_rows_logged(2);

        let stats = log.stats();
        assert_eq!(stats.edits, 2);
        assert_eq!(stats.diagnostics, 1);
        assert_eq!(stats.other_events, 1);
        assert_eq!(stats.total_events(), 4);
        assert_eq!(stats.windows_completed, 1);
        assert_eq!(stats.triggers_fired, 1);
        assert_eq!(stats.rows_logged, 2);
    }

    #[test]
    fn test_reset() {
        let log = TransparencyLog::new();
        log.record_event(&event(EditorEventKind::UndoRedo { file: None }));
        log.record_rows_logged(10);
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.total_events(), 0);
        assert_eq!(stats.rows_logged, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("editor-transparency-{}", uuid::Uuid::new_v4()))
            .join("stats.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_event(&event(EditorEventKind::Selection { file: None, line: 4 }));
        log.record_window_completed();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path.clone());
        assert_eq!(reloaded.stats().selections, 1);
        assert_eq!(reloaded.stats().windows_completed, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let summary = TransparencyLog::new().summary();

        assert!(summary.contains("Edit events"));
        assert!(summary.contains("Triggers fired"));
        assert!(summary.contains("Privacy Guarantee"));
        assert!(summary.contains("No document content captured"));
    }
}
