//! Privacy-preserving editor event types.
//!
//! These types capture ONLY timing, counts and lengths - never document text.
//! File identity is an opaque key chosen by the host (typically a workspace
//! relative path).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a file, as reported by the editor host.
pub type FileKey = String;

/// The size of a single text change.
///
/// Privacy guarantee: only lengths are recorded, never the inserted text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDelta {
    /// Characters inserted by the change
    #[serde(default)]
    pub inserted_len: u64,
    /// Characters removed by the change
    #[serde(default)]
    pub deleted_len: u64,
    /// Newlines contained in the inserted text
    #[serde(default)]
    pub inserted_newlines: u64,
}

impl EditDelta {
    pub fn new(inserted_len: u64, deleted_len: u64, inserted_newlines: u64) -> Self {
        Self {
            inserted_len,
            deleted_len,
            inserted_newlines,
        }
    }

    /// A change that only removes text (backspace / delete).
    pub fn is_pure_deletion(&self) -> bool {
        self.inserted_len == 0 && self.deleted_len > 0
    }

    /// A change that neither inserts nor deletes anything.
    pub fn is_empty(&self) -> bool {
        self.inserted_len == 0 && self.deleted_len == 0
    }
}

/// What happened in the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EditorEventKind {
    /// Document content changed
    Edit {
        #[serde(default)]
        file: Option<FileKey>,
        #[serde(rename = "insertedLen", default)]
        inserted_len: u64,
        #[serde(rename = "deletedLen", default)]
        deleted_len: u64,
        #[serde(rename = "insertedNewlines", default)]
        inserted_newlines: u64,
    },
    /// Primary cursor moved to a (zero-based) line
    Selection {
        #[serde(default)]
        file: Option<FileKey>,
        line: u32,
    },
    /// The active editor changed
    FileSwitch {
        #[serde(default)]
        file: Option<FileKey>,
    },
    /// Current error count reported by diagnostics (a level, not a delta)
    Diagnostics { errors: u32 },
    /// Undo or redo was invoked
    UndoRedo {
        #[serde(default)]
        file: Option<FileKey>,
    },
    /// The editor window gained focus
    Focus {
        #[serde(default)]
        file: Option<FileKey>,
    },
    /// A document was saved
    Save {
        #[serde(default)]
        file: Option<FileKey>,
    },
    /// The user reported how they feel for the current window
    SelfReport { value: i32 },
}

/// An editor event with the time it was observed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorEvent {
    /// Timestamp when the event occurred
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EditorEventKind,
}

impl EditorEvent {
    pub fn new(at: DateTime<Utc>, kind: EditorEventKind) -> Self {
        Self { at, kind }
    }

    /// Create an event stamped with the current time.
    pub fn now(kind: EditorEventKind) -> Self {
        Self::new(Utc::now(), kind)
    }

    /// The file the event refers to, if any.
    pub fn file(&self) -> Option<&str> {
        match &self.kind {
            EditorEventKind::Edit { file, .. }
            | EditorEventKind::Selection { file, .. }
            | EditorEventKind::FileSwitch { file }
            | EditorEventKind::UndoRedo { file }
            | EditorEventKind::Focus { file }
            | EditorEventKind::Save { file } => file.as_deref(),
            EditorEventKind::Diagnostics { .. } | EditorEventKind::SelfReport { .. } => None,
        }
    }

    /// Whether the event reflects user interaction (as opposed to a level
    /// signal or an annotation).
    pub fn is_interaction(&self) -> bool {
        !matches!(
            self.kind,
            EditorEventKind::Diagnostics { .. } | EditorEventKind::SelfReport { .. }
        )
    }

    /// The text change carried by an edit event.
    pub fn edit_delta(&self) -> Option<EditDelta> {
        match self.kind {
            EditorEventKind::Edit {
                inserted_len,
                deleted_len,
                inserted_newlines,
                ..
            } => Some(EditDelta::new(inserted_len, deleted_len, inserted_newlines)),
            _ => None,
        }
    }

    /// Short label used by the transparency log and diagnostics output.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EditorEventKind::Edit { .. } => "edit",
            EditorEventKind::Selection { .. } => "selection",
            EditorEventKind::FileSwitch { .. } => "file_switch",
            EditorEventKind::Diagnostics { .. } => "diagnostics",
            EditorEventKind::UndoRedo { .. } => "undo_redo",
            EditorEventKind::Focus { .. } => "focus",
            EditorEventKind::Save { .. } => "save",
            EditorEventKind::SelfReport { .. } => "self_report",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_edit_line() {
        let line = r#"{"at":"2024-01-22T10:00:01Z","kind":"edit","file":"src/lib.rs","insertedLen":3,"deletedLen":0,"insertedNewlines":1}"#;
        let event: EditorEvent = serde_json::from_str(line).unwrap();

        assert_eq!(event.file(), Some("src/lib.rs"));
        assert_eq!(event.edit_delta(), Some(EditDelta::new(3, 0, 1)));
    }

    #[test]
    fn test_parse_without_file() {
        let line = r#"{"at":"2024-01-22T10:00:01Z","kind":"focus"}"#;
        let event: EditorEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.file(), None);
        assert!(event.is_interaction());
    }

    #[test]
    fn test_diagnostics_is_not_interaction() {
        let event = EditorEvent::now(EditorEventKind::Diagnostics { errors: 4 });
        assert!(!event.is_interaction());
        assert_eq!(event.label(), "diagnostics");
    }

    #[test]
    fn test_pure_deletion() {
        assert!(EditDelta::new(0, 1, 0).is_pure_deletion());
        assert!(!EditDelta::new(1, 1, 0).is_pure_deletion());
        assert!(EditDelta::default().is_empty());
    }
}
