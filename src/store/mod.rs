//! Day-scoped aggregate storage.
//!
//! This module contains:
//! - The per-day record and its export shape
//! - Repository backends (JSON files, memory)
//! - The session store the monitor mutates

pub mod day;
pub mod repository;
pub mod session;

// Re-export commonly used types
pub use day::{
    DayExport, DayStats, FileStats, IdleEvent, IdleEventKind, ScoreSample, ScoreSummary,
};
pub use repository::{DayRepository, JsonDayRepository, MemoryDayRepository, StoreError};
pub use session::SessionStore;
