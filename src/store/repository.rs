//! Persistence backends for day statistics.

use crate::store::day::DayStats;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised by day repositories.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid day record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid day key '{0}' (expected YYYY-MM-DD)")]
    InvalidDayKey(String),
}

/// Storage for day-keyed statistics.
pub trait DayRepository: Send {
    /// Fetch a stored day, if any.
    fn get(&self, day: &str) -> Result<Option<DayStats>, StoreError>;

    /// Store (replace) a day.
    fn put(&mut self, stats: &DayStats) -> Result<(), StoreError>;

    /// Delete a day. Deleting a missing day is not an error.
    fn remove(&mut self, day: &str) -> Result<(), StoreError>;

    /// Keys of every stored day, oldest first.
    fn days(&self) -> Result<Vec<String>, StoreError>;
}

/// Reject anything that is not an ISO calendar date.
pub fn validate_day_key(day: &str) -> Result<(), StoreError> {
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| StoreError::InvalidDayKey(day.to_string()))
}

/// In-memory repository, used by tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryDayRepository {
    days: BTreeMap<String, DayStats>,
}

impl MemoryDayRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DayRepository for MemoryDayRepository {
    fn get(&self, day: &str) -> Result<Option<DayStats>, StoreError> {
        Ok(self.days.get(day).cloned())
    }

    fn put(&mut self, stats: &DayStats) -> Result<(), StoreError> {
        validate_day_key(&stats.day)?;
        self.days.insert(stats.day.clone(), stats.clone());
        Ok(())
    }

    fn remove(&mut self, day: &str) -> Result<(), StoreError> {
        self.days.remove(day);
        Ok(())
    }

    fn days(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.days.keys().cloned().collect())
    }
}

/// One pretty-printed JSON file per day under a directory.
#[derive(Debug, Clone)]
pub struct JsonDayRepository {
    dir: PathBuf,
}

impl JsonDayRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, day: &str) -> Result<PathBuf, StoreError> {
        validate_day_key(day)?;
        Ok(self.dir.join(format!("{day}.json")))
    }
}

impl DayRepository for JsonDayRepository {
    fn get(&self, day: &str) -> Result<Option<DayStats>, StoreError> {
        let path = self.path_for(day)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&mut self, stats: &DayStats) -> Result<(), StoreError> {
        let path = self.path_for(&stats.day)?;
        std::fs::create_dir_all(&self.dir)?;

        // Write to a sibling file first so a crash never leaves a torn record.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(stats)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, day: &str) -> Result<(), StoreError> {
        let path = self.path_for(day)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn days(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut days: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_string()))
            .filter(|day| validate_day_key(day).is_ok())
            .collect();
        days.sort();
        Ok(days)
    }
}
