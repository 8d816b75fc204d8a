//! Append-only CSV log of window reports.
//!
//! One row per window:
//!
//! ```text
//! timestamp,keysPerMin,...,codeChurnLocPerMin,score,triggered,selfReport
//! 2024-01-15T09:01:00.000Z,120.00,4.00,0.250,0.00,...,,0,
//! ```
//!
//! The header is written once, when the file is absent or empty. Rows that
//! could not be written stay buffered and go out with the next write.

use crate::core::features::FeatureKey;
use crate::monitor::{WindowPhase, WindowReport};
use crate::sink::{SinkError, WindowSink};
use chrono::SecondsFormat;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column names, in order.
pub const CSV_HEADER: [&str; 12] = [
    "timestamp",
    "keysPerMin",
    "backspacesPerMin",
    "pauseRatio",
    "errorsPerMin",
    "undoRedoPerMin",
    "cursorJumpsPerMin",
    "fileSwitchesPerMin",
    "codeChurnLocPerMin",
    "score",
    "triggered",
    "selfReport",
];

pub struct CsvLogSink {
    path: PathBuf,
    pending: Vec<Vec<String>>,
}

impl CsvLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows waiting for a successful write.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Format a report as CSV fields.
    pub fn format_row(report: &WindowReport) -> Vec<String> {
        let mut row = Vec::with_capacity(CSV_HEADER.len());
        row.push(report.at.to_rfc3339_opts(SecondsFormat::Millis, true));

        for key in FeatureKey::ALL {
            let value = report.features.get(key);
            row.push(match key {
                FeatureKey::PauseRatio => format!("{value:.3}"),
                _ => format!("{value:.2}"),
            });
        }

        match report.phase {
            WindowPhase::Calibrating { .. } => {
                row.push(String::new());
                row.push("0".to_string());
            }
            WindowPhase::Scored { score, triggered } => {
                row.push(format!("{score:.2}"));
                row.push(if triggered { "1" } else { "0" }.to_string());
            }
        }

        row.push(report.self_report.map(|v| v.to_string()).unwrap_or_default());
        row
    }

    fn write_pending(&mut self) -> Result<usize, SinkError> {
        if self.pending.is_empty() {
            return Ok(0);
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (file, needs_header) = match std::fs::metadata(&self.path) {
            Ok(meta) => (
                OpenOptions::new().append(true).open(&self.path)?,
                meta.len() == 0,
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (File::create(&self.path)?, true),
            Err(e) => {
                // The existing log is unreadable; start a fresh one.
                warn!(path = %self.path.display(), "Could not inspect CSV log, rewriting: {e}");
                (File::create(&self.path)?, true)
            }
        };

        write_rows(file, needs_header, &self.pending)?;
        let written = self.pending.len();
        self.pending.clear();
        debug!(rows = written, path = %self.path.display(), "Appended CSV rows");
        Ok(written)
    }
}

fn write_rows<W: Write>(writer: W, header: bool, rows: &[Vec<String>]) -> Result<(), SinkError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    if header {
        writer.write_record(CSV_HEADER)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

impl WindowSink for CsvLogSink {
    fn name(&self) -> &str {
        "csv-log"
    }

    fn record(&mut self, report: &WindowReport) -> Result<usize, SinkError> {
        self.pending.push(Self::format_row(report));
        self.write_pending()
    }

    fn flush(&mut self) -> Result<usize, SinkError> {
        self.write_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::FeatureVector;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn report(phase: WindowPhase, self_report: Option<i32>) -> WindowReport {
        WindowReport {
            at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 1, 0).unwrap(),
            day: "2024-01-15".to_string(),
            features: FeatureVector::default()
                .with(FeatureKey::KeysPerMin, 120.0)
                .with(FeatureKey::PauseRatio, 0.25)
                .with(FeatureKey::CodeChurnLocPerMin, 1.005),
            phase,
            self_report,
        }
    }

    fn temp_log() -> PathBuf {
        std::env::temp_dir()
            .join(format!("editor-csv-{}", uuid::Uuid::new_v4()))
            .join("windows.csv")
    }

    #[test]
    fn test_format_calibrating_row() {
        let row = CsvLogSink::format_row(&report(
            WindowPhase::Calibrating {
                collected: 1,
                required: 10,
            },
            None,
        ));

        assert_eq!(row.len(), CSV_HEADER.len());
        assert_eq!(row[0], "2024-01-15T09:01:00.000Z");
        assert_eq!(row[1], "120.00");
        assert_eq!(row[3], "0.250");
        assert_eq!(row[9], "");
        assert_eq!(row[10], "0");
        assert_eq!(row[11], "");
    }

    #[test]
    fn test_format_scored_row() {
        let row = CsvLogSink::format_row(&report(
            WindowPhase::Scored {
                score: 3.14159,
                triggered: true,
            },
            Some(4),
        ));

        assert_eq!(row[9], "3.14");
        assert_eq!(row[10], "1");
        assert_eq!(row[11], "4");
    }

    #[test]
    fn test_header_written_once() {
        let path = temp_log();
        let mut sink = CsvLogSink::new(&path);
        let calibrating = WindowPhase::Calibrating {
            collected: 1,
            required: 2,
        };

        assert_eq!(sink.record(&report(calibrating, None)).unwrap(), 1);
        // A second sink on the same file appends without another header.
        let mut sink = CsvLogSink::new(&path);
        sink.record(&report(calibrating, None)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert!(lines[1].starts_with("2024-01-15T09:01:00.000Z,120.00"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_failed_rows_stay_buffered() {
        // A directory where the file should be makes every write fail.
        let path = temp_log();
        std::fs::create_dir_all(&path).unwrap();

        let mut sink = CsvLogSink::new(&path);
        let phase = WindowPhase::Scored {
            score: 1.0,
            triggered: false,
        };
        assert!(sink.record(&report(phase, None)).is_err());
        assert!(sink.record(&report(phase, None)).is_err());
        assert_eq!(sink.pending(), 2);

        std::fs::remove_dir_all(&path).unwrap();
        assert_eq!(sink.flush().unwrap(), 2);
        assert_eq!(sink.pending(), 0);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
