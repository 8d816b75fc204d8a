//! Destinations for per-window reports.
//!
//! Sinks are peripheral: a failing sink is logged by the monitor and never
//! interrupts scoring or accounting.

pub mod console;
pub mod csv_log;

use crate::monitor::WindowReport;
use thiserror::Error;

pub use console::ConsoleSink;
pub use csv_log::{CsvLogSink, CSV_HEADER};

/// Sink errors.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Receives one report per window tick.
pub trait WindowSink: Send {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Handle a report. Returns the number of rows persisted by this call,
    /// which may include rows buffered by earlier failures.
    fn record(&mut self, report: &WindowReport) -> Result<usize, SinkError>;

    /// Persist anything still buffered. Returns the number of rows written.
    fn flush(&mut self) -> Result<usize, SinkError> {
        Ok(0)
    }
}
