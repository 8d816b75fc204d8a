//! Human-readable window lines on stdout.

use crate::monitor::{WindowPhase, WindowReport};
use crate::sink::{SinkError, WindowSink};

#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }

    /// The line printed for a report.
    pub fn format_line(report: &WindowReport) -> String {
        let f = &report.features;
        let rates = format!(
            "{:.0} keys/min, pause {:.0}%, {:.1} errors/min",
            f.keys_per_min,
            f.pause_ratio * 100.0,
            f.errors_per_min
        );

        let status = match report.phase {
            WindowPhase::Calibrating {
                collected,
                required,
            } => format!("calibrating {collected}/{required}"),
            WindowPhase::Scored {
                score,
                triggered: false,
            } => format!("score {score:.2}"),
            WindowPhase::Scored {
                score,
                triggered: true,
            } => format!("score {score:.2} | sustained elevated risk"),
        };

        format!("[{}] Window completed: {rates} | {status}", report.at.format("%H:%M:%S"))
    }
}

impl WindowSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn record(&mut self, report: &WindowReport) -> Result<usize, SinkError> {
        println!("{}", Self::format_line(report));
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::features::{FeatureKey, FeatureVector};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_line() {
        let mut report = WindowReport {
            at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 1, 0).unwrap(),
            day: "2024-01-15".to_string(),
            features: FeatureVector::default()
                .with(FeatureKey::KeysPerMin, 88.4)
                .with(FeatureKey::PauseRatio, 0.5),
            phase: WindowPhase::Calibrating {
                collected: 3,
                required: 10,
            },
            self_report: None,
        };

        let line = ConsoleSink::format_line(&report);
        assert_eq!(
            line,
            "[09:01:00] Window completed: 88 keys/min, pause 50%, 0.0 errors/min | calibrating 3/10"
        );

        report.phase = WindowPhase::Scored {
            score: 4.5,
            triggered: true,
        };
        assert!(ConsoleSink::format_line(&report).ends_with("score 4.50 | sustained elevated risk"));
    }
}
