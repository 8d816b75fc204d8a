//! Synheart Editor Agent - passive, privacy-first editor behavior monitor.
//!
//! This library turns a stream of editor interaction events (edits, cursor
//! moves, file switches, diagnostics, undo/redo, idle gaps) into per-minute
//! feature windows, scores each window against the user's own baseline and
//! raises a signal when the score stays elevated.
//!
//! # Privacy Guarantees
//!
//! - **No document content**: edits are reduced to lengths and newline counts
//! - **No keystroke identities**: only counts and timing are retained
//! - **Local by default**: day records and logs stay on disk unless upload is
//!   explicitly enabled
//! - **Transparency**: all processing is counted and auditable
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Synheart Editor Agent                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │  Collector  │──▶│   Monitor    │──▶│ Features → Baseline → │  │
//! │  │ (JSON lines)│   │ (idle/window │   │ Risk score + trigger  │  │
//! │  └─────────────┘   │    gates)    │   └───────────────────────┘  │
//! │                    └──────┬───────┘               │              │
//! │                           ▼                       ▼              │
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────────────┐  │
//! │  │Transparency │   │ SessionStore │   │ Sinks (CSV, console)  │  │
//! │  │    Log      │   │  (per day)   │   └───────────────────────┘  │
//! │  └─────────────┘   └──────────────┘                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use synheart_editor_agent::{collector, config::Config, monitor::Monitor, store};
//!
//! let config = Config::default();
//! let repository = store::JsonDayRepository::new(config.days_path());
//! let mut monitor = Monitor::new(config, Box::new(repository), chrono::Utc::now());
//!
//! let mut collector = collector::Collector::new(collector::CollectorConfig::default());
//! collector.start().expect("Failed to start collector");
//!
//! while let Ok(event) = collector.receiver().recv() {
//!     for report in monitor.handle_event(&event) {
//!         println!("{:?}", report.score());
//!     }
//! }
//! monitor.stop().expect("Failed to persist state");
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod monitor;
pub mod sink;
pub mod store;
pub mod transparency;

#[cfg(feature = "gateway")]
pub mod gateway;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, CollectorError, EditorEvent, EditorEventKind};
pub use config::{Config, ConfigError};
pub use core::{
    BaselineCalibrator, FeatureExtractor, FeatureKey, FeatureVector, FeatureWeights,
    HysteresisTrigger, RiskScorer, TimeAccountant, TriggerPhase,
};
pub use monitor::{Monitor, MonitorError, Subscription, SubscriptionList, WindowPhase, WindowReport};
pub use sink::{ConsoleSink, CsvLogSink, SinkError, WindowSink};
pub use store::{DayExport, DayRepository, DayStats, JsonDayRepository, SessionStore, StoreError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{BlockingGatewayClient, GatewayClient, GatewayConfig, GatewayError, GatewayResponse};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Privacy declaration that can be displayed to users.
pub const PRIVACY_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║           SYNHEART EDITOR AGENT - PRIVACY DECLARATION            ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent derives a behavioral signal from editor activity.    ║
║                                                                  ║
║  ✓ WHAT WE CAPTURE:                                              ║
║    • How much text changes (character and line counts only)      ║
║    • When you type, pause, undo or switch files (timing only)    ║
║    • How many diagnostics errors are open (a count)              ║
║    • Which file is active (as an opaque key, for time per file)  ║
║                                                                  ║
║  ✗ WHAT WE NEVER CAPTURE:                                        ║
║    • What you type (no document content, no keys you press)      ║
║    • Diagnostic messages or file contents                        ║
║    • Anything outside the editor                                 ║
║                                                                  ║
║  All data is processed locally. Raw events are discarded         ║
║  after feature extraction (once per window).                     ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    synheart-editor status                                        ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privacy_declaration_contents() {
        assert!(PRIVACY_DECLARATION.contains("PRIVACY"));
        assert!(PRIVACY_DECLARATION.contains("NEVER CAPTURE"));
        assert!(PRIVACY_DECLARATION.contains("document content"));
    }
}
