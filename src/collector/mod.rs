//! Event collection module for the Synheart Editor Agent.
//!
//! Editor hosts deliver interaction events as JSON Lines; this module parses
//! them into privacy-preserving [`EditorEvent`]s and hands them to the monitor
//! loop over a channel.

pub mod stream;
pub mod types;

// Re-export commonly used types
pub use stream::{parse_event_line, CollectorConfig, CollectorError, EventSource, StreamCollector};
pub use types::{EditDelta, EditorEvent, EditorEventKind, FileKey};

/// The collector used by the agent binary.
pub type Collector = StreamCollector;
