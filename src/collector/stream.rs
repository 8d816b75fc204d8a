//! Line-delimited JSON event intake.
//!
//! The editor host (extension, plugin or a recorded session file) writes one
//! [`EditorEvent`] per line. A background thread parses lines and forwards
//! events over a bounded channel so the monitor loop only ever sees whole,
//! ordered events.

use crate::collector::types::EditorEvent;
use crate::monitor::Subscription;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of parsed events waiting for the monitor loop.
const CHANNEL_CAPACITY: usize = 10_000;

/// Where events are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    /// Standard input (the host pipes events into the agent)
    Stdin,
    /// A JSON Lines file, e.g. a recorded session
    File(PathBuf),
}

/// Configuration for the event collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub source: EventSource,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            source: EventSource::Stdin,
        }
    }
}

/// Errors that can occur during event collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Collector is already running")]
    AlreadyRunning,

    #[error("Failed to open event source {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to spawn reader thread: {0}")]
    Spawn(std::io::Error),
}

/// Reads editor events from a line-delimited JSON stream.
pub struct StreamCollector {
    config: CollectorConfig,
    sender: Option<Sender<EditorEvent>>,
    receiver: Receiver<EditorEvent>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamCollector {
    /// Create a new collector. Nothing is read until [`start`](Self::start).
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            config,
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start reading events on a background thread.
    ///
    /// The channel disconnects once the source reaches end of input, so a
    /// collector can only be started once.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        let sender = match self.sender.take() {
            Some(sender) if !self.running.load(Ordering::SeqCst) => sender,
            _ => return Err(CollectorError::AlreadyRunning),
        };

        let reader: Box<dyn BufRead + Send> = match &self.config.source {
            EventSource::Stdin => Box::new(BufReader::new(std::io::stdin())),
            EventSource::File(path) => {
                let file = File::open(path).map_err(|source| CollectorError::Open {
                    path: path.clone(),
                    source,
                })?;
                Box::new(BufReader::new(file))
            }
        };

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();

        let handle = std::thread::Builder::new()
            .name("event-reader".to_string())
            .spawn(move || read_events(reader, sender, running))
            .map_err(CollectorError::Spawn)?;
        self.handle = Some(handle);

        Ok(())
    }

    /// Stop forwarding events.
    ///
    /// The reader thread notices on its next line; a thread blocked on an
    /// idle stdin is detached rather than joined.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for editor events.
    pub fn receiver(&self) -> &Receiver<EditorEvent> {
        &self.receiver
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<EditorEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Subscription for StreamCollector {
    fn name(&self) -> &str {
        "event-stream"
    }

    fn dispose(&mut self) {
        self.stop();
    }
}

/// Parse lines until end of input, a closed channel or a stop request.
fn read_events(reader: Box<dyn BufRead + Send>, sender: Sender<EditorEvent>, running: Arc<AtomicBool>) {
    let mut skipped = 0u64;

    for (index, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Event stream read failed: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_event_line(trimmed) {
            Ok(event) => {
                if sender.send(event).is_err() {
                    break;
                }
            }
            Err(e) => {
                skipped += 1;
                warn!(line = index + 1, "Skipping malformed event: {e}");
            }
        }
    }

    debug!(skipped, "Event stream finished");
    running.store(false, Ordering::SeqCst);
}

/// Parse one JSON Lines record into an event.
pub fn parse_event_line(line: &str) -> Result<EditorEvent, serde_json::Error> {
    serde_json::from_str(line)
}
