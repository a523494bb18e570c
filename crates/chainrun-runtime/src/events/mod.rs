//! Output events emitted while commands run.
//!
//! Every line read from a child's stdout or stderr is forwarded to an
//! [`OutputSink`] as soon as it arrives, tagged with the originating command
//! so concurrent commands' output stays attributable. When a command's
//! process exits, a summary event follows.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which child stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamSource::Stdout => write!(f, "stdout"),
            StreamSource::Stderr => write!(f, "stderr"),
        }
    }
}

/// Events emitted by the engine for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RunEvent {
    /// A command's process was spawned.
    Started { command: String },

    /// One line read from a running command's stdout or stderr.
    Line {
        source: StreamSource,
        command: String,
        line: String,
    },

    /// A command's process exited.
    Finished {
        command: String,
        exit_code: i32,
        elapsed_seconds: f64,
    },
}

/// Trait for delivering run events to a consumer.
///
/// Implementations handle presentation (console, log, test capture); the
/// engine only guarantees delivery order per command: `Started`, then each
/// `Line` as it is read, then `Finished`.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Emit an event to the sink.
    ///
    /// # Errors
    /// Returns an error if the event cannot be delivered. The engine ignores
    /// sink failures; they never affect command execution.
    async fn emit(&self, event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// No-op sink for when output is not needed.
pub struct NoOpSink;

#[async_trait]
impl OutputSink for NoOpSink {
    async fn emit(&self, _event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Sink that collects events in memory.
///
/// Useful for tests or scenarios where events need to be collected and
/// inspected programmatically.
#[derive(Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<RunEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl OutputSink for MemorySink {
    async fn emit(&self, event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
