//! Execution results, the error taxonomy, and cancellation.
//!
//! Key types:
//! - [`ExecutionResult`]: what one finished command reports
//! - [`RunnerError`]: failures that surface out of a command's slot
//! - [`CancellationToken`]: cooperative run interruption

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use typed_builder::TypedBuilder;

/// The record of one command's completed execution.
///
/// A non-zero exit code is data here, never an engine error: the chain keeps
/// going regardless of prior results.
#[derive(TypedBuilder, Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// The command text exactly as declared.
    pub command: String,
    /// Process exit code. A process killed by a signal reports -1.
    pub exit_code: i32,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub elapsed: Duration,
    /// Full captured stdout text. Lines were also streamed live as they
    /// arrived; this is the after-the-fact aggregate.
    pub stdout: String,
    /// Full captured stderr text.
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Elapsed wall-clock time, rounded to two decimal places for display.
    pub fn elapsed_seconds(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).round() / 100.0
    }
}

/// Failures that surface out of a command's execution slot.
///
/// These never abort sibling commands in the same parallel group and never
/// halt later chain elements.
#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    /// The shell process could not be created at all.
    #[error("failed to spawn shell for `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while supervising an already-spawned process.
    #[error("i/o failure while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The run was interrupted before or while this command executed.
    #[error("command `{0}` was cancelled")]
    Cancelled(String),
}

/// Configuration errors, surfaced before any execution starts.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency limit must be at least 1 (got {0})")]
    InvalidLimit(usize),
}

/// What one command slot produced: a completed result, or the failure that
/// took its place.
pub type RunOutcome = Result<ExecutionResult, RunnerError>;

/// Token for cancelling a run.
///
/// Clonable; every holder observes the same one-way running-to-cancelled
/// transition. Cancelling twice is a no-op.
#[derive(Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the run. All clones of this token observe the transition.
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the token is cancelled; pends forever otherwise.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if *receiver.borrow() {
            return;
        }
        while receiver.changed().await.is_ok() {
            if *receiver.borrow() {
                return;
            }
        }
        // Every clone dropped without cancelling; nothing left to wait for.
        std::future::pending::<()>().await;
    }
}
