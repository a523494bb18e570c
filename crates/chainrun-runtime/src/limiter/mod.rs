//! Bounded-concurrency batch execution.
//!
//! [`ConcurrencyLimiter`] fans a batch of independent commands out under a
//! semaphore so that at most `limit` processes run at any instant, then fans
//! back in: the call returns only after every member has finished, with
//! results in input order.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use crate::execution::{ConfigError, RunOutcome, RunnerError};
use crate::runner::CommandRunner;

/// Admission control for a parallel group of commands.
///
/// The semaphore is the only shared mutable state between group members; a
/// command holds a permit only while its process is actually running.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyLimiter {
    /// Build a limiter admitting at most `limit` concurrent commands.
    ///
    /// # Errors
    /// `limit` must be at least 1; zero is a configuration error.
    pub fn new(limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::InvalidLimit(limit));
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every command in `commands`, at most `limit` at a time, and return
    /// one outcome per command in input order.
    ///
    /// All members run to their own completion: a command that fails to spawn
    /// or exits non-zero never cancels its siblings, and its outcome is
    /// reported alongside theirs.
    pub async fn run_all(
        &self,
        runner: Arc<dyn CommandRunner>,
        commands: &[String],
    ) -> Vec<RunOutcome> {
        debug!(
            count = commands.len(),
            limit = self.limit,
            "fanning out parallel group"
        );

        let mut handles = Vec::with_capacity(commands.len());
        for command in commands {
            let semaphore = self.semaphore.clone();
            let runner = runner.clone();
            let command = command.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    // the semaphore is never closed while a group is in
                    // flight; treat it as the run being torn down
                    Err(_) => return Err(RunnerError::Cancelled(command)),
                };
                runner.run(&command).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, command) in handles.into_iter().zip(commands) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => outcomes.push(Err(RunnerError::Io {
                    command: command.clone(),
                    source: std::io::Error::other(error),
                })),
            }
        }
        outcomes
    }
}
