//! Subprocess execution with live output streaming.
//!
//! [`ShellRunner`] runs one command string through the platform shell and
//! reports an [`ExecutionResult`] once the process has exited. While the
//! process runs, its stdout and stderr are drained by two independent tasks
//! so neither stream can back up and block the child; every line is forwarded
//! to the output sink the moment it is read, never batched until exit.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::events::{OutputSink, RunEvent, StreamSource};
use crate::execution::{CancellationToken, ExecutionResult, RunOutcome, RunnerError};

/// Trait for executing one command to completion.
///
/// The production implementation is [`ShellRunner`]; tests substitute
/// instrumented runners behind this seam.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command`, returning only after its process has exited.
    async fn run(&self, command: &str) -> RunOutcome;
}

/// Runner that executes command strings through the platform shell, so shell
/// metacharacters, pipes, and built-ins behave exactly as in a shell.
///
/// The child inherits the current environment and working directory.
pub struct ShellRunner {
    sink: Arc<dyn OutputSink>,
    cancel: CancellationToken,
    shell: String,
}

#[cfg(unix)]
const DEFAULT_SHELL: &str = "sh";
#[cfg(windows)]
const DEFAULT_SHELL: &str = "cmd";

#[cfg(unix)]
const SHELL_FLAG: &str = "-c";
#[cfg(windows)]
const SHELL_FLAG: &str = "/C";

impl ShellRunner {
    pub fn new(sink: Arc<dyn OutputSink>) -> Self {
        Self::with_cancellation(sink, CancellationToken::new())
    }

    /// Build a runner that aborts in-flight commands when `cancel` fires.
    pub fn with_cancellation(sink: Arc<dyn OutputSink>, cancel: CancellationToken) -> Self {
        Self {
            sink,
            cancel,
            shell: DEFAULT_SHELL.to_string(),
        }
    }

    /// Override the shell binary (default `sh`, or `cmd` on Windows).
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    fn shell_command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(SHELL_FLAG).arg(command);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }
        cmd
    }
}

/// Read `stream` line by line until end-of-input, forwarding each line to the
/// sink as it arrives and returning the captured aggregate.
///
/// A read error is treated as end-of-stream: the process's exit code is the
/// authoritative completion signal, so a broken pipe never fails the command.
async fn drain_stream<R>(
    stream: R,
    source: StreamSource,
    command: String,
    sink: Arc<dyn OutputSink>,
) -> String
where
    R: AsyncRead + Unpin + Send,
{
    let mut lines = BufReader::new(stream).lines();
    let mut captured = String::new();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                captured.push_str(&line);
                // reading by lines eats the newline, so add it back
                captured.push('\n');
                let _ = sink
                    .emit(RunEvent::Line {
                        source,
                        command: command.clone(),
                        line,
                    })
                    .await;
            }
            Ok(None) => break,
            Err(error) => {
                warn!(%command, %source, %error, "stream read failed, treating as end of stream");
                break;
            }
        }
    }
    captured
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> RunOutcome {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled(command.to_string()));
        }

        let started_at = OffsetDateTime::now_utc();
        let start = Instant::now();

        debug!(%command, "spawning shell process");
        let mut child = self
            .shell_command(command)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let _ = self
            .sink
            .emit(RunEvent::Started {
                command: command.to_string(),
            })
            .await;

        let stdout_task = match child.stdout.take() {
            Some(stream) => tokio::spawn(drain_stream(
                stream,
                StreamSource::Stdout,
                command.to_string(),
                self.sink.clone(),
            )),
            None => tokio::spawn(async { String::new() }),
        };
        let stderr_task = match child.stderr.take() {
            Some(stream) => tokio::spawn(drain_stream(
                stream,
                StreamSource::Stderr,
                command.to_string(),
                self.sink.clone(),
            )),
            None => tokio::spawn(async { String::new() }),
        };

        let mut was_cancelled = false;
        let status = tokio::select! {
            status = child.wait() => status,
            _ = self.cancel.cancelled() => {
                was_cancelled = true;
                if let Err(error) = child.kill().await {
                    warn!(%command, %error, "failed to kill cancelled command");
                }
                child.wait().await
            }
        };

        // Both readers reach end-of-input once the process side of the pipes
        // closes; collect what they captured before reporting.
        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if was_cancelled {
            debug!(%command, "command cancelled");
            return Err(RunnerError::Cancelled(command.to_string()));
        }

        let status = status.map_err(|source| RunnerError::Io {
            command: command.to_string(),
            source,
        })?;
        let exit_code = status.code().unwrap_or(-1);

        let result = ExecutionResult::builder()
            .command(command.to_string())
            .exit_code(exit_code)
            .started_at(started_at)
            .finished_at(OffsetDateTime::now_utc())
            .elapsed(start.elapsed())
            .stdout(stdout)
            .stderr(stderr)
            .build();

        debug!(
            %command,
            exit_code,
            elapsed_seconds = result.elapsed_seconds(),
            "command finished"
        );
        let _ = self
            .sink
            .emit(RunEvent::Finished {
                command: command.to_string(),
                exit_code,
                elapsed_seconds: result.elapsed_seconds(),
            })
            .await;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::events::{MemorySink, NoOpSink};

    fn runner_with_sink() -> (ShellRunner, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (ShellRunner::new(sink.clone()), sink)
    }

    #[tokio::test]
    async fn echo_reports_success_and_captures_stdout() {
        let (runner, sink) = runner_with_sink();
        let result = runner.run("echo hello").await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.success());
        assert!(result.stdout.contains("hello"));
        assert!(result.stderr.is_empty());
        assert!(result.finished_at >= result.started_at);

        let events = sink.events();
        assert!(matches!(events.first(), Some(RunEvent::Started { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            RunEvent::Line { source: StreamSource::Stdout, line, .. } if line == "hello"
        )));
        assert!(matches!(
            events.last(),
            Some(RunEvent::Finished { exit_code: 0, .. })
        ));
    }

    #[tokio::test]
    async fn nonzero_exit_is_data_not_an_error() {
        let (runner, _sink) = runner_with_sink();
        let result = runner.run("exit 3").await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn stderr_lines_are_tagged_and_captured() {
        let (runner, sink) = runner_with_sink();
        let result = runner.run("echo oops 1>&2").await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stderr.contains("oops"));
        assert!(result.stdout.is_empty());
        assert!(sink.events().iter().any(|e| matches!(
            e,
            RunEvent::Line { source: StreamSource::Stderr, line, .. } if line == "oops"
        )));
    }

    #[tokio::test]
    async fn both_streams_drain_without_blocking_each_other() {
        // Enough output on both channels to overflow a pipe buffer if either
        // reader waited on the other.
        let (runner, _sink) = runner_with_sink();
        let result = runner
            .run("seq 1 20000; seq 1 20000 1>&2")
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("20000"));
        assert!(result.stderr.contains("20000"));
    }

    #[tokio::test]
    async fn lines_stream_while_the_process_is_still_running() {
        let sink = Arc::new(MemorySink::new());
        let runner = ShellRunner::new(sink.clone());

        let task = tokio::spawn(async move { runner.run("echo first; sleep 1").await });

        // The first line must reach the sink well before the process exits.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(sink.events().iter().any(|e| matches!(
            e,
            RunEvent::Line { line, .. } if line == "first"
        )));
        assert!(!sink
            .events()
            .iter()
            .any(|e| matches!(e, RunEvent::Finished { .. })));

        let result = task.await.unwrap().unwrap();
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn missing_shell_is_a_spawn_error() {
        let runner =
            ShellRunner::new(Arc::new(NoOpSink)).with_shell("definitely-not-a-real-shell");
        let outcome = runner.run("echo hello").await;
        assert!(matches!(outcome, Err(RunnerError::Spawn { .. })));
    }

    #[tokio::test]
    async fn cancellation_kills_the_child_promptly() {
        let cancel = CancellationToken::new();
        let runner = ShellRunner::with_cancellation(Arc::new(NoOpSink), cancel.clone());

        let task = tokio::spawn(async move { runner.run("sleep 30").await });
        tokio::time::sleep(Duration::from_millis(200)).await;

        let start = Instant::now();
        cancel.cancel();
        let outcome = task.await.unwrap();

        assert!(matches!(outcome, Err(RunnerError::Cancelled(_))));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn already_cancelled_runner_refuses_to_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let runner = ShellRunner::with_cancellation(Arc::new(NoOpSink), cancel);
        let outcome = runner.run("echo hello").await;
        assert!(matches!(outcome, Err(RunnerError::Cancelled(_))));
    }
}
