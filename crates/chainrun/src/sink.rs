//! Console sink for streamed command output.
//!
//! Prints one prefixed line per output record so the lines of concurrent
//! commands stay attributable, plus a summary line when each command exits.
//! No cursor manipulation or in-place updates; the output is safe to pipe.

use std::io::{self, Write};

use async_trait::async_trait;

use chainrun_runtime::events::{OutputSink, RunEvent};

pub struct ConsoleSink;

#[async_trait]
impl OutputSink for ConsoleSink {
    async fn emit(&self, event: RunEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut stdout = io::stdout().lock();
        match event {
            RunEvent::Started { command } => {
                writeln!(stdout, "━━━ [{command}] started")?;
            }
            RunEvent::Line {
                source,
                command,
                line,
            } => {
                writeln!(stdout, "[{source}][{command}] {line}")?;
            }
            RunEvent::Finished {
                command,
                exit_code,
                elapsed_seconds,
            } => {
                writeln!(
                    stdout,
                    "━━━ [{command}] exited with code {exit_code} after {elapsed_seconds}s"
                )?;
            }
        }
        stdout.flush()?;
        Ok(())
    }
}
