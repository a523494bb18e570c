//! Execution engine for chained and concurrent shell commands.
//!
//! This crate provides the runtime behind the `chainrun` CLI. A run is
//! described by a [`chain::JobChain`]: an ordered list of elements where each
//! element is either a single sequential command or a group of commands that
//! may run concurrently. The engine includes:
//!
//! - the job-chain data model ([`chain`])
//! - per-command subprocess execution with live stdout/stderr streaming
//!   ([`runner`])
//! - bounded-concurrency scheduling for parallel groups ([`limiter`])
//! - strict in-order dispatch over the whole chain ([`executor`])
//! - the output-sink seam consumers implement to receive streamed lines and
//!   command summaries ([`events`])
//!
//! # Example
//!
//! The typical flow involves:
//! 1. Building a `JobChain` from the declared sequential/concurrent commands
//! 2. Constructing a `ShellRunner` with an output sink
//! 3. Handing both to a `ChainExecutor` together with the concurrency limit
//! 4. Inspecting the returned `ChainReport` for per-command outcomes

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for standalone logging to the terminal.
///
/// Sets up tracing to output to stderr with the log level controlled by the
/// `RUST_LOG` environment variable, defaulting to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

pub mod chain;
pub mod events;
pub mod execution;
pub mod executor;
pub mod limiter;
pub mod runner;
