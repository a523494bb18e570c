//! Argument handling: turning the declared flag order into a job chain.
//!
//! The order of `-s` and `-c` flags defines the workflow, so parsing can't
//! treat the two as independent lists; [`build_chain`] re-interleaves them
//! using the indices clap recorded for each value.

use std::io;
use std::num::NonZeroUsize;

use clap::{ArgMatches, Parser};
use tokio::io::{AsyncBufReadExt, BufReader};

use chainrun_runtime::chain::JobChain;

#[derive(Parser, Debug)]
#[command(
    name = "chainrun",
    about = "Run a chain of shell commands, concurrently where declared",
    after_help = "\
The order of -s and -c flags defines the workflow. A run of consecutive -c
commands forms one concurrent group, bounded by its sequential neighbors:

    chainrun -n 4 -s job1 -c job2 -c job3 -c job4 -s job5

runs job1 first, then job2/job3/job4 concurrently (at most 4 at once), and
job5 only after all three are done. Exits non-zero if any command failed."
)]
pub struct Args {
    /// Append a command that runs on its own, after everything before it
    #[arg(short = 's', long = "seq", value_name = "CMD")]
    pub sequential: Vec<String>,

    /// Append a command that may run concurrently with its neighbors
    #[arg(short = 'c', long = "conc", value_name = "CMD")]
    pub concurrent: Vec<String>,

    /// Maximum number of concurrently running commands [default: logical CPUs]
    #[arg(short = 'n', long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Read newline-delimited commands from stdin; each line joins the flow
    /// as a concurrent command at this flag's position
    #[arg(long = "stdin")]
    pub stdin: bool,
}

impl Args {
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or_else(default_limit)
    }
}

fn default_limit() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

enum Declaration {
    Sequential(String),
    Concurrent(String),
}

/// Rebuild the declared flow from the parsed arguments.
///
/// clap hands back `-s` and `-c` values as two separate lists; their relative
/// order is recovered from each value's command-line index. Commands read
/// from stdin splice in at the position the `--stdin` flag occupied.
pub fn build_chain(args: &Args, matches: &ArgMatches, stdin_commands: &[String]) -> JobChain {
    let mut declarations: Vec<(usize, usize, Declaration)> = Vec::new();

    if let Some(indices) = matches.indices_of("sequential") {
        for (index, command) in indices.zip(&args.sequential) {
            declarations.push((index, 0, Declaration::Sequential(command.clone())));
        }
    }
    if let Some(indices) = matches.indices_of("concurrent") {
        for (index, command) in indices.zip(&args.concurrent) {
            declarations.push((index, 0, Declaration::Concurrent(command.clone())));
        }
    }
    if let Some(index) = matches.index_of("stdin") {
        for (offset, command) in stdin_commands.iter().enumerate() {
            declarations.push((index, offset, Declaration::Concurrent(command.clone())));
        }
    }

    declarations.sort_by_key(|(index, offset, _)| (*index, *offset));

    let mut chain = JobChain::new();
    for (_, _, declaration) in declarations {
        match declaration {
            Declaration::Sequential(command) => chain.push_sequential(command),
            Declaration::Concurrent(command) => chain.push_concurrent(command),
        }
    }
    chain
}

/// Read newline-delimited commands from stdin, skipping blank lines.
pub async fn read_stdin_commands() -> io::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut commands = Vec::new();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            commands.push(line.to_string());
        }
    }
    Ok(commands)
}
