use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, FromArgMatches};
use eyre::Result;

use chainrun_runtime::execution::CancellationToken;
use chainrun_runtime::executor::ChainExecutor;
use chainrun_runtime::runner::ShellRunner;

use crate::{app::Args, sink::ConsoleSink};

mod app;
mod sink;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    chainrun_runtime::init_tracing();

    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches)?;

    let stdin_commands = if args.stdin {
        app::read_stdin_commands().await?
    } else {
        Vec::new()
    };

    let chain = app::build_chain(&args, &matches, &stdin_commands);
    if chain.is_empty() {
        Args::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping the run");
                cancel.cancel();
            }
        });
    }

    let runner = Arc::new(ShellRunner::with_cancellation(
        Arc::new(ConsoleSink),
        cancel.clone(),
    ));
    let executor = ChainExecutor::with_cancellation(runner, args.effective_limit(), cancel)?;
    let report = executor.execute(&chain).await;

    // Spawn failures and cancellations have no summary line of their own.
    for outcome in report.outcomes() {
        if let Err(error) = outcome {
            eprintln!("{error}");
        }
    }

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
