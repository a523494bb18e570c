//! In-order dispatch over a job chain.
//!
//! [`ChainExecutor`] walks the chain strictly in declared order: a sequential
//! element goes straight to the runner, a parallel element fans out through
//! the [`ConcurrencyLimiter`], and in both cases the executor blocks until
//! the element has fully completed before dispatching the next one.

use std::sync::Arc;

use tracing::{debug, info};

use crate::chain::{ChainElement, JobChain};
use crate::execution::{CancellationToken, ConfigError, RunOutcome, RunnerError};
use crate::limiter::ConcurrencyLimiter;
use crate::runner::CommandRunner;

/// Every per-command outcome of one run, in dispatch order.
///
/// Within a parallel group, outcomes appear in the group's declared member
/// order regardless of which member finished first.
#[derive(Default)]
pub struct ChainReport {
    outcomes: Vec<RunOutcome>,
}

impl ChainReport {
    pub fn outcomes(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    /// True when every command spawned and exited zero.
    pub fn success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o, Ok(result) if result.success()))
    }

    /// Exit codes in dispatch order; `None` for commands that never produced
    /// one (spawn failure or cancellation).
    pub fn exit_codes(&self) -> Vec<Option<i32>> {
        self.outcomes
            .iter()
            .map(|o| o.as_ref().ok().map(|r| r.exit_code))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Drives one run of a [`JobChain`].
///
/// Elements are strictly serialized relative to each other; only the commands
/// inside one parallel element ever overlap, and those are bounded by the
/// limiter.
pub struct ChainExecutor {
    runner: Arc<dyn CommandRunner>,
    limiter: ConcurrencyLimiter,
    cancel: CancellationToken,
}

impl ChainExecutor {
    /// # Errors
    /// Fails before any execution if `limit` is zero.
    pub fn new(runner: Arc<dyn CommandRunner>, limit: usize) -> Result<Self, ConfigError> {
        Self::with_cancellation(runner, limit, CancellationToken::new())
    }

    /// Build an executor that stops dispatching new elements once `cancel`
    /// fires. The runner is expected to share the same token so in-flight
    /// commands die too.
    pub fn with_cancellation(
        runner: Arc<dyn CommandRunner>,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            runner,
            limiter: ConcurrencyLimiter::new(limit)?,
            cancel,
        })
    }

    /// Execute the chain to completion, one element at a time.
    ///
    /// A failing command never halts the chain: execution always proceeds to
    /// the next element regardless of prior results. Only cancellation stops
    /// the walk early, and whatever was dispatched before that is still
    /// reported.
    pub async fn execute(&self, chain: &JobChain) -> ChainReport {
        info!(
            elements = chain.len(),
            commands = chain.command_count(),
            limit = self.limiter.limit(),
            "executing job chain"
        );

        let mut report = ChainReport::default();
        for (index, element) in chain.elements().iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(remaining = chain.len() - index, "run cancelled, skipping remaining elements");
                for command in pending_commands(element) {
                    report
                        .outcomes
                        .push(Err(RunnerError::Cancelled(command.clone())));
                }
                continue;
            }

            match element {
                ChainElement::Sequential(command) => {
                    debug!(index, %command, "dispatching sequential command");
                    report.outcomes.push(self.runner.run(command).await);
                }
                ChainElement::Parallel(commands) => {
                    debug!(index, count = commands.len(), "dispatching parallel group");
                    report
                        .outcomes
                        .extend(self.limiter.run_all(self.runner.clone(), commands).await);
                }
            }
        }
        report
    }
}

fn pending_commands(element: &ChainElement) -> &[String] {
    match element {
        ChainElement::Sequential(command) => std::slice::from_ref(command),
        ChainElement::Parallel(commands) => commands,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::events::NoOpSink;
    use crate::execution::ExecutionResult;
    use crate::runner::ShellRunner;

    /// Runner that records dispatch order and start instants instead of
    /// spawning processes.
    struct RecordingRunner {
        log: Mutex<Vec<(String, Instant)>>,
        delay: Duration,
    }

    impl RecordingRunner {
        fn new(delay: Duration) -> Self {
            Self {
                log: Mutex::new(Vec::new()),
                delay,
            }
        }

        fn starts(&self) -> Vec<(String, Instant)> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for RecordingRunner {
        async fn run(&self, command: &str) -> RunOutcome {
            self.log
                .lock()
                .unwrap()
                .push((command.to_string(), Instant::now()));
            tokio::time::sleep(self.delay).await;

            let now = time::OffsetDateTime::now_utc();
            Ok(ExecutionResult::builder()
                .command(command.to_string())
                .exit_code(0)
                .started_at(now)
                .finished_at(now)
                .elapsed(self.delay)
                .stdout(String::new())
                .stderr(String::new())
                .build())
        }
    }

    fn shell_executor(limit: usize) -> ChainExecutor {
        let runner = Arc::new(ShellRunner::new(Arc::new(NoOpSink)));
        ChainExecutor::new(runner, limit).unwrap()
    }

    #[test]
    fn zero_limit_fails_before_execution() {
        let runner = Arc::new(RecordingRunner::new(Duration::ZERO));
        assert!(matches!(
            ChainExecutor::new(runner, 0),
            Err(ConfigError::InvalidLimit(0))
        ));
    }

    #[tokio::test]
    async fn elements_start_in_declared_order() {
        let runner = Arc::new(RecordingRunner::new(Duration::from_millis(20)));
        let executor = ChainExecutor::new(runner.clone(), 4).unwrap();

        let mut chain = JobChain::new();
        chain.push_sequential("one");
        chain.push_concurrent("two-a");
        chain.push_concurrent("two-b");
        chain.push_sequential("three");

        let report = executor.execute(&chain).await;
        assert_eq!(report.len(), 4);

        let starts = runner.starts();
        // element 1 starts before every member of element 2, which all start
        // before element 3
        let t_one = starts.iter().find(|(c, _)| c == "one").unwrap().1;
        let t_two_a = starts.iter().find(|(c, _)| c == "two-a").unwrap().1;
        let t_two_b = starts.iter().find(|(c, _)| c == "two-b").unwrap().1;
        let t_three = starts.iter().find(|(c, _)| c == "three").unwrap().1;
        assert!(t_one <= t_two_a && t_one <= t_two_b);
        assert!(t_two_a <= t_three && t_two_b <= t_three);
    }

    #[tokio::test]
    async fn a_failing_command_never_halts_the_chain() {
        let executor = shell_executor(2);

        let mut chain = JobChain::new();
        chain.push_sequential("exit 3");
        chain.push_sequential("echo after");

        let report = executor.execute(&chain).await;
        assert_eq!(report.exit_codes(), vec![Some(3), Some(0)]);
        assert!(!report.success());
        assert!(report.outcomes()[1]
            .as_ref()
            .unwrap()
            .stdout
            .contains("after"));
    }

    #[tokio::test]
    async fn report_orders_parallel_outcomes_by_declaration() {
        let executor = shell_executor(4);

        let mut chain = JobChain::new();
        chain.push_concurrent("sleep 0.2; exit 7");
        chain.push_concurrent("exit 0");

        let report = executor.execute(&chain).await;
        assert_eq!(report.exit_codes(), vec![Some(7), Some(0)]);
    }

    #[tokio::test]
    async fn limit_one_serializes_a_group_and_wide_limit_overlaps_it() {
        let mut chain = JobChain::new();
        for _ in 0..3 {
            chain.push_concurrent("sleep 0.2");
        }

        let start = Instant::now();
        shell_executor(1).execute(&chain).await;
        let serialized = start.elapsed();

        let start = Instant::now();
        shell_executor(3).execute(&chain).await;
        let overlapped = start.elapsed();

        // three 200ms sleeps: ~600ms one at a time, ~200ms when overlapped
        assert!(serialized >= Duration::from_millis(500), "{serialized:?}");
        assert!(overlapped < serialized, "{overlapped:?} vs {serialized:?}");
    }

    #[tokio::test]
    async fn identical_runs_report_identical_exit_codes() {
        let executor = shell_executor(2);

        let mut chain = JobChain::new();
        chain.push_sequential("exit 1");
        chain.push_concurrent("exit 0");
        chain.push_concurrent("exit 2");

        let first = executor.execute(&chain).await.exit_codes();
        let second = executor.execute(&chain).await.exit_codes();
        assert_eq!(first, second);
        assert_eq!(first, vec![Some(1), Some(0), Some(2)]);
    }

    #[tokio::test]
    async fn cancellation_skips_remaining_elements_but_reports_them() {
        let cancel = CancellationToken::new();
        let runner = Arc::new(RecordingRunner::new(Duration::ZERO));
        let executor =
            ChainExecutor::with_cancellation(runner.clone(), 2, cancel.clone()).unwrap();

        cancel.cancel();

        let mut chain = JobChain::new();
        chain.push_sequential("never-runs");
        chain.push_concurrent("also-never");

        let report = executor.execute(&chain).await;
        assert!(runner.starts().is_empty());
        assert_eq!(report.len(), 2);
        assert!(report
            .outcomes()
            .iter()
            .all(|o| matches!(o, Err(RunnerError::Cancelled(_)))));
    }
}
