//! Sequential driver for the test catalog.
//!
//! A run moves through `Prepare`, one `Running(phase)` state per catalog
//! phase, and ends in `Done`, or in `Aborted` as soon as anything other than
//! a test's own exit code goes wrong. Failing tests are only recorded; they
//! never stop the run.

use crate::catalog::{self, Phase, TestCase};
use crate::executable::ExecutableResolver;
use crate::log_broadcaster::{LogBroadcaster, LogObserver};
use crate::process_runner::{CaseRunner, ProcessRunner};
use crate::utils::render_error_chain;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

pub const SEPARATOR: &str = "********************************";
pub const PASSED: &str = "PASSED";
pub const FAILED: &str = "FAILED";
pub const TEST_COMPLETE: &str = "TEST COMPLETE";
pub const TEST_INTERRUPT: &str = "TEST INTERRUPT";

/// Work done before the first test case, e.g. fixture sync and executable checks.
pub type PrepareHook = Box<dyn FnOnce(&LogBroadcaster) -> Result<()> + Send>;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Prepare,
    Running(Phase),
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }
}

/// Counters accumulated over one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub(crate) executed_count: usize,
    pub(crate) passed_count: usize,
    failed_names: Mutex<Vec<String>>,
}

impl RunSummary {
    pub fn executed_count(&self) -> usize {
        self.executed_count
    }

    /// Display names of failed cases, in the order they failed.
    pub fn failed(&self) -> Vec<String> {
        self.failed_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Cases that ran to completion and exited with `0`. A case that could
    /// not be launched is executed but neither passed nor failed.
    pub fn passed_count(&self) -> usize {
        self.passed_count
    }

    pub(crate) fn record_failure(&self, name: &str) {
        self.failed_names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(name.to_string());
    }
}

/// Result of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub state: RunState,
}

impl RunOutcome {
    pub fn completed(&self) -> bool {
        self.state == RunState::Done
    }
}

/// A single execution of a [`TestCase`].
#[derive(Debug)]
struct TestRun<'a> {
    case: &'a TestCase,
    sequence_number: usize,
    exit_code: i32,
}

impl TestRun<'_> {
    fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs the catalog one case at a time and reports through the log.
pub struct TestOrchestrator {
    log: Arc<LogBroadcaster>,
    runner: Arc<dyn CaseRunner>,
    resolver: Arc<dyn ExecutableResolver>,
    working_dir: PathBuf,
    catalog: Vec<(Phase, Vec<TestCase>)>,
    prepare: Option<PrepareHook>,
    state: Arc<Mutex<RunState>>,
}

impl TestOrchestrator {
    pub fn new(
        log: Arc<LogBroadcaster>,
        resolver: Arc<dyn ExecutableResolver>,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            runner: Arc::new(ProcessRunner::new(log.clone())),
            log,
            resolver,
            working_dir,
            catalog: catalog::catalog(),
            prepare: None,
            state: Arc::new(Mutex::new(RunState::Prepare)),
        }
    }

    /// Sets the work done in the `Prepare` state. A failure aborts the run.
    pub fn with_prepare(mut self, prepare: PrepareHook) -> Self {
        self.prepare = Some(prepare);
        self
    }

    /// Replaces the process runner used for every case.
    pub fn with_runner(mut self, runner: Arc<dyn CaseRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replaces the catalog, used to drive reduced runs.
    pub fn with_catalog(mut self, catalog: Vec<(Phase, Vec<TestCase>)>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn register_observer(&self, observer: &Arc<dyn LogObserver>) {
        self.log.register_observer(observer);
    }

    pub fn state(&self) -> RunState {
        *lock_state(&self.state)
    }

    /// Starts the run on a dedicated thread.
    ///
    /// Consuming `self` means a given orchestrator can only ever be started
    /// once. There is no cancellation: a hung test executable hangs the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(mut self) -> Result<RunHandle> {
        let state = self.state.clone();
        let log = self.log.clone();
        let worker = thread::Builder::new()
            .name("qjs-harness-runner".to_string())
            .spawn(move || self.run())
            .context("Failed to spawn test runner thread")?;
        Ok(RunHandle { worker, state, log })
    }

    /// Runs prepare and every catalog case on the calling thread.
    pub fn run(&mut self) -> RunOutcome {
        let mut summary = RunSummary::default();
        let result = self.execute(&mut summary);

        self.log.append(SEPARATOR);
        self.log.append(SEPARATOR);
        self.log.append(SEPARATOR);

        let state = match result {
            Ok(()) => {
                self.log.append(TEST_COMPLETE);
                info!(
                    "Run complete: {} executed, {} failed",
                    summary.executed_count(),
                    summary.failed().len()
                );
                RunState::Done
            }
            Err(e) => {
                error!("Run interrupted: {e:#}");
                self.log.append(TEST_INTERRUPT);
                for line in render_error_chain(&e) {
                    self.log.append(line);
                }
                RunState::Aborted
            }
        };
        self.set_state(state);
        RunOutcome { summary, state }
    }

    fn execute(&mut self, summary: &mut RunSummary) -> Result<()> {
        self.set_state(RunState::Prepare);
        if let Some(prepare) = self.prepare.take() {
            prepare(self.log.as_ref()).context("Prepare failed")?;
        }

        for (phase, cases) in &self.catalog {
            self.set_state(RunState::Running(*phase));
            info!("Phase {phase}: {} cases", cases.len());
            for case in cases {
                self.run_case(case, summary)?;
            }
        }
        Ok(())
    }

    fn run_case(&self, case: &TestCase, summary: &mut RunSummary) -> Result<()> {
        summary.executed_count += 1;
        let sequence_number = summary.executed_count;

        self.log.append(SEPARATOR);
        self.log
            .append(format!("** {sequence_number}. {}", case.display_name()));
        self.log.append(SEPARATOR);

        let executable = self.resolver.resolve(case.executable());
        let exit_code = self
            .runner
            .run(&executable, case.argument(), &self.working_dir)
            .with_context(|| format!("Can't run test {}", case.display_name()))?;

        let run = TestRun {
            case,
            sequence_number,
            exit_code,
        };
        debug!("{run:?}");

        if run.passed() {
            summary.passed_count += 1;
            self.log.append(PASSED);
        } else {
            warn!(
                "Test {}. {} failed with exit code {}",
                run.sequence_number,
                run.case.display_name(),
                run.exit_code
            );
            self.log.append(FAILED);
            summary.record_failure(run.case.display_name());
        }
        Ok(())
    }

    fn set_state(&self, state: RunState) {
        *lock_state(&self.state) = state;
    }
}

fn lock_state(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a run started with [`TestOrchestrator::start`].
pub struct RunHandle {
    worker: JoinHandle<RunOutcome>,
    state: Arc<Mutex<RunState>>,
    log: Arc<LogBroadcaster>,
}

impl RunHandle {
    pub fn state(&self) -> RunState {
        *lock_state(&self.state)
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    pub fn register_observer(&self, observer: &Arc<dyn LogObserver>) {
        self.log.register_observer(observer);
    }

    /// Blocks until the run ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the runner thread panicked.
    pub fn join(self) -> Result<RunOutcome> {
        self.worker
            .join()
            .map_err(|_| anyhow::anyhow!("Test runner thread panicked"))
    }
}
