// ============================================================================
// sweetspot-core/src/orchestrator/mod.rs
// ============================================================================
//
// TRIAL ORCHESTRATOR: Bounded Parallel Trial and Search Execution
//
// Units of work (one trial for a range sweep, one preset search for a target
// search) run on a dedicated rayon pool. Workers never touch shared state:
// they push messages into an mpsc channel, and the calling thread is the
// single consumer that owns the result set, counters and ETA and drives the
// observer.
//
// Cancellation points:
// - every unit checks the token before it starts;
// - external processes check it at each output line;
// - the consumer wakes up every poll interval to check it.
// When the consumer sees cancellation it terminates all registered child
// processes, then waits at most one termination grace period for in-flight
// units to report (they remove their work directories first) and returns.
// Queued units notice the token and exit without running.
//
// A panicking trial runner becomes a failed trial; it never takes the pool
// or the process down.

pub mod progress;
pub mod workers;

pub use progress::{
    NullObserver, ProgressSnapshot, ProgressTracker, RunObserver, estimate_remaining,
};
pub use workers::{CapReason, WorkerPlan, plan_worker_count, plan_worker_count_for};

use crate::codecs::QualityRange;
use crate::config::{OrchestratorConfig, SearchConfig};
use crate::error::{CoreError, CoreResult};
use crate::external::TrialRunner;
use crate::results::{ResultSet, Trial, TrialOutcome};
use crate::search::{QualitySearch, SearchReport};
use crate::util::process::ProcessContext;

use serde::Serialize;
use std::sync::Arc;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// One (preset, quality) trial of a range sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialTask {
    pub preset: String,
    pub quality: u32,
}

impl TrialTask {
    pub fn new(preset: impl Into<String>, quality: u32) -> Self {
        Self {
            preset: preset.into(),
            quality,
        }
    }
}

/// Cartesian product of `presets` and the quality values of `range`
/// (stepped, `max` always included), preset-major.
pub fn sweep_tasks(presets: &[String], range: QualityRange, step: u32) -> Vec<TrialTask> {
    let values = range.values(step);
    presets
        .iter()
        .flat_map(|preset| values.iter().map(move |q| TrialTask::new(preset.clone(), *q)))
        .collect()
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Completed trials in completion order (including search probes).
    pub results: ResultSet,
    /// Finished preset searches; empty for range sweeps.
    pub searches: Vec<SearchReport>,
    /// Units of work (trials or searches) finished.
    pub completed: usize,
    pub total: usize,
    pub workers: usize,
    pub elapsed: Duration,
    pub cancelled: bool,
}

enum Message {
    /// A sweep trial finished.
    Trial(Trial),
    /// A probe inside a running search finished.
    Probe(Trial),
    /// A preset search finished.
    Search(SearchReport),
    /// A unit ended without a result because of cancellation.
    Skipped,
}

/// Runs trials and searches against a `TrialRunner`.
pub struct Orchestrator {
    runner: Arc<dyn TrialRunner>,
    config: OrchestratorConfig,
    search: SearchConfig,
    ctx: ProcessContext,
    workers: usize,
}

impl Orchestrator {
    /// The worker count starts at `config.parallel_jobs`; pass a planned
    /// count through `with_workers`.
    pub fn new(
        runner: Arc<dyn TrialRunner>,
        config: OrchestratorConfig,
        ctx: ProcessContext,
    ) -> Self {
        let workers = config.parallel_jobs.max(1);
        let ctx = ctx.with_termination_grace(config.termination_grace());
        Self {
            runner,
            config,
            search: SearchConfig::default(),
            ctx,
            workers,
        }
    }

    pub fn with_search_config(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    /// Runs every task once. Completions reach `observer` in completion order.
    pub fn run_range_sweep(
        &self,
        tasks: Vec<TrialTask>,
        observer: &mut dyn RunObserver,
    ) -> CoreResult<RunSummary> {
        log::info!(
            "Starting range sweep: {} trial(s) on {} worker(s)",
            tasks.len(),
            self.workers
        );
        let runner = Arc::clone(&self.runner);
        self.run_units(tasks, observer, move |task: TrialTask, ctx, _tx| {
            match run_guarded(runner.as_ref(), &task.preset, task.quality, ctx) {
                TrialOutcome::Completed(trial) => Message::Trial(trial),
                TrialOutcome::Cancelled => Message::Skipped,
            }
        })
    }

    /// Runs one target-quality search per preset. Probes within a preset are
    /// sequential; presets run in parallel.
    pub fn run_target_search(
        &self,
        presets: &[String],
        range: QualityRange,
        target: f64,
        observer: &mut dyn RunObserver,
    ) -> CoreResult<RunSummary> {
        log::info!(
            "Starting target search for VMAF {:.2}: {} preset(s), range {}, {} worker(s)",
            target,
            presets.len(),
            range,
            self.workers
        );
        let runner = Arc::clone(&self.runner);
        let search_config = self.search.clone();
        self.run_units(presets.to_vec(), observer, move |preset: String, ctx, tx| {
            let search =
                QualitySearch::new(search_config.clone()).with_cancellation(ctx.cancel.clone());
            let report = search.find_best_quality(&preset, range, target, |quality| {
                let outcome = run_guarded(runner.as_ref(), &preset, quality, ctx);
                if let TrialOutcome::Completed(trial) = &outcome {
                    let _ = tx.send(Message::Probe(trial.clone()));
                }
                outcome
            });
            if report.is_cancelled() {
                Message::Skipped
            } else {
                Message::Search(report)
            }
        })
    }

    fn run_units<J, F>(
        &self,
        units: Vec<J>,
        observer: &mut dyn RunObserver,
        work: F,
    ) -> CoreResult<RunSummary>
    where
        J: Send + 'static,
        F: Fn(J, &ProcessContext, &Sender<Message>) -> Message + Send + Sync + 'static,
    {
        let total = units.len();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("sweetspot-trial-{i}"))
            .build()
            .map_err(|e| CoreError::ThreadPool(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Message>();
        let work = Arc::new(work);
        for unit in units {
            let tx = tx.clone();
            let ctx = self.ctx.clone();
            let work = Arc::clone(&work);
            pool.spawn(move || {
                let message = if ctx.cancel.is_cancelled() {
                    Message::Skipped
                } else {
                    work(unit, &ctx, &tx)
                };
                let _ = tx.send(message);
            });
        }
        drop(tx);

        let mut state = ConsumerState::new(total, self.workers, &self.config);
        let poll = self.config.poll_interval();
        while state.received < total {
            if self.ctx.cancel.is_cancelled() {
                return Ok(self.cancel_run(state, &rx, observer));
            }
            match rx.recv_timeout(poll) {
                Ok(message) => state.handle(message, observer),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!(
                        "Worker pool stopped after {} of {} unit(s)",
                        state.received,
                        total
                    );
                    break;
                }
            }
        }

        // Only cancelled units can be missing at this point.
        let cancelled = self.ctx.cancel.is_cancelled();
        log::info!(
            "Run finished: {} of {} unit(s), {} trial(s) ({} failed) in {:.1}s",
            state.tracker.completed(),
            total,
            state.results.len(),
            state.results.failed_count(),
            state.tracker.elapsed().as_secs_f64()
        );
        Ok(state.into_summary(cancelled))
    }

    /// Stops the run: kills in-flight external processes, keeps what already
    /// completed and abandons the pool without draining it.
    fn cancel_run(
        &self,
        mut state: ConsumerState,
        rx: &Receiver<Message>,
        observer: &mut dyn RunObserver,
    ) -> RunSummary {
        log::warn!(
            "Cancellation requested; terminating {} running process(es)",
            self.ctx.registry.active_count()
        );
        self.ctx.registry.terminate_all(self.ctx.termination_grace);

        let deadline = Instant::now() + self.ctx.termination_grace;
        while state.received < state.total {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(message) => state.handle(message, observer),
                Err(_) => break,
            }
        }
        if state.received < state.total {
            log::warn!(
                "{} unit(s) still running after cancellation; abandoning them",
                state.total - state.received
            );
        }
        log::info!(
            "Run cancelled after {} unit(s); keeping {} completed trial(s)",
            state.tracker.completed(),
            state.results.len()
        );
        state.into_summary(true)
    }
}

/// Runs one trial, turning a panic in the runner into a failed trial.
fn run_guarded(
    runner: &dyn TrialRunner,
    preset: &str,
    quality: u32,
    ctx: &ProcessContext,
) -> TrialOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| runner.run_trial(preset, quality, ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Trial {} q{} panicked: {}", preset, quality, message);
            TrialOutcome::Completed(Trial::failure(
                preset,
                quality,
                format!("trial runner panicked: {message}"),
            ))
        }
    }
}

/// Aggregate state owned by the consumer thread.
struct ConsumerState {
    results: ResultSet,
    searches: Vec<SearchReport>,
    tracker: ProgressTracker,
    received: usize,
    total: usize,
    workers: usize,
}

impl ConsumerState {
    fn new(total: usize, workers: usize, config: &OrchestratorConfig) -> Self {
        Self {
            results: ResultSet::new(),
            searches: Vec::new(),
            tracker: ProgressTracker::new(total, config.eta_ceiling()),
            received: 0,
            total,
            workers,
        }
    }

    fn handle(&mut self, message: Message, observer: &mut dyn RunObserver) {
        match message {
            Message::Probe(trial) => {
                observer.on_trial_complete(&trial);
                self.results.push(trial);
            }
            Message::Trial(trial) => {
                self.received += 1;
                observer.on_trial_complete(&trial);
                self.results.push(trial);
                let snapshot = self.tracker.record_completion();
                observer.on_progress(&snapshot);
            }
            Message::Search(report) => {
                self.received += 1;
                observer.on_search_complete(&report);
                self.searches.push(report);
                let snapshot = self.tracker.record_completion();
                observer.on_progress(&snapshot);
            }
            Message::Skipped => self.received += 1,
        }
    }

    fn into_summary(self, cancelled: bool) -> RunSummary {
        RunSummary {
            completed: self.tracker.completed(),
            elapsed: self.tracker.elapsed(),
            results: self.results,
            searches: self.searches,
            total: self.total,
            workers: self.workers,
            cancelled,
        }
    }
}
