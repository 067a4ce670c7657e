// ============================================================================
// sweetspot-core/src/orchestrator/progress.rs
// ============================================================================
//
// PROGRESS: Completion Counters, ETA and Run Observers
//
// The orchestrator's consumer thread owns the tracker and is the only caller
// of observer methods, so observers need no synchronisation of their own.

use crate::results::Trial;
use crate::search::SearchReport;

use serde::Serialize;
use std::time::{Duration, Instant};

/// Progress after a completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
    pub elapsed: Duration,
    /// Estimated time remaining; `None` when there is nothing sensible to show.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// `(total - completed) * elapsed / completed`, reported only when it is
/// positive and below `ceiling`.
pub fn estimate_remaining(
    completed: usize,
    total: usize,
    elapsed: Duration,
    ceiling: Duration,
) -> Option<Duration> {
    if completed == 0 || completed >= total {
        return None;
    }
    let per_unit = elapsed.as_secs_f64() / completed as f64;
    let remaining = (total - completed) as f64 * per_unit;
    (remaining > 0.0 && remaining < ceiling.as_secs_f64())
        .then(|| Duration::from_secs_f64(remaining))
}

#[derive(Debug)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
    started: Instant,
    ceiling: Duration,
}

impl ProgressTracker {
    pub fn new(total: usize, ceiling: Duration) -> Self {
        Self {
            total,
            completed: 0,
            started: Instant::now(),
            ceiling,
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn record_completion(&mut self) -> ProgressSnapshot {
        self.completed = (self.completed + 1).min(self.total);
        let elapsed = self.elapsed();
        ProgressSnapshot {
            completed: self.completed,
            total: self.total,
            elapsed,
            eta: estimate_remaining(self.completed, self.total, elapsed, self.ceiling),
        }
    }
}

/// Receives run events. Every method defaults to doing nothing.
pub trait RunObserver {
    /// A trial finished (successfully or not). During target searches this
    /// fires for every probe.
    fn on_trial_complete(&mut self, _trial: &Trial) {}

    /// A preset search finished; `report.best()` is the search result.
    fn on_search_complete(&mut self, _report: &SearchReport) {}

    fn on_progress(&mut self, _progress: &ProgressSnapshot) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}
