// ============================================================================
// sweetspot-cli/src/progress.rs
// ============================================================================
//
// PROGRESS REPORTING: indicatif-backed RunObserver
//
// The orchestrator calls the observer from its single consumer thread, so the
// bar and counters need no locking here.

use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use sweetspot_core::orchestrator::{ProgressSnapshot, RunObserver};
use sweetspot_core::search::{SearchOutcome, SearchReport};
use sweetspot_core::utils::{format_eta, format_size_mb};
use sweetspot_core::{Trial, TrialStatus};

use crate::logging::info_enabled;

const BAR_TEMPLATE: &str = "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}";

/// One line per finished trial or search, above a progress bar.
pub struct CliObserver {
    bar: ProgressBar,
    show_trials: bool,
    failed: usize,
}

impl CliObserver {
    /// `total` is the number of units (trials for a sweep, presets for a
    /// target search).
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(bar_style) = ProgressStyle::with_template(BAR_TEMPLATE) {
            bar.set_style(bar_style.progress_chars("#>."));
        }
        if !console::Term::stderr().is_term() {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        Self {
            bar,
            show_trials: info_enabled(),
            failed: 0,
        }
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Human-readable one-liner for a trial.
pub fn describe_trial(trial: &Trial) -> String {
    match &trial.status {
        TrialStatus::Success(m) => format!(
            "{} q{}: VMAF {:.2}, {}, {:.2} VMAF/MB",
            trial.preset,
            trial.quality,
            m.vmaf,
            format_size_mb(m.size_mb),
            m.efficiency
        ),
        TrialStatus::Error { message } => {
            format!("{} q{}: failed ({})", trial.preset, trial.quality, message)
        }
    }
}

impl RunObserver for CliObserver {
    fn on_trial_complete(&mut self, trial: &Trial) {
        if !trial.is_success() {
            self.failed += 1;
        }
        if self.show_trials {
            let mark = if trial.is_success() {
                style("✓").green()
            } else {
                style("✗").red()
            };
            self.bar.println(format!("  {} {}", mark, describe_trial(trial)));
        }
    }

    fn on_search_complete(&mut self, report: &SearchReport) {
        let line = match &report.outcome {
            SearchOutcome::Found { trial } => format!(
                "{} {}: q{} meets VMAF {:.2} ({} probe(s))",
                style("◆").cyan(),
                report.preset,
                trial.quality,
                report.target,
                report.probes.len()
            ),
            SearchOutcome::Infeasible => format!(
                "{} {}: VMAF {:.2} not reachable in range",
                style("◆").yellow(),
                report.preset,
                report.target
            ),
            SearchOutcome::Cancelled => return,
        };
        self.bar.println(line);
    }

    fn on_progress(&mut self, progress: &ProgressSnapshot) {
        self.bar.set_position(progress.completed as u64);
        self.bar.set_message(format!("ETA {}", format_eta(progress.eta)));
    }
}
