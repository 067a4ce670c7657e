// ============================================================================
// sweetspot-core/src/search.rs
// ============================================================================
//
// QUALITY SEARCH: Target-Quality Search Over One Preset
//
// Finds the highest quality value (smallest file) whose VMAF still meets a
// target. Both range extremes are tested first; if even the best-quality end
// misses the target the preset is infeasible. Otherwise a bracket
// [feasible, infeasible] is narrowed by linear interpolation on the scores,
// falling back to the midpoint whenever interpolation is unreliable or lands
// outside the bracket. A fixed iteration cap bounds the search even when the
// score is not monotonic in the quality value.
//
// Every tested value is cached for the lifetime of one search, so no value is
// ever evaluated twice.

use crate::codecs::QualityRange;
use crate::config::SearchConfig;
use crate::results::{Trial, TrialOutcome};
use crate::util::CancellationToken;

use serde::Serialize;
use std::collections::HashMap;

/// How a preset search ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Best feasible trial found.
    Found { trial: Trial },
    /// The best-quality end of the range cannot reach the target.
    Infeasible,
    Cancelled,
}

/// Result of one preset search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub preset: String,
    pub target: f64,
    pub outcome: SearchOutcome,
    /// Every distinct trial run, in probe order.
    pub probes: Vec<Trial>,
}

impl SearchReport {
    pub fn best(&self) -> Option<&Trial> {
        match &self.outcome {
            SearchOutcome::Found { trial } => Some(trial),
            SearchOutcome::Infeasible | SearchOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == SearchOutcome::Cancelled
    }
}

/// Per-search bracket and cache; discarded when the search ends.
struct SearchState<F> {
    trial_fn: F,
    cache: HashMap<u32, Trial>,
    probes: Vec<Trial>,
    low: u32,
    high: u32,
    low_score: Option<f64>,
    high_score: Option<f64>,
}

impl<F: FnMut(u32) -> TrialOutcome> SearchState<F> {
    fn new(trial_fn: F, range: QualityRange) -> Self {
        Self {
            trial_fn,
            cache: HashMap::new(),
            probes: Vec::new(),
            low: range.min,
            high: range.max,
            low_score: None,
            high_score: None,
        }
    }

    /// Runs a trial for `quality` unless it is already cached.
    fn evaluate(&mut self, quality: u32) -> Option<Trial> {
        if let Some(trial) = self.cache.get(&quality) {
            log::trace!("Quality {} served from cache", quality);
            return Some(trial.clone());
        }
        match (self.trial_fn)(quality) {
            TrialOutcome::Completed(trial) => {
                self.cache.insert(quality, trial.clone());
                self.probes.push(trial.clone());
                Some(trial)
            }
            TrialOutcome::Cancelled => None,
        }
    }

    fn calls(&self) -> usize {
        self.probes.len()
    }
}

fn meets_target(trial: &Trial, target: f64) -> bool {
    trial.vmaf().is_some_and(|vmaf| vmaf >= target)
}

/// Quality-targeted search engine.
#[derive(Debug, Clone, Default)]
pub struct QualitySearch {
    config: SearchConfig,
    cancel: CancellationToken,
}

impl QualitySearch {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Next value to probe inside the open bracket `(low, high)`.
    fn next_probe(
        &self,
        low: u32,
        high: u32,
        low_score: Option<f64>,
        high_score: Option<f64>,
        target: f64,
    ) -> u32 {
        let midpoint = low + (high - low) / 2;
        let (Some(low_score), Some(high_score)) = (low_score, high_score) else {
            return midpoint;
        };

        let delta = high_score - low_score;
        let scale = low_score.abs().max(high_score.abs());
        let threshold = self.config.absolute_tolerance.max(self.config.relative_tolerance * scale);
        if delta.abs() <= threshold {
            return midpoint;
        }

        let estimate = low as f64 + (target - low_score) * (high - low) as f64 / delta;
        let rounded = estimate.round();
        if rounded.is_finite() && rounded > low as f64 && rounded < high as f64 {
            rounded as u32
        } else {
            midpoint
        }
    }

    /// Searches `range` for the most efficient quality value whose VMAF is at
    /// least `target`, calling `trial_fn` for every value not yet tested.
    ///
    /// A failed trial counts as missing the target.
    ///
    /// The extremes are tested best-quality end first. When that end already
    /// misses the target the preset is reported infeasible without testing
    /// the cheapest end: with VMAF falling as the quality value rises, the
    /// cheapest end cannot do better. Only when the best end passes is the
    /// cheapest end tested.
    pub fn find_best_quality<F>(
        &self,
        preset: &str,
        range: QualityRange,
        target: f64,
        trial_fn: F,
    ) -> SearchReport
    where
        F: FnMut(u32) -> TrialOutcome,
    {
        let mut state = SearchState::new(trial_fn, range);
        let outcome = self.run(&mut state, preset, range, target);

        match &outcome {
            SearchOutcome::Found { trial } => log::info!(
                "{}: quality {} meets VMAF {:.2} ({} trial(s))",
                preset,
                trial.quality,
                target,
                state.calls()
            ),
            SearchOutcome::Infeasible => log::info!(
                "{}: VMAF {:.2} is out of reach in range {}",
                preset,
                target,
                range
            ),
            SearchOutcome::Cancelled => log::info!("{}: search cancelled", preset),
        }

        SearchReport {
            preset: preset.to_string(),
            target,
            outcome,
            probes: state.probes,
        }
    }

    fn run<F: FnMut(u32) -> TrialOutcome>(
        &self,
        state: &mut SearchState<F>,
        preset: &str,
        range: QualityRange,
        target: f64,
    ) -> SearchOutcome {
        if self.cancel.is_cancelled() {
            return SearchOutcome::Cancelled;
        }

        // Best-quality end first: if this misses, nothing else can meet it.
        let Some(best) = state.evaluate(range.min) else {
            return SearchOutcome::Cancelled;
        };
        if !meets_target(&best, target) {
            if let Some(message) = best.error_message() {
                log::warn!("{}: trial at quality {} failed: {}", preset, range.min, message);
            }
            return SearchOutcome::Infeasible;
        }
        state.low_score = best.vmaf();
        if range.min == range.max {
            return SearchOutcome::Found { trial: best };
        }

        if self.cancel.is_cancelled() {
            return SearchOutcome::Cancelled;
        }
        let Some(cheapest) = state.evaluate(range.max) else {
            return SearchOutcome::Cancelled;
        };
        if meets_target(&cheapest, target) {
            return SearchOutcome::Found { trial: cheapest };
        }
        state.high_score = cheapest.vmaf();

        let mut best = best;
        let mut iterations = 0;
        while iterations < self.config.max_iterations && state.high - state.low > 1 {
            if self.cancel.is_cancelled() {
                return SearchOutcome::Cancelled;
            }

            let quality =
                self.next_probe(state.low, state.high, state.low_score, state.high_score, target);
            iterations += 1;
            log::debug!(
                "{}: probe {} at quality {} (bracket {}-{})",
                preset,
                iterations,
                quality,
                state.low,
                state.high
            );

            let Some(trial) = state.evaluate(quality) else {
                return SearchOutcome::Cancelled;
            };
            if meets_target(&trial, target) {
                state.low = quality;
                state.low_score = trial.vmaf();
                best = trial;
            } else {
                state.high = quality;
                state.high_score = trial.vmaf();
            }
        }

        SearchOutcome::Found { trial: best }
    }
}
