//! Trial results and their multi-objective analysis.
//!
//! A `Trial` is one (preset, quality value) evaluation as reported by the
//! external encoder/prober service. Trials are immutable once created; the
//! run-wide `ResultSet` owns them and hands out `TrialId`s (insertion index)
//! that the Pareto and sweet-spot analysis refer to.

pub mod knee_point;
pub mod pareto;

pub use knee_point::sweet_spot;
pub use pareto::{ActiveMetrics, dominates, pareto_front};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quality and size measurements of a successful trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialMetrics {
    pub vmaf: f64,
    pub vmaf_1_low: f64,
    pub vmaf_std_dev: f64,
    pub psnr: Option<f64>,
    pub ssim: Option<f64>,
    pub block_score: Option<f64>,
    pub size_mb: f64,
    /// VMAF points per megabyte.
    pub efficiency: f64,
}

impl TrialMetrics {
    /// `vmaf / size_mb`, or 0 for an empty output.
    pub fn compute_efficiency(vmaf: f64, size_mb: f64) -> f64 {
        if size_mb > 0.0 { vmaf / size_mb } else { 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TrialStatus {
    Success(TrialMetrics),
    Error { message: String },
}

/// One (preset, quality value) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub preset: String,
    pub quality: u32,
    #[serde(flatten)]
    pub status: TrialStatus,
    /// Free-form output collected from the service.
    pub log: String,
}

impl Trial {
    pub fn success(preset: impl Into<String>, quality: u32, metrics: TrialMetrics) -> Self {
        Self {
            preset: preset.into(),
            quality,
            status: TrialStatus::Success(metrics),
            log: String::new(),
        }
    }

    pub fn failure(preset: impl Into<String>, quality: u32, message: impl Into<String>) -> Self {
        Self {
            preset: preset.into(),
            quality,
            status: TrialStatus::Error {
                message: message.into(),
            },
            log: String::new(),
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    pub fn metrics(&self) -> Option<&TrialMetrics> {
        match &self.status {
            TrialStatus::Success(metrics) => Some(metrics),
            TrialStatus::Error { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.metrics().is_some()
    }

    pub fn vmaf(&self) -> Option<f64> {
        self.metrics().map(|m| m.vmaf)
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            TrialStatus::Error { message } => Some(message),
            TrialStatus::Success(_) => None,
        }
    }
}

/// What a trial invocation produced: a trial (successful or failed), or
/// nothing because the run was cancelled while it was in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Completed(Trial),
    Cancelled,
}

/// Index of a trial inside its `ResultSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialId(pub usize);

/// Run-wide, append-only trial collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    trials: Vec<Trial>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trial: Trial) -> TrialId {
        self.trials.push(trial);
        TrialId(self.trials.len() - 1)
    }

    pub fn get(&self, id: TrialId) -> Option<&Trial> {
        self.trials.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrialId, &Trial)> {
        self.trials.iter().enumerate().map(|(i, t)| (TrialId(i), t))
    }

    pub fn successful(&self) -> impl Iterator<Item = (TrialId, &Trial)> {
        self.iter().filter(|(_, t)| t.is_success())
    }

    pub fn failed_count(&self) -> usize {
        self.trials.iter().filter(|t| !t.is_success()).count()
    }

    /// Builds the derived front / sweet spot / per-preset view.
    pub fn analyze(&self, metrics: &ActiveMetrics, preset_order: &[&str]) -> AnalysisReport {
        let front = pareto_front(&self.trials, metrics, preset_order);
        let sweet_spot = sweet_spot(&self.trials, &front);

        let mut best_per_preset: BTreeMap<String, TrialId> = BTreeMap::new();
        for (id, trial) in self.successful() {
            let efficiency = trial.metrics().map_or(0.0, |m| m.efficiency);
            let better = match best_per_preset.get(&trial.preset) {
                Some(current) => self
                    .get(*current)
                    .and_then(Trial::metrics)
                    .is_none_or(|m| efficiency > m.efficiency),
                None => true,
            };
            if better {
                best_per_preset.insert(trial.preset.clone(), id);
            }
        }

        AnalysisReport {
            front,
            sweet_spot,
            best_per_preset,
        }
    }
}

impl From<Vec<Trial>> for ResultSet {
    fn from(trials: Vec<Trial>) -> Self {
        Self { trials }
    }
}

/// Derived view over a `ResultSet`; recompute whenever the set changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub front: Vec<TrialId>,
    pub sweet_spot: Option<TrialId>,
    /// Most efficient successful trial of every preset.
    pub best_per_preset: BTreeMap<String, TrialId>,
}
