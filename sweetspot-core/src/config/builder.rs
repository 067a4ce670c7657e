// ============================================================================
// sweetspot-core/src/config/builder.rs
// ============================================================================
//
// CONFIGURATION BUILDER: Builder Pattern for OptimizerConfig
//
// Fluent API over the three configuration sections. Unset values keep the
// defaults from `config/mod.rs`; `build` validates the result.

use std::path::PathBuf;

use super::{AnalysisConfig, OptimizerConfig, OrchestratorConfig, SearchConfig};
use crate::error::CoreResult;

/// Builder for creating OptimizerConfig instances.
///
/// # Examples
///
/// ```rust
/// use sweetspot_core::config::OptimizerConfigBuilder;
///
/// let config = OptimizerConfigBuilder::new()
///     .parallel_jobs(4)
///     .iqr_multiplier(2.5)
///     .search_max_iterations(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.orchestrator.parallel_jobs, 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct OptimizerConfigBuilder {
    analysis: AnalysisConfig,
    search: SearchConfig,
    orchestrator: OrchestratorConfig,
}

impl OptimizerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration, e.g. one loaded from disk.
    pub fn from_config(config: OptimizerConfig) -> Self {
        Self {
            analysis: config.analysis,
            search: config.search,
            orchestrator: config.orchestrator,
        }
    }

    // ---- Scene analysis ----

    /// Sets the minimum per-second entry count before outliers are trimmed.
    pub fn outlier_min_samples(mut self, count: usize) -> Self {
        self.analysis.outlier_min_samples = count;
        self
    }

    /// Sets the Q1/Q3 percentiles (fractions in `[0, 1]`).
    pub fn outlier_percentiles(mut self, q1: f64, q3: f64) -> Self {
        self.analysis.q1_percentile = q1;
        self.analysis.q3_percentile = q3;
        self
    }

    pub fn iqr_multiplier(mut self, k: f64) -> Self {
        self.analysis.iqr_multiplier = k;
        self
    }

    /// Sets how many keyframes neighbouring parallel probe intervals share.
    pub fn keyframe_overlap(mut self, keyframes: usize) -> Self {
        self.analysis.keyframe_overlap = keyframes;
        self
    }

    pub fn frame_chunk_size(mut self, frames: usize) -> Self {
        self.analysis.frame_chunk_size = frames;
        self
    }

    pub fn probe_workers(mut self, workers: usize) -> Self {
        self.analysis.probe_workers = Some(workers);
        self
    }

    // ---- Quality search ----

    pub fn search_max_iterations(mut self, iterations: u32) -> Self {
        self.search.max_iterations = iterations;
        self
    }

    /// Sets the relative and absolute score-delta tolerances that gate
    /// interpolation.
    pub fn search_tolerances(mut self, relative: f64, absolute: f64) -> Self {
        self.search.relative_tolerance = relative;
        self.search.absolute_tolerance = absolute;
        self
    }

    // ---- Orchestration ----

    pub fn parallel_jobs(mut self, jobs: usize) -> Self {
        self.orchestrator.parallel_jobs = jobs;
        self
    }

    pub fn termination_grace_ms(mut self, millis: u64) -> Self {
        self.orchestrator.termination_grace_ms = millis;
        self
    }

    pub fn poll_interval_ms(mut self, millis: u64) -> Self {
        self.orchestrator.poll_interval_ms = millis;
        self
    }

    pub fn work_dir(mut self, dir: PathBuf) -> Self {
        self.orchestrator.work_dir = Some(dir);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> CoreResult<OptimizerConfig> {
        let config = OptimizerConfig {
            analysis: self.analysis,
            search: self.search,
            orchestrator: self.orchestrator,
        };
        config.validate()?;
        Ok(config)
    }
}
