//! Configuration structures and constants for the sweetspot-core library.
//!
//! Three sections cover the three stages of an optimization run: scene
//! analysis, the per-preset quality search and trial orchestration. Every
//! field has a default, so callers only override what they care about,
//! either through `OptimizerConfigBuilder` or by loading a JSON file.

mod builder;

use crate::error::{CoreError, CoreResult};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use builder::OptimizerConfigBuilder;

// Default constants

/// Minimum number of per-second entries before outlier removal is attempted.
pub const DEFAULT_OUTLIER_MIN_SAMPLES: usize = 10;

/// Lower percentile used as Q1 for IQR trimming.
pub const DEFAULT_Q1_PERCENTILE: f64 = 0.15;

/// Upper percentile used as Q3 for IQR trimming.
pub const DEFAULT_Q3_PERCENTILE: f64 = 0.85;

/// IQR multiplier `k` for the `[Q1 - k*IQR, Q3 + k*IQR]` bounds.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 3.0;

/// Keyframes shared between neighbouring parallel probe intervals.
pub const DEFAULT_KEYFRAME_OVERLAP: usize = 2;

/// Frames buffered before being folded into the per-second map during a
/// sequential probe.
pub const DEFAULT_FRAME_CHUNK_SIZE: usize = 4096;

/// Position of the last-resort window as a fraction of the source duration.
pub const DEFAULT_FALLBACK_POSITION: f64 = 1.0 / 3.0;

/// Informed probes allowed after the two range extremes.
pub const DEFAULT_SEARCH_MAX_ITERATIONS: u32 = 10;

/// Relative score delta below which interpolation is considered unreliable.
pub const DEFAULT_SEARCH_RELATIVE_TOLERANCE: f64 = 1e-3;

/// Absolute score delta below which interpolation is considered unreliable.
pub const DEFAULT_SEARCH_ABSOLUTE_TOLERANCE: f64 = 1e-2;

/// Wait between the terminate signal and the kill when cancelling.
pub const DEFAULT_TERMINATION_GRACE_MS: u64 = 2000;

/// How often the orchestrator wakes up to look at the cancellation flag.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// ETAs at or above this many seconds are not displayed.
pub const DEFAULT_ETA_CEILING_SECS: u64 = 24 * 60 * 60;

/// Probe workers used for chunked analysis: one core is left for the rest of
/// the system.
pub fn default_probe_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Scene complexity analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub outlier_min_samples: usize,
    pub q1_percentile: f64,
    pub q3_percentile: f64,
    pub iqr_multiplier: f64,
    pub keyframe_overlap: usize,
    pub frame_chunk_size: usize,
    /// Number of parallel probe workers; `None` means CPU count - 1.
    pub probe_workers: Option<usize>,
    pub fallback_position: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            outlier_min_samples: DEFAULT_OUTLIER_MIN_SAMPLES,
            q1_percentile: DEFAULT_Q1_PERCENTILE,
            q3_percentile: DEFAULT_Q3_PERCENTILE,
            iqr_multiplier: DEFAULT_IQR_MULTIPLIER,
            keyframe_overlap: DEFAULT_KEYFRAME_OVERLAP,
            frame_chunk_size: DEFAULT_FRAME_CHUNK_SIZE,
            probe_workers: None,
            fallback_position: DEFAULT_FALLBACK_POSITION,
        }
    }
}

impl AnalysisConfig {
    pub fn effective_probe_workers(&self) -> usize {
        self.probe_workers.unwrap_or_else(default_probe_workers).max(1)
    }

    pub fn validate(&self) -> CoreResult<()> {
        let percentile_ok = |p: f64| (0.0..=1.0).contains(&p);
        if !percentile_ok(self.q1_percentile) || !percentile_ok(self.q3_percentile) {
            return Err(CoreError::Config(format!(
                "percentiles must lie in [0, 1] (q1={}, q3={})",
                self.q1_percentile, self.q3_percentile
            )));
        }
        if self.q1_percentile >= self.q3_percentile {
            return Err(CoreError::Config(format!(
                "q1 percentile {} must be below q3 percentile {}",
                self.q1_percentile, self.q3_percentile
            )));
        }
        if !(self.iqr_multiplier.is_finite() && self.iqr_multiplier >= 0.0) {
            return Err(CoreError::Config(format!(
                "IQR multiplier must be a non-negative number, got {}",
                self.iqr_multiplier
            )));
        }
        if self.frame_chunk_size == 0 {
            return Err(CoreError::Config("frame chunk size must be positive".into()));
        }
        if self.probe_workers == Some(0) {
            return Err(CoreError::Config("probe worker count must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.fallback_position) {
            return Err(CoreError::Config(format!(
                "fallback position must lie in [0, 1), got {}",
                self.fallback_position
            )));
        }
        Ok(())
    }
}

/// Target-quality search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_iterations: u32,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_SEARCH_MAX_ITERATIONS,
            relative_tolerance: DEFAULT_SEARCH_RELATIVE_TOLERANCE,
            absolute_tolerance: DEFAULT_SEARCH_ABSOLUTE_TOLERANCE,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_iterations == 0 {
            return Err(CoreError::Config("search max_iterations must be at least 1".into()));
        }
        if self.relative_tolerance < 0.0 || self.absolute_tolerance < 0.0 {
            return Err(CoreError::Config("search tolerances must not be negative".into()));
        }
        Ok(())
    }
}

/// Trial orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Requested parallel jobs before hardware/vendor capping.
    pub parallel_jobs: usize,
    pub termination_grace_ms: u64,
    pub poll_interval_ms: u64,
    pub eta_ceiling_secs: u64,
    /// Root under which per-trial work directories are created.
    pub work_dir: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_jobs: 1,
            termination_grace_ms: DEFAULT_TERMINATION_GRACE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            eta_ceiling_secs: DEFAULT_ETA_CEILING_SECS,
            work_dir: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn eta_ceiling(&self) -> Duration {
        Duration::from_secs(self.eta_ceiling_secs)
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.parallel_jobs == 0 {
            return Err(CoreError::Config("parallel job count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub analysis: AnalysisConfig,
    pub search: SearchConfig,
    pub orchestrator: OrchestratorConfig,
}

impl OptimizerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        self.analysis.validate()?;
        self.search.validate()?;
        self.orchestrator.validate()
    }

    /// Loads a (possibly partial) JSON configuration file. Missing fields take
    /// their defaults.
    pub fn from_json_file(path: &Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: OptimizerConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = OptimizerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.analysis.outlier_min_samples, 10);
        assert_eq!(config.analysis.q1_percentile, 0.15);
        assert_eq!(config.analysis.q3_percentile, 0.85);
        assert_eq!(config.analysis.iqr_multiplier, 3.0);
        assert_eq!(config.analysis.keyframe_overlap, 2);
        assert_eq!(config.search.max_iterations, 10);
        assert!(config.analysis.effective_probe_workers() >= 1);
    }

    #[test]
    fn test_inverted_percentiles_rejected() {
        let config = AnalysisConfig {
            q1_percentile: 0.9,
            q3_percentile: 0.1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_zero_parallel_jobs_rejected() {
        let config = OrchestratorConfig {
            parallel_jobs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_search_iterations_rejected() {
        let config = SearchConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
        assert!(SearchConfig { max_iterations: 1, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweetspot.json");
        std::fs::write(&path, r#"{ "search": { "max_iterations": 4 }, "orchestrator": { "parallel_jobs": 3 } }"#)
            .unwrap();

        let config = OptimizerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.search.max_iterations, 4);
        assert_eq!(config.orchestrator.parallel_jobs, 3);
        assert_eq!(config.analysis, AnalysisConfig::default());
        assert_eq!(config.search.absolute_tolerance, DEFAULT_SEARCH_ABSOLUTE_TOLERANCE);
    }
}
