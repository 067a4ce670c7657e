//! Scene complexity analysis.
//!
//! Finds a representative sample window in a source by aggregating per-second
//! frame sizes and looking for the most (or least) demanding stretch. The
//! window is what every encoder trial of an optimization run is evaluated on.

pub mod frame_map;
pub mod scene;

pub use frame_map::{FrameSizeMap, WindowPick};
pub use scene::{SceneComplexityAnalyzer, partition_keyframes};

use crate::error::{CoreError, CoreResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether to look for the heaviest or the lightest part of the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityMode {
    #[default]
    MostComplex,
    LeastComplex,
}

impl ComplexityMode {
    /// Strict comparison: equal scores never replace an earlier candidate.
    pub fn is_better(self, candidate: u64, current: u64) -> bool {
        match self {
            ComplexityMode::MostComplex => candidate > current,
            ComplexityMode::LeastComplex => candidate < current,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMethod {
    /// Extreme single second, window centred on it.
    SinglePoint,
    /// Extreme sum over a window of consecutive seconds.
    #[default]
    SlidingWindow,
}

/// How frame data is gathered from the prober.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionStrategy {
    /// One probe over the whole source.
    Sequential,
    /// Keyframe-partitioned probes on a worker pool, falling back to
    /// `Sequential` when that yields nothing.
    #[default]
    Parallel,
}

impl fmt::Display for AcquisitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionStrategy::Sequential => write!(f, "sequential"),
            AcquisitionStrategy::Parallel => write!(f, "parallel"),
        }
    }
}

/// A span of the source, in seconds.
///
/// Always satisfies `0 <= start`, `duration > 0` and
/// `start + duration <= source duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleWindow {
    pub start: f64,
    pub duration: f64,
}

impl SampleWindow {
    /// Validates a caller-supplied window against the source duration.
    pub fn new(start: f64, duration: f64, source_duration: f64) -> CoreResult<Self> {
        if !(start.is_finite() && duration.is_finite()) {
            return Err(CoreError::InvalidWindow(format!(
                "non-finite window {start}+{duration}"
            )));
        }
        if duration <= 0.0 {
            return Err(CoreError::InvalidWindow(format!(
                "duration must be positive, got {duration}"
            )));
        }
        if start < 0.0 {
            return Err(CoreError::InvalidWindow(format!(
                "start must not be negative, got {start}"
            )));
        }
        if start + duration > source_duration {
            return Err(CoreError::InvalidWindow(format!(
                "{start:.3}s + {duration:.3}s exceeds source duration {source_duration:.3}s"
            )));
        }
        Ok(Self { start, duration })
    }

    /// Fits a requested window into the source: the duration is capped at
    /// the source duration and the start shifted to keep the span inside it.
    pub fn clamped(start: f64, duration: f64, source_duration: f64) -> CoreResult<Self> {
        if !(source_duration.is_finite() && source_duration > 0.0) {
            return Err(CoreError::InvalidWindow(format!(
                "source duration must be positive, got {source_duration}"
            )));
        }
        if !(duration.is_finite() && duration > 0.0) {
            return Err(CoreError::InvalidWindow(format!(
                "duration must be positive, got {duration}"
            )));
        }
        let duration = duration.min(source_duration);
        let latest_start = source_duration - duration;
        let start = if start.is_finite() {
            start.clamp(0.0, latest_start)
        } else {
            0.0
        };
        Ok(Self { start, duration })
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

impl fmt::Display for SampleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}s-{:.2}s", self.start, self.end())
    }
}

/// Where a selected window came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WindowSource {
    /// Chosen from probed frame data gathered with `strategy`.
    Analysis { strategy: AcquisitionStrategy },
    /// Probing produced no data; fixed position in the source.
    Heuristic,
}

/// Result of a scene complexity analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowSelection {
    pub window: SampleWindow,
    /// Analysis target in source seconds (see `WindowPick::target`).
    pub target: f64,
    pub source: WindowSource,
    /// Seconds of frame data that survived preparation.
    pub analyzed_seconds: usize,
}

impl WindowSelection {
    pub fn is_heuristic(&self) -> bool {
        self.source == WindowSource::Heuristic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_validation() {
        assert!(SampleWindow::new(0.0, 10.0, 10.0).is_ok());
        assert!(SampleWindow::new(-1.0, 5.0, 10.0).is_err());
        assert!(SampleWindow::new(6.0, 5.0, 10.0).is_err());
        assert!(SampleWindow::new(1.0, 0.0, 10.0).is_err());
    }

    #[test]
    fn test_clamped_fits_inside_source() {
        let w = SampleWindow::clamped(-3.0, 10.0, 100.0).unwrap();
        assert_eq!((w.start, w.duration), (0.0, 10.0));

        let w = SampleWindow::clamped(95.0, 10.0, 100.0).unwrap();
        assert_eq!((w.start, w.duration), (90.0, 10.0));

        let w = SampleWindow::clamped(5.0, 300.0, 100.0).unwrap();
        assert_eq!((w.start, w.duration), (0.0, 100.0));

        assert!(SampleWindow::clamped(0.0, 10.0, 0.0).is_err());
    }

    #[test]
    fn test_mode_comparison_is_strict() {
        assert!(ComplexityMode::MostComplex.is_better(2, 1));
        assert!(!ComplexityMode::MostComplex.is_better(1, 1));
        assert!(ComplexityMode::LeastComplex.is_better(1, 2));
        assert!(!ComplexityMode::LeastComplex.is_better(2, 2));
    }
}
