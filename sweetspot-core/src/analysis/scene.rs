// ============================================================================
// sweetspot-core/src/analysis/scene.rs
// ============================================================================
//
// SCENE COMPLEXITY ANALYZER: Representative Sample Window Selection
//
// Frame data is acquired either with one sequential probe over the whole
// source, or with a keyframe index pass followed by overlapping interval
// probes on a rayon pool whose results are merged and de-duplicated.
//
// Failure ladder: parallel -> sequential -> heuristic window. Individual
// probe failures are logged and treated as "no data". Cancellation is the one
// condition that is never swallowed.

use super::frame_map::FrameSizeMap;
use super::{
    AcquisitionStrategy, ComplexityMode, SampleWindow, WindowMethod, WindowSelection,
    WindowSource,
};
use crate::config::AnalysisConfig;
use crate::error::{CoreError, CoreResult};
use crate::external::{FrameProber, FrameSample, ProbeInterval, collect_frames};
use crate::util::CancellationToken;

use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;

/// Splits a keyframe timeline into `workers` contiguous probe intervals that
/// overlap their neighbours by `overlap` keyframes.
///
/// The first interval is open at the start and the last one at the end, so
/// the whole source is covered. Returns `None` when there are fewer than two
/// keyframes per worker or fewer than two workers.
pub fn partition_keyframes(
    keyframes: &[f64],
    workers: usize,
    overlap: usize,
) -> Option<Vec<ProbeInterval>> {
    let count = keyframes.len();
    if workers < 2 || count < workers * 2 {
        return None;
    }

    let intervals = (0..workers)
        .map(|i| {
            let start_idx = i * count / workers;
            let end_idx = (i + 1) * count / workers;
            let start = (i > 0).then(|| keyframes[start_idx.saturating_sub(overlap)]);
            let end = (i + 1 < workers).then(|| keyframes[(end_idx + overlap).min(count - 1)]);
            ProbeInterval::between(start, end)
        })
        .collect();
    Some(intervals)
}

/// Finds sample windows in a source using a `FrameProber`.
pub struct SceneComplexityAnalyzer<'a, P: FrameProber + ?Sized> {
    prober: &'a P,
    config: AnalysisConfig,
    strategy: AcquisitionStrategy,
    cancel: CancellationToken,
}

impl<'a, P: FrameProber + ?Sized> SceneComplexityAnalyzer<'a, P> {
    pub fn new(prober: &'a P, config: AnalysisConfig) -> Self {
        Self {
            prober,
            config,
            strategy: AcquisitionStrategy::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: AcquisitionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Selects a `duration`-second window of the requested complexity.
    ///
    /// Only a failure to read the source duration, an invalid duration or
    /// cancellation is reported as an error. Everything else degrades to a
    /// heuristic window.
    pub fn find_window(
        &self,
        source: &Path,
        duration: f64,
        mode: ComplexityMode,
        method: WindowMethod,
    ) -> CoreResult<WindowSelection> {
        self.check_cancelled()?;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(CoreError::InvalidWindow(format!(
                "sample duration must be positive, got {duration}"
            )));
        }

        let source_duration = self.prober.source_duration(source)?;
        log::info!(
            "Analyzing {} ({:.1}s) for a {:.1}s {:?} window ({:?}, {})",
            source.display(),
            source_duration,
            duration,
            mode,
            method,
            self.strategy
        );

        let (mut map, strategy) = self.acquire(source)?;
        map.prepare(&self.config);

        let Some(pick) = map.find_window(duration, mode, method) else {
            log::warn!(
                "No usable frame data for {}; using heuristic window",
                source.display()
            );
            return self.heuristic(source_duration, duration);
        };

        let start = match method {
            WindowMethod::SinglePoint => pick.target - duration / 2.0,
            WindowMethod::SlidingWindow => pick.start,
        };
        let window = SampleWindow::clamped(start, duration, source_duration)?;
        log::info!(
            "Selected window {} (target {:.1}s, score {} bytes)",
            window,
            pick.target,
            pick.score
        );

        Ok(WindowSelection {
            window,
            target: pick.target,
            source: WindowSource::Analysis { strategy },
            analyzed_seconds: map.len(),
        })
    }

    /// Builds the raw frame map with the configured strategy, falling back
    /// to a sequential pass when parallel acquisition yields nothing.
    fn acquire(&self, source: &Path) -> CoreResult<(FrameSizeMap, AcquisitionStrategy)> {
        if self.strategy == AcquisitionStrategy::Parallel {
            if let Some(map) = self.acquire_parallel(source)? {
                return Ok((map, AcquisitionStrategy::Parallel));
            }
            log::info!("Falling back to sequential frame analysis");
        }

        match self.acquire_sequential(source) {
            Ok(map) => Ok((map, AcquisitionStrategy::Sequential)),
            Err(CoreError::Cancelled) => Err(CoreError::Cancelled),
            Err(err) => {
                log::warn!("Sequential probe of {} failed: {}", source.display(), err);
                Ok((FrameSizeMap::new(), AcquisitionStrategy::Sequential))
            }
        }
    }

    /// Whole-source probe, folded into the map in bounded chunks.
    fn acquire_sequential(&self, source: &Path) -> CoreResult<FrameSizeMap> {
        let chunk_size = self.config.frame_chunk_size.max(1);
        let mut map = FrameSizeMap::new();
        let mut chunk: Vec<FrameSample> = Vec::with_capacity(chunk_size);

        self.prober
            .probe_frames(source, &ProbeInterval::whole(), &mut |frame| {
                chunk.push(frame);
                if chunk.len() >= chunk_size {
                    map.extend_frames(&chunk);
                    chunk.clear();
                }
            })?;
        map.extend_frames(&chunk);
        self.check_cancelled()?;

        log::debug!("Sequential probe produced {} second(s) of data", map.len());
        Ok(map)
    }

    /// Keyframe-partitioned probing. `Ok(None)` means "use sequential".
    fn acquire_parallel(&self, source: &Path) -> CoreResult<Option<FrameSizeMap>> {
        let workers = self.config.effective_probe_workers();

        let keyframes = match self.prober.keyframe_timestamps(source) {
            Ok(keyframes) => keyframes,
            Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
            Err(err) => {
                log::warn!("Keyframe index pass failed: {}", err);
                return Ok(None);
            }
        };

        let Some(intervals) =
            partition_keyframes(&keyframes, workers, self.config.keyframe_overlap)
        else {
            log::info!(
                "{} keyframe(s) are too sparse for {} probe worker(s)",
                keyframes.len(),
                workers
            );
            return Ok(None);
        };

        let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool,
            Err(err) => {
                log::warn!("Failed to initialize probe thread pool: {}", err);
                return Ok(None);
            }
        };

        log::debug!(
            "Probing {} interval(s) on {} worker(s)",
            intervals.len(),
            workers
        );
        let chunks: Vec<Vec<FrameSample>> = pool.install(|| {
            intervals
                .par_iter()
                .map(|interval| self.probe_interval(source, interval))
                .collect()
        });
        self.check_cancelled()?;

        let map = merge_unique_frames(&chunks);
        if map.is_empty() {
            log::warn!("Parallel probes produced no frame data");
            return Ok(None);
        }
        Ok(Some(map))
    }

    fn probe_interval(&self, source: &Path, interval: &ProbeInterval) -> Vec<FrameSample> {
        if self.cancel.is_cancelled() {
            return Vec::new();
        }
        match collect_frames(self.prober, source, interval) {
            Ok(frames) => frames,
            Err(CoreError::Cancelled) => Vec::new(),
            Err(err) => {
                log::warn!("Probe of interval {} failed: {}", interval, err);
                Vec::new()
            }
        }
    }

    fn heuristic(&self, source_duration: f64, duration: f64) -> CoreResult<WindowSelection> {
        let start = source_duration * self.config.fallback_position;
        let window = SampleWindow::clamped(start, duration, source_duration)?;
        log::info!("Using heuristic window {}", window);
        Ok(WindowSelection {
            window,
            target: window.start + window.duration / 2.0,
            source: WindowSource::Heuristic,
            analyzed_seconds: 0,
        })
    }

    fn check_cancelled(&self) -> CoreResult<()> {
        if self.cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Merges interval probes, counting frames seen in two overlapping intervals
/// once. Frames are identified by their timestamp at microsecond precision.
fn merge_unique_frames(chunks: &[Vec<FrameSample>]) -> FrameSizeMap {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut map = FrameSizeMap::new();
    for frame in chunks.iter().flatten() {
        let key = (frame.timestamp * 1_000_000.0).round() as i64;
        if seen.insert(key) {
            map.add_frame(frame);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::FrameKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 60 seconds at 4 fps, keyframe every 2 s, heavy seconds 40..45 on a
    /// varied background so they survive IQR trimming.
    struct FakeProber {
        frames: Vec<FrameSample>,
        duration: f64,
        fail_intervals: bool,
        fail_whole: bool,
        fail_keyframes: bool,
        probe_calls: AtomicUsize,
    }

    impl FakeProber {
        fn new() -> Self {
            let mut frames = Vec::new();
            for i in 0..240 {
                let timestamp = i as f64 * 0.25;
                let second = i / 4;
                let size = if (40..45).contains(&second) {
                    5000
                } else {
                    1000 + (second % 10) * 300
                };
                let kind = if i % 8 == 0 { FrameKind::Key } else { FrameKind::Delta };
                frames.push(FrameSample::new(timestamp, size as u64, kind));
            }
            Self {
                frames,
                duration: 60.0,
                fail_intervals: false,
                fail_whole: false,
                fail_keyframes: false,
                probe_calls: AtomicUsize::new(0),
            }
        }
    }

    impl FrameProber for FakeProber {
        fn source_duration(&self, _source: &Path) -> CoreResult<f64> {
            Ok(self.duration)
        }

        fn probe_frames(
            &self,
            _source: &Path,
            interval: &ProbeInterval,
            sink: &mut dyn FnMut(FrameSample),
        ) -> CoreResult<()> {
            self.probe_calls.fetch_add(1, Ordering::SeqCst);
            if interval.is_whole() && self.fail_whole {
                return Err(CoreError::FfprobeParse("whole-file probe failed".into()));
            }
            if !interval.is_whole() && self.fail_intervals {
                return Err(CoreError::FfprobeParse("interval probe failed".into()));
            }
            for frame in &self.frames {
                let after_start = interval.start.is_none_or(|s| frame.timestamp >= s);
                let before_end = interval.end.is_none_or(|e| frame.timestamp <= e);
                if after_start && before_end {
                    sink(*frame);
                }
            }
            Ok(())
        }

        fn keyframe_timestamps(&self, _source: &Path) -> CoreResult<Vec<f64>> {
            if self.fail_keyframes {
                return Err(CoreError::FfprobeParse("no index".into()));
            }
            Ok(self
                .frames
                .iter()
                .filter(|f| f.kind == FrameKind::Key)
                .map(|f| f.timestamp)
                .collect())
        }
    }

    fn config(workers: usize) -> AnalysisConfig {
        AnalysisConfig {
            probe_workers: Some(workers),
            frame_chunk_size: 16,
            ..AnalysisConfig::default()
        }
    }

    fn source() -> &'static Path {
        Path::new("source.mkv")
    }

    #[test]
    fn test_partition_covers_timeline_with_overlap() {
        let keyframes: Vec<f64> = (0..12).map(|i| i as f64 * 2.0).collect();
        let intervals = partition_keyframes(&keyframes, 3, 2).unwrap();
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0], ProbeInterval::between(None, Some(12.0)));
        assert_eq!(intervals[1], ProbeInterval::between(Some(4.0), Some(20.0)));
        assert_eq!(intervals[2], ProbeInterval::between(Some(12.0), None));
    }

    #[test]
    fn test_partition_requires_density() {
        let keyframes = [0.0, 2.0, 4.0, 6.0, 8.0];
        assert!(partition_keyframes(&keyframes, 3, 2).is_none());
        assert!(partition_keyframes(&keyframes, 1, 2).is_none());
        assert!(partition_keyframes(&keyframes, 2, 2).is_some());
    }

    #[test]
    fn test_sequential_finds_heavy_window() {
        let prober = FakeProber::new();
        let selection = SceneComplexityAnalyzer::new(&prober, config(3))
            .with_strategy(AcquisitionStrategy::Sequential)
            .find_window(source(), 5.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(selection.window.start, 40.0);
        assert_eq!(selection.window.duration, 5.0);
        assert_eq!(selection.target, 42.5);
        assert_eq!(
            selection.source,
            WindowSource::Analysis {
                strategy: AcquisitionStrategy::Sequential
            }
        );
        assert_eq!(prober.probe_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let prober = FakeProber::new();
        let parallel = SceneComplexityAnalyzer::new(&prober, config(4))
            .find_window(source(), 5.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(prober.probe_calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            parallel.source,
            WindowSource::Analysis {
                strategy: AcquisitionStrategy::Parallel
            }
        );

        let sequential = SceneComplexityAnalyzer::new(&prober, config(4))
            .with_strategy(AcquisitionStrategy::Sequential)
            .find_window(source(), 5.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(parallel.window, sequential.window);
        assert_eq!(parallel.analyzed_seconds, sequential.analyzed_seconds);
    }

    #[test]
    fn test_overlapping_frames_counted_once() {
        let a = vec![
            FrameSample::new(0.0, 10, FrameKind::Key),
            FrameSample::new(0.5, 10, FrameKind::Delta),
        ];
        let b = vec![
            FrameSample::new(0.5, 10, FrameKind::Delta),
            FrameSample::new(1.0, 7, FrameKind::Key),
        ];
        let map = merge_unique_frames(&[a, b]);
        assert_eq!(map.get(0), Some(20));
        assert_eq!(map.get(1), Some(7));
    }

    #[test]
    fn test_failed_intervals_fall_back_to_sequential() {
        let mut prober = FakeProber::new();
        prober.fail_intervals = true;
        let selection = SceneComplexityAnalyzer::new(&prober, config(3))
            .find_window(source(), 5.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(
            selection.source,
            WindowSource::Analysis {
                strategy: AcquisitionStrategy::Sequential
            }
        );
        assert_eq!(selection.window.start, 40.0);
    }

    #[test]
    fn test_sparse_keyframes_fall_back_to_sequential() {
        let prober = FakeProber::new();
        // 30 keyframes cannot feed 20 workers two keyframes each.
        let selection = SceneComplexityAnalyzer::new(&prober, config(20))
            .find_window(source(), 5.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(prober.probe_calls.load(Ordering::SeqCst), 1);
        assert!(!selection.is_heuristic());
    }

    #[test]
    fn test_total_failure_uses_heuristic() {
        let mut prober = FakeProber::new();
        prober.fail_keyframes = true;
        prober.fail_whole = true;
        let selection = SceneComplexityAnalyzer::new(&prober, config(3))
            .find_window(source(), 6.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert!(selection.is_heuristic());
        assert_eq!(selection.window.start, 20.0);
        assert_eq!(selection.window.duration, 6.0);
    }

    #[test]
    fn test_single_point_centres_and_clamps() {
        let prober = FakeProber::new();
        let selection = SceneComplexityAnalyzer::new(&prober, config(3))
            .with_strategy(AcquisitionStrategy::Sequential)
            .find_window(source(), 4.0, ComplexityMode::MostComplex, WindowMethod::SinglePoint)
            .unwrap();
        assert_eq!(selection.target, 40.0);
        assert_eq!(selection.window.start, 38.0);

        let long = SceneComplexityAnalyzer::new(&prober, config(3))
            .with_strategy(AcquisitionStrategy::Sequential)
            .find_window(source(), 120.0, ComplexityMode::MostComplex, WindowMethod::SinglePoint)
            .unwrap();
        assert_eq!(long.window.start, 0.0);
        assert_eq!(long.window.duration, 60.0);
    }

    #[test]
    fn test_cancelled_analysis_is_an_error() {
        let prober = FakeProber::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = SceneComplexityAnalyzer::new(&prober, config(3))
            .with_cancellation(cancel)
            .find_window(source(), 5.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow);
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(prober.probe_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let prober = FakeProber::new();
        let result = SceneComplexityAnalyzer::new(&prober, config(3)).find_window(
            source(),
            0.0,
            ComplexityMode::MostComplex,
            WindowMethod::SlidingWindow,
        );
        assert!(matches!(result, Err(CoreError::InvalidWindow(_))));
    }
}
