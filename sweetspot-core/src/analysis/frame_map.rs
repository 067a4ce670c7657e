// ============================================================================
// sweetspot-core/src/analysis/frame_map.rs
// ============================================================================
//
// FRAME SIZE MAP: Per-Second Byte Totals
//
// Frames are bucketed by the integer second of their timestamp. Before any
// analysis the map is renormalised so its smallest second is 0 (streams may
// carry a non-zero base timestamp), empty seconds are dropped and IQR outlier
// trimming is applied.

use super::{ComplexityMode, WindowMethod};
use crate::config::AnalysisConfig;
use crate::external::FrameSample;

use std::collections::BTreeMap;

/// Result of windowing a `FrameSizeMap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPick {
    /// Start of the selected span, in normalised seconds.
    pub start: f64,
    /// Analysis target: the extreme second for single-point picks, the
    /// window midpoint for sliding-window picks.
    pub target: f64,
    /// Byte total of the selected second or window.
    pub score: u64,
}

/// Mapping from second index to the total byte size of that second.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSizeMap {
    seconds: BTreeMap<i64, u64>,
}

impl FrameSizeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I: IntoIterator<Item = (i64, u64)>>(entries: I) -> Self {
        let mut map = Self::new();
        for (second, size) in entries {
            *map.seconds.entry(second).or_insert(0) += size;
        }
        map
    }

    pub fn add_frame(&mut self, frame: &FrameSample) {
        let second = frame.timestamp.floor() as i64;
        *self.seconds.entry(second).or_insert(0) += frame.size;
    }

    pub fn extend_frames(&mut self, frames: &[FrameSample]) {
        for frame in frames {
            self.add_frame(frame);
        }
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }

    pub fn get(&self, second: i64) -> Option<u64> {
        self.seconds.get(&second).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.seconds.iter().map(|(k, v)| (*k, *v))
    }

    /// Shifts keys so the smallest becomes 0 and returns the applied offset.
    /// Normalising an already normalised map is a no-op.
    pub fn normalize_offsets(&mut self) -> i64 {
        let Some(&offset) = self.seconds.keys().next() else {
            return 0;
        };
        if offset != 0 {
            log::debug!("Normalising frame map by {} second(s)", offset);
            self.seconds = std::mem::take(&mut self.seconds)
                .into_iter()
                .map(|(k, v)| (k - offset, v))
                .collect();
        }
        offset
    }

    /// Drops seconds whose byte total is zero.
    pub fn discard_empty(&mut self) {
        self.seconds.retain(|_, size| *size > 0);
    }

    /// IQR trimming. Returns the number of removed entries.
    ///
    /// Skipped when the map is not larger than `outlier_min_samples`, when
    /// the IQR is zero, or when trimming would remove everything.
    pub fn remove_outliers(&mut self, config: &AnalysisConfig) -> usize {
        if self.seconds.len() <= config.outlier_min_samples {
            return 0;
        }

        let mut values: Vec<u64> = self.seconds.values().copied().collect();
        values.sort_unstable();
        let q1 = percentile(&values, config.q1_percentile);
        let q3 = percentile(&values, config.q3_percentile);
        let iqr = q3 - q1;
        if iqr <= 0.0 {
            log::debug!("IQR is zero; skipping outlier removal");
            return 0;
        }

        let lower = q1 - config.iqr_multiplier * iqr;
        let upper = q3 + config.iqr_multiplier * iqr;
        let kept: BTreeMap<i64, u64> = self
            .seconds
            .iter()
            .filter(|(_, size)| {
                let size = **size as f64;
                size >= lower && size <= upper
            })
            .map(|(k, v)| (*k, *v))
            .collect();

        if kept.is_empty() {
            log::warn!("Outlier removal would empty the frame map; keeping original data");
            return 0;
        }

        let removed = self.seconds.len() - kept.len();
        if removed > 0 {
            log::debug!(
                "Removed {} outlier second(s) outside [{:.0}, {:.0}]",
                removed,
                lower,
                upper
            );
        }
        self.seconds = kept;
        removed
    }

    /// Normalises, drops empty seconds and trims outliers, in that order.
    pub fn prepare(&mut self, config: &AnalysisConfig) {
        self.normalize_offsets();
        self.discard_empty();
        self.remove_outliers(config);
    }

    /// Finds the most or least complex second / window.
    ///
    /// Ties resolve to the earliest candidate. Returns `None` on an empty map.
    pub fn find_window(
        &self,
        duration: f64,
        mode: ComplexityMode,
        method: WindowMethod,
    ) -> Option<WindowPick> {
        match method {
            WindowMethod::SinglePoint => self.single_point(mode),
            WindowMethod::SlidingWindow => self.sliding_window(duration, mode),
        }
    }

    fn single_point(&self, mode: ComplexityMode) -> Option<WindowPick> {
        let mut best: Option<(i64, u64)> = None;
        for (second, size) in self.iter() {
            if best.is_none_or(|(_, current)| mode.is_better(size, current)) {
                best = Some((second, size));
            }
        }
        best.map(|(second, size)| WindowPick {
            start: second as f64,
            target: second as f64,
            score: size,
        })
    }

    /// Sums `duration`-wide runs of consecutive entries, sliding one entry at
    /// a time with an incremental add/remove.
    fn sliding_window(&self, duration: f64, mode: ComplexityMode) -> Option<WindowPick> {
        let entries: Vec<(i64, u64)> = self.iter().collect();
        if entries.is_empty() {
            return None;
        }

        let width = (duration.round() as usize).clamp(1, entries.len());
        let mut sum: u64 = entries[..width].iter().map(|(_, size)| size).sum();
        let mut best_index = 0;
        let mut best_sum = sum;

        for i in 1..=entries.len() - width {
            sum = sum - entries[i - 1].1 + entries[i + width - 1].1;
            if mode.is_better(sum, best_sum) {
                best_sum = sum;
                best_index = i;
            }
        }

        let start = entries[best_index].0 as f64;
        Some(WindowPick {
            start,
            target: start + duration / 2.0,
            score: best_sum,
        })
    }
}

/// Linear-interpolated percentile over ascending `sorted` values.
pub fn percentile(sorted: &[u64], fraction: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0] as f64,
        len => {
            let rank = fraction.clamp(0.0, 1.0) * (len - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let low = sorted[lower] as f64;
            let high = sorted[upper] as f64;
            low + (high - low) * (rank - lower as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::FrameKind;

    fn frame(timestamp: f64, size: u64) -> FrameSample {
        FrameSample::new(timestamp, size, FrameKind::Delta)
    }

    #[test]
    fn test_frames_bucket_by_second() {
        let mut map = FrameSizeMap::new();
        map.extend_frames(&[frame(0.0, 10), frame(0.5, 5), frame(1.2, 7), frame(3.99, 1)]);
        assert_eq!(map.get(0), Some(15));
        assert_eq!(map.get(1), Some(7));
        assert_eq!(map.get(2), None);
        assert_eq!(map.get(3), Some(1));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut map = FrameSizeMap::from_entries([(600, 5), (601, 7), (603, 2)]);
        assert_eq!(map.normalize_offsets(), 600);
        let once = map.clone();
        assert_eq!(map.normalize_offsets(), 0);
        assert_eq!(map, once);
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 5), (1, 7), (3, 2)]);
    }

    #[test]
    fn test_normalize_negative_base() {
        let mut map = FrameSizeMap::from_entries([(-2, 5), (0, 7)]);
        map.normalize_offsets();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 5), (2, 7)]);
    }

    #[test]
    fn test_equal_values_keep_everything() {
        let mut map = FrameSizeMap::from_entries((0..20).map(|s| (s, 500)));
        assert_eq!(map.remove_outliers(&AnalysisConfig::default()), 0);
        assert_eq!(map.len(), 20);
    }

    #[test]
    fn test_spike_removed() {
        let mut entries: Vec<(i64, u64)> = (0..20).map(|s| (s, 1000 + (s as u64 % 5) * 10)).collect();
        entries.push((20, 1_000_000));
        let mut map = FrameSizeMap::from_entries(entries);
        assert_eq!(map.remove_outliers(&AnalysisConfig::default()), 1);
        assert_eq!(map.get(20), None);
    }

    #[test]
    fn test_small_maps_untouched() {
        let mut map = FrameSizeMap::from_entries([(0, 1), (1, 1), (2, 1_000_000)]);
        assert_eq!(map.remove_outliers(&AnalysisConfig::default()), 0);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [10, 20, 30, 40, 50];
        assert_eq!(percentile(&values, 0.0), 10.0);
        assert_eq!(percentile(&values, 0.5), 30.0);
        assert_eq!(percentile(&values, 0.125), 15.0);
        assert_eq!(percentile(&values, 1.0), 50.0);
    }

    #[test]
    fn test_sliding_window_most_complex() {
        let map = FrameSizeMap::from_entries([(0, 10), (1, 100), (2, 100), (3, 10)]);
        let pick = map
            .find_window(2.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(pick.start, 1.0);
        assert_eq!(pick.target, 2.0);
        assert_eq!(pick.score, 200);
    }

    #[test]
    fn test_sliding_window_least_complex() {
        let map = FrameSizeMap::from_entries([(0, 50), (1, 5), (2, 5), (3, 50), (4, 1)]);
        let pick = map
            .find_window(2.0, ComplexityMode::LeastComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(pick.start, 1.0);
        assert_eq!(pick.score, 10);
    }

    #[test]
    fn test_window_wider_than_map() {
        let map = FrameSizeMap::from_entries([(0, 3), (1, 4)]);
        let pick = map
            .find_window(30.0, ComplexityMode::MostComplex, WindowMethod::SlidingWindow)
            .unwrap();
        assert_eq!(pick.start, 0.0);
        assert_eq!(pick.score, 7);
    }

    #[test]
    fn test_single_point_extremes() {
        let map = FrameSizeMap::from_entries([(0, 10), (1, 90), (2, 90), (3, 2)]);
        let most = map
            .find_window(4.0, ComplexityMode::MostComplex, WindowMethod::SinglePoint)
            .unwrap();
        assert_eq!(most.target, 1.0);
        let least = map
            .find_window(4.0, ComplexityMode::LeastComplex, WindowMethod::SinglePoint)
            .unwrap();
        assert_eq!(least.target, 3.0);
        assert!(FrameSizeMap::new()
            .find_window(4.0, ComplexityMode::MostComplex, WindowMethod::SinglePoint)
            .is_none());
    }
}
