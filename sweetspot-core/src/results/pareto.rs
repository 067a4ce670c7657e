// ============================================================================
// sweetspot-core/src/results/pareto.rs
// ============================================================================
//
// PARETO FRONT: Multi-Objective Dominance Over Trial Results
//
// Higher is better: VMAF, VMAF 1% low, and PSNR / SSIM when enabled.
// Lower is better: file size, and block score when enabled.
//
// B dominates A when B is at least as good on every active metric and
// strictly better on one. When every active metric ties, the faster preset
// (lower index in the codec's preset ordering) wins; presets missing from the
// ordering, or equal presets, do not dominate each other.
//
// Pairwise O(n^2) comparison; result sets are tens to low hundreds of trials.

use super::{Trial, TrialId, TrialMetrics};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Optional metrics that take part in dominance checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMetrics {
    pub psnr: bool,
    pub ssim: bool,
    pub block_score: bool,
}

impl ActiveMetrics {
    pub fn all() -> Self {
        Self {
            psnr: true,
            ssim: true,
            block_score: true,
        }
    }
}

enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// (direction, a, b) for every active metric. Missing optional values compare
/// as equal so that a service omitting a metric cannot create dominance.
fn objective_pairs(a: &TrialMetrics, b: &TrialMetrics, active: &ActiveMetrics) -> Vec<(Direction, f64, f64)> {
    let mut pairs = vec![
        (Direction::HigherIsBetter, a.vmaf, b.vmaf),
        (Direction::HigherIsBetter, a.vmaf_1_low, b.vmaf_1_low),
        (Direction::LowerIsBetter, a.size_mb, b.size_mb),
    ];
    let optional = [
        (active.psnr, Direction::HigherIsBetter, a.psnr, b.psnr),
        (active.ssim, Direction::HigherIsBetter, a.ssim, b.ssim),
        (active.block_score, Direction::LowerIsBetter, a.block_score, b.block_score),
    ];
    for (enabled, direction, va, vb) in optional {
        if let (true, Some(va), Some(vb)) = (enabled, va, vb) {
            pairs.push((direction, va, vb));
        }
    }
    pairs
}

/// Compares `b` against `a` on one objective: `Greater` when `b` is better.
fn compare(direction: &Direction, a: f64, b: f64) -> Ordering {
    let ord = b.partial_cmp(&a).unwrap_or(Ordering::Equal);
    match direction {
        Direction::HigherIsBetter => ord,
        Direction::LowerIsBetter => ord.reverse(),
    }
}

/// Returns true when trial `b` dominates trial `a`.
///
/// Failed trials never dominate and are never dominated.
pub fn dominates(b: &Trial, a: &Trial, active: &ActiveMetrics, preset_order: &[&str]) -> bool {
    let (Some(mb), Some(ma)) = (b.metrics(), a.metrics()) else {
        return false;
    };

    let mut strictly_better = false;
    for (direction, va, vb) in objective_pairs(ma, mb, active) {
        match compare(&direction, va, vb) {
            Ordering::Less => return false,
            Ordering::Greater => strictly_better = true,
            Ordering::Equal => {}
        }
    }
    if strictly_better {
        return true;
    }

    // Exact tie on every metric: the faster preset is better.
    let rank = |preset: &str| preset_order.iter().position(|p| *p == preset);
    match (rank(&b.preset), rank(&a.preset)) {
        (Some(rb), Some(ra)) => rb < ra,
        _ => false,
    }
}

/// Non-dominated successful trials, in input order.
pub fn pareto_front(trials: &[Trial], active: &ActiveMetrics, preset_order: &[&str]) -> Vec<TrialId> {
    let candidates: Vec<(usize, &Trial)> = trials
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_success())
        .collect();

    let front: Vec<TrialId> = candidates
        .iter()
        .filter(|(i, a)| {
            !candidates
                .iter()
                .any(|(j, b)| i != j && dominates(b, a, active, preset_order))
        })
        .map(|(i, _)| TrialId(*i))
        .collect();

    log::debug!(
        "Pareto front: {} of {} successful trial(s)",
        front.len(),
        candidates.len()
    );
    front
}
