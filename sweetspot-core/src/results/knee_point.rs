// ============================================================================
// sweetspot-core/src/results/knee_point.rs
// ============================================================================
//
// KNEE POINT ANALYSIS: Sweet Spot Selection on the Pareto Front
//
// The sweet spot is the knee of the quality/size curve: with front members
// sorted by size, draw the chord between the smallest and the largest file
// in (size MB, VMAF) space and pick the member farthest from it.

use super::{Trial, TrialId};

/// Fewest front members for which a knee is meaningful.
pub const MIN_FRONT_FOR_SWEET_SPOT: usize = 3;

/// Perpendicular distance from `(x, y)` to the line through `start`/`end`.
fn distance_to_chord(start: (f64, f64), end: (f64, f64), x: f64, y: f64) -> f64 {
    let (x1, y1) = start;
    let (x2, y2) = end;
    let dx = x2 - x1;
    let dy = y2 - y1;
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        // Degenerate chord: distance to the single point.
        return ((x - x1).powi(2) + (y - y1).powi(2)).sqrt();
    }
    (dy * x - dx * y + x2 * y1 - y2 * x1).abs() / length
}

/// Picks the sweet spot among `front` (ids into `trials`).
///
/// Returns `None` for fronts with fewer than three successful members. The
/// chord endpoints have zero distance and are not candidates; ties go to the
/// smaller file.
pub fn sweet_spot(trials: &[Trial], front: &[TrialId]) -> Option<TrialId> {
    let mut points: Vec<(TrialId, f64, f64)> = front
        .iter()
        .filter_map(|id| {
            let metrics = trials.get(id.0)?.metrics()?;
            Some((*id, metrics.size_mb, metrics.vmaf))
        })
        .collect();

    if points.len() < MIN_FRONT_FOR_SWEET_SPOT {
        log::debug!(
            "Front has {} member(s); no sweet spot reported",
            points.len()
        );
        return None;
    }

    points.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let first = points[0];
    let last = points[points.len() - 1];
    let start = (first.1, first.2);
    let end = (last.1, last.2);

    let mut best: Option<(TrialId, f64)> = None;
    for &(id, size, vmaf) in &points[1..points.len() - 1] {
        let distance = distance_to_chord(start, end, size, vmaf);
        match best {
            Some((_, best_distance)) if distance <= best_distance => {}
            _ => best = Some((id, distance)),
        }
    }

    if let Some((id, distance)) = best {
        log::debug!("Sweet spot {:?} at distance {:.4} from the front chord", id, distance);
    }
    best.map(|(id, _)| id)
}
