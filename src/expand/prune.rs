//! Percentile thresholds and low-weight pruning.

use ndarray::Array2;

/// Linear-interpolated percentile `p` (0..=100) of `values`.
///
/// Returns `None` for an empty slice. NaNs must not be present.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// What a prune pass did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PruneOutcome {
    /// Entries below `threshold` were zeroed.
    Pruned { threshold: f64, removed: usize },
    /// No positive weights existed; the matrix was left as is.
    EmptyDistribution,
}

/// Zero every entry below the `p`-th percentile of the positive weights.
pub fn prune(adj: &mut Array2<f64>, p: f64) -> PruneOutcome {
    let positive: Vec<f64> = adj.iter().copied().filter(|&w| w > 0.0).collect();
    let Some(threshold) = percentile(&positive, p) else {
        return PruneOutcome::EmptyDistribution;
    };
    let mut removed = 0;
    adj.mapv_inplace(|w| {
        if w >= threshold {
            return w;
        }
        if w != 0.0 {
            removed += 1;
        }
        0.0
    });
    PruneOutcome::Pruned { threshold, removed }
}
