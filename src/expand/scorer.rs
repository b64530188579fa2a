//! Pluggable edge scoring for non-local link proposals.
//!
//! The expansion engine asks an [`EdgeScorer`] to score candidate node pairs
//! that are not adjacent in the layer below. Any model works as long as it
//! returns one score in `[0, 1]` per candidate; the engine keeps only the top
//! percentile.

use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Scores candidate `(row, col)` pairs of an adjacency matrix.
pub trait EdgeScorer: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// One score in `[0, 1]` per candidate, in candidate order.
    fn score(&self, adj: &Array2<f64>, candidates: &[(usize, usize)]) -> Vec<f64>;
}

/// 0/1 indicator of positive entries.
pub(crate) fn indicator(adj: &Array2<f64>) -> Array2<f64> {
    adj.mapv(|w| if w > 0.0 { 1.0 } else { 0.0 })
}

/// Shared-neighbour counts: entry `(i, j)` is the number of common
/// out-neighbours plus the number of common in-neighbours of `i` and `j`.
pub fn shared_neighbors(adj: &Array2<f64>) -> Array2<f64> {
    let b = indicator(adj);
    let co_out = b.dot(&b.t());
    let co_in = b.t().dot(&b);
    co_out + co_in
}

// ---------------------------------------------------------------------------
// Common-neighbour heuristic
// ---------------------------------------------------------------------------

/// Deterministic heuristic: a pair's score is its shared-neighbour count
/// normalised by the largest count among the candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonNeighborScorer;

impl EdgeScorer for CommonNeighborScorer {
    fn name(&self) -> &'static str {
        "common-neighbor"
    }

    fn score(&self, adj: &Array2<f64>, candidates: &[(usize, usize)]) -> Vec<f64> {
        let shared = shared_neighbors(adj);
        let raw: Vec<f64> = candidates
            .par_iter()
            .map(|&(i, j)| shared[[i, j]])
            .collect();
        let max = raw.iter().copied().fold(0.0_f64, f64::max);
        if max == 0.0 {
            return vec![0.0; raw.len()];
        }
        raw.into_iter().map(|c| c / max).collect()
    }
}

// ---------------------------------------------------------------------------
// Iterative propagation model
// ---------------------------------------------------------------------------

/// A one-layer propagation model fitted to normalised degree.
///
/// Node features (out-degree, in-degree) are smoothed once over the
/// symmetric-normalised adjacency with self-loops, then a logistic unit is
/// fitted to each node's normalised total degree by plain gradient descent
/// for exactly `iterations` steps. A pair scores the product of its two node
/// activations. Weights are initialised from `seed`, so results are
/// reproducible.
#[derive(Debug, Clone)]
pub struct IterativeScorer {
    pub iterations: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl IterativeScorer {
    pub fn new(iterations: usize, seed: u64) -> Self {
        Self {
            iterations,
            learning_rate: 0.5,
            seed,
        }
    }

    /// Fitted per-node activations in `[0, 1]`.
    pub fn node_scores(&self, adj: &Array2<f64>) -> Array1<f64> {
        let n = adj.nrows();
        if n == 0 {
            return Array1::zeros(0);
        }
        let b = indicator(adj);
        let out_deg = b.sum_axis(Axis(1));
        let in_deg = b.sum_axis(Axis(0));

        // Symmetric adjacency with self-loops, normalised D^-1/2 (A + I) D^-1/2.
        let mut sym = b.clone() + b.t();
        sym.mapv_inplace(|w| if w > 0.0 { 1.0 } else { 0.0 });
        let degree = sym.sum_axis(Axis(1));
        for i in 0..n {
            sym[[i, i]] = 1.0;
        }
        let d = sym.sum_axis(Axis(1)).mapv(|x| 1.0 / x.sqrt());
        let norm = Array2::from_shape_fn((n, n), |(i, j)| d[i] * sym[[i, j]] * d[j]);

        let max_deg = degree.iter().copied().fold(0.0_f64, f64::max).max(1.0);
        let mut features = Array2::<f64>::zeros((n, 2));
        features.column_mut(0).assign(&(out_deg / max_deg));
        features.column_mut(1).assign(&(in_deg / max_deg));
        let hidden = norm.dot(&features);
        let target = degree / max_deg;

        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        let mut theta = Array1::from_shape_fn(2, |_| rng.gen_range(-0.5..0.5));
        let mut bias: f64 = rng.gen_range(-0.5..0.5);

        let activate = |theta: &Array1<f64>, bias: f64| {
            hidden.dot(theta).mapv(|z| 1.0 / (1.0 + (-(z + bias)).exp()))
        };

        for _ in 0..self.iterations {
            let out = activate(&theta, bias);
            // d(MSE)/dz = 2/n * (out - target) * out * (1 - out)
            let delta = (&out - &target) * &out * out.mapv(|o| 1.0 - o) * (2.0 / n as f64);
            let grad_theta = hidden.t().dot(&delta);
            let grad_bias = delta.sum();
            theta = theta - grad_theta * self.learning_rate;
            bias -= grad_bias * self.learning_rate;
        }

        activate(&theta, bias)
    }
}

impl EdgeScorer for IterativeScorer {
    fn name(&self) -> &'static str {
        "iterative"
    }

    fn score(&self, adj: &Array2<f64>, candidates: &[(usize, usize)]) -> Vec<f64> {
        let nodes = self.node_scores(adj);
        candidates
            .par_iter()
            .map(|&(i, j)| (nodes[i] * nodes[j]).clamp(0.0, 1.0))
            .collect()
    }
}
