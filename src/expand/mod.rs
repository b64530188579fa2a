//! Recursive expansion: derives level k+1 from level k.
//!
//! Each derived adjacency is `A + C + X`, where
//!
//! - `A` is the adjacency of the level below,
//! - `C` links every pair of nodes that share a neighbour, damped so that
//!   structural links never outweigh scored ones,
//! - `X` links the top percentile of non-adjacent pairs proposed by an
//!   [`EdgeScorer`], each at a fixed low weight,
//!
//! after which the weakest percentile of positive weights is pruned. Derived
//! layers are rebuilt wholesale on every pass; they hold nothing that cannot
//! be recomputed from level 0.

pub mod prune;
pub mod scorer;

use ndarray::Array2;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::graph::layer::Layer;
use crate::graph::store::{LevelStore, StoreResult};

use self::prune::{PruneOutcome, percentile};
use self::scorer::{EdgeScorer, shared_neighbors};

/// Predicate of derived edges present in the level below.
pub const LINKED: &str = "linked";
/// Predicate of derived edges that only come from shared neighbours.
pub const CO_CONNECTED: &str = "co_connected";
/// Predicate of derived edges that only come from scored proposals.
pub const PROPOSED: &str = "proposed";

/// Numeric knobs of one expansion pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpansionParams {
    pub structural_damping: f64,
    pub proposal_percentile: f64,
    pub proposal_weight: f64,
    pub prune_percentile: f64,
}

impl From<&EngineConfig> for ExpansionParams {
    fn from(config: &EngineConfig) -> Self {
        Self {
            structural_damping: config.structural_damping,
            proposal_percentile: config.proposal_percentile,
            proposal_weight: config.proposal_weight,
            prune_percentile: config.prune_percentile,
        }
    }
}

impl Default for ExpansionParams {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// What building one derived level produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
    pub level: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Pairs the scorer proposed above the percentile cut.
    pub proposals: usize,
    /// Entries removed by pruning; `None` when the weight distribution was empty.
    pub pruned: Option<usize>,
}

/// Result of an expansion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExpansionOutcome {
    /// Levels were rebuilt.
    Expanded { levels: Vec<LevelReport> },
    /// Nothing to expand yet: level 0 does not exist.
    NothingToExpand,
    /// Another expansion was already in flight; this call did nothing.
    Skipped,
}

impl ExpansionOutcome {
    /// Number of levels rebuilt.
    pub fn levels_built(&self) -> usize {
        match self {
            Self::Expanded { levels } => levels.len(),
            _ => 0,
        }
    }
}

/// Shared-neighbour links scaled by `damping`, diagonal excluded.
pub fn structural_term(adj: &Array2<f64>, damping: f64) -> Array2<f64> {
    let shared = shared_neighbors(adj);
    Array2::from_shape_fn(adj.dim(), |(i, j)| {
        if i != j && shared[[i, j]] > 0.0 {
            damping
        } else {
            0.0
        }
    })
}

/// Scored proposals over non-adjacent, off-diagonal pairs.
///
/// Only pairs scoring strictly above the `pct`-th percentile of all candidate
/// scores are kept, each at `weight`.
pub fn proposal_term(
    adj: &Array2<f64>,
    scorer: &dyn EdgeScorer,
    pct: f64,
    weight: f64,
) -> (Array2<f64>, usize) {
    let (n, _) = adj.dim();
    let mut proposals = Array2::<f64>::zeros((n, n));
    let candidates: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .filter(|&(i, j)| i != j && adj[[i, j]] <= 0.0)
        .collect();
    let scores = scorer.score(adj, &candidates);
    let Some(cut) = percentile(&scores, pct) else {
        return (proposals, 0);
    };
    let mut kept = 0;
    for (&(i, j), &s) in candidates.iter().zip(&scores) {
        if s > cut {
            proposals[[i, j]] = weight;
            kept += 1;
        }
    }
    (proposals, kept)
}

/// Derive the layer at `level` from the layer below it.
pub fn derive_level(
    below: &Layer,
    level: usize,
    scorer: &dyn EdgeScorer,
    params: &ExpansionParams,
) -> (Layer, LevelReport) {
    let a = below.adjacency();
    let c = structural_term(a, params.structural_damping);
    let (x, proposals) = proposal_term(a, scorer, params.proposal_percentile, params.proposal_weight);

    let mut combined = a + &c + &x;
    let pruned = match prune::prune(&mut combined, params.prune_percentile) {
        PruneOutcome::Pruned { removed, threshold } => {
            tracing::debug!(level, threshold, removed, "pruned derived weights");
            Some(removed)
        }
        PruneOutcome::EmptyDistribution => {
            tracing::debug!(level, "no positive weights to prune, skipping");
            None
        }
    };

    let labels = below.labels();
    let layer = Layer::from_matrix(level, &labels, combined, |i, j| {
        if a[[i, j]] > 0.0 {
            LINKED
        } else if c[[i, j]] > 0.0 {
            CO_CONNECTED
        } else {
            PROPOSED
        }
    });

    let report = LevelReport {
        level,
        nodes: layer.node_count(),
        edges: layer.edge_count(),
        proposals,
        pruned,
    };
    tracing::info!(
        level,
        nodes = report.nodes,
        edges = report.edges,
        proposals,
        scorer = scorer.name(),
        "built derived level"
    );
    (layer, report)
}

/// Rebuild levels `1..depth` from level 0 and drop anything deeper.
///
/// Returns [`ExpansionOutcome::NothingToExpand`] when level 0 does not exist.
pub fn expand_store(
    store: &mut LevelStore,
    depth: usize,
    scorer: &dyn EdgeScorer,
    params: &ExpansionParams,
) -> StoreResult<ExpansionOutcome> {
    if store.depth() == 0 {
        return Ok(ExpansionOutcome::NothingToExpand);
    }
    if store.base_mut().adjacency_stale() {
        store.base_mut().refresh_adjacency();
    }

    let mut levels = Vec::new();
    for k in 1..depth {
        let Some(below) = store.get_layer(k - 1) else {
            break;
        };
        let (layer, report) = derive_level(below, k, scorer, params);
        store.set_layer(k, layer)?;
        levels.push(report);
    }
    store.truncate(depth);
    Ok(ExpansionOutcome::Expanded { levels })
}
