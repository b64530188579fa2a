//! Predicate invention: names dense clusters of the deepest layer.
//!
//! A community of the deepest derived layer whose internal density exceeds
//! the threshold becomes an [`InventedPredicate`]. Its name is a stable hash
//! of the sorted member labels, so the same cluster always yields the same
//! name. The predicate is re-expressed as ordinary level-0 facts:
//! `(name, isA, invented_predicate)` plus `(member, member_of, name)` for
//! every member.
//!
//! Those facts flow back through expansion, so the `invented_predicate` sink
//! and every registered name are masked out of later community passes.
//! Otherwise each round would cluster the previous round's names.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::graph::analytics::dense_communities;
use crate::graph::store::LevelStore;
use crate::graph::{Label, Triple};

pub const IS_A: &str = "isA";
pub const MEMBER_OF: &str = "member_of";
pub const INVENTED_PREDICATE: &str = "invented_predicate";

/// A synthetic relationship derived from a dense cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventedPredicate {
    pub name: String,
    pub members: BTreeSet<Label>,
    /// Internal density at creation time; always above the threshold used.
    pub density: f64,
}

impl InventedPredicate {
    /// The level-0 facts that express this predicate.
    pub fn write_back(&self) -> Vec<Triple> {
        std::iter::once(Triple::new(self.name.clone(), IS_A, INVENTED_PREDICATE))
            .chain(
                self.members
                    .iter()
                    .map(|m| Triple::new(m.clone(), MEMBER_OF, self.name.clone())),
            )
            .collect()
    }
}

/// Knobs of one invention pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InventionParams {
    pub threshold: f64,
    pub min_layers: usize,
    pub min_edges: usize,
    pub min_cluster_size: usize,
}

impl InventionParams {
    /// Parameters from config, with an explicit density threshold.
    pub fn from_config(config: &EngineConfig, threshold: f64) -> Self {
        Self {
            threshold,
            min_layers: config.max_depth,
            min_edges: config.min_invention_edges,
            min_cluster_size: config.min_cluster_size,
        }
    }
}

/// Deterministic cluster name from the sorted member set (FNV-1a, 64 bit).
pub fn predicate_name<'a>(members: impl IntoIterator<Item = &'a Label>) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let sorted: BTreeSet<&Label> = members.into_iter().collect();
    let mut hash = OFFSET;
    for label in sorted {
        for byte in label.bytes().chain(std::iter::once(0x1f)) {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(PRIME);
        }
    }
    format!("cluster_{hash:016x}")
}

/// Find dense communities of the deepest layer and name them.
///
/// Returns nothing when fewer than `min_layers` layers exist or the deepest
/// layer has fewer than `min_edges` edges. `registered` reports labels that
/// already name an invented predicate; those nodes never join a community.
pub fn discover(
    store: &LevelStore,
    params: &InventionParams,
    registered: impl Fn(&str) -> bool,
) -> Vec<InventedPredicate> {
    if store.depth() < params.min_layers.max(1) {
        tracing::debug!(
            depth = store.depth(),
            required = params.min_layers,
            "too few layers for invention"
        );
        return vec![];
    }
    let Some(deepest) = store.deepest() else {
        return vec![];
    };
    if deepest.edge_count() < params.min_edges {
        tracing::debug!(
            edges = deepest.edge_count(),
            required = params.min_edges,
            "deepest layer too sparse for invention"
        );
        return vec![];
    }

    let reserved = |label: &str| label == INVENTED_PREDICATE || registered(label);
    dense_communities(deepest, params.min_cluster_size, reserved)
        .into_iter()
        .filter(|c| c.density > params.threshold)
        .map(|c| InventedPredicate {
            name: predicate_name(&c.members),
            members: c.members.into_iter().collect(),
            density: c.density,
        })
        .collect()
}
