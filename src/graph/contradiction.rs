//! Contradiction repair: removes the weaker of two mutually exclusive facts.
//!
//! A [`MutexPolicy`] declares predicate pairs that cannot hold between the
//! same ordered `(subject, object)` pair (`loves`/`hates`, `bornIn`/`diedIn`).
//! [`repair`] scans *every* edge of a layer, not just recent ones, since a new
//! fact can contradict one asserted long ago.
//!
//! Resolution keeps the higher-weight edge. On equal weights the more
//! recently asserted edge (higher insertion sequence) is removed, which keeps
//! repeated runs on identical input stable. After a pass no pair carries both
//! sides of a declared opposition, so a second pass is a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::Label;
use super::layer::{Layer, LayerEdge};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Set of mutually exclusive predicate pairs. Stored both ways for O(1) lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutexPolicy {
    pairs: HashSet<(Label, Label)>,
}

impl MutexPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a policy from `(predicate, opposite)` pairs.
    pub fn from_pairs<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<Label>,
        B: Into<Label>,
    {
        let mut policy = Self::new();
        for (p, q) in pairs {
            policy.declare_opposites(p, q);
        }
        policy
    }

    /// Declare two predicates mutually exclusive.
    pub fn declare_opposites(&mut self, p: impl Into<Label>, q: impl Into<Label>) {
        let (p, q) = (p.into(), q.into());
        self.pairs.insert((p.clone(), q.clone()));
        self.pairs.insert((q, p));
    }

    /// Check if two predicates are declared opposites.
    pub fn are_opposites(&self, p: &str, q: &str) -> bool {
        self.pairs.contains(&(p.to_string(), q.to_string()))
    }

    /// Number of declared pairs (counting each pair once).
    pub fn len(&self) -> usize {
        self.pairs.len() / 2
    }

    /// Whether no pairs are declared.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Detection and repair
// ---------------------------------------------------------------------------

/// Two edges between the same endpoints whose predicates are opposites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contradiction {
    /// The edge that survives resolution.
    pub kept: LayerEdge,
    /// The edge resolution removes.
    pub removed: LayerEdge,
}

/// Summary of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairReport {
    /// Every resolved contradiction, in resolution order.
    pub repairs: Vec<Contradiction>,
}

impl RepairReport {
    /// Number of edges removed.
    pub fn removed(&self) -> usize {
        self.repairs.len()
    }

    /// Whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.repairs.is_empty()
    }
}

/// `true` if `a` should lose against `b`.
fn weaker(a: &LayerEdge, b: &LayerEdge) -> bool {
    match a.weight.total_cmp(&b.weight) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => (a.seq, &a.predicate) > (b.seq, &b.predicate),
    }
}

/// Plan resolution for the edges sharing one `(subject, object)` pair.
///
/// Repeatedly resolves the conflict whose loser is weakest until no opposing
/// predicates remain among the survivors.
fn resolve_group(mut group: Vec<LayerEdge>, policy: &MutexPolicy) -> Vec<Contradiction> {
    let mut resolved = Vec::new();
    loop {
        let mut worst: Option<(usize, usize)> = None;
        for i in 0..group.len() {
            for j in (i + 1)..group.len() {
                if !policy.are_opposites(&group[i].predicate, &group[j].predicate) {
                    continue;
                }
                let (loser, winner) = if weaker(&group[i], &group[j]) {
                    (i, j)
                } else {
                    (j, i)
                };
                let replace = match worst {
                    None => true,
                    Some((current, _)) => weaker(&group[loser], &group[current]),
                };
                if replace {
                    worst = Some((loser, winner));
                }
            }
        }
        let Some((loser, winner)) = worst else {
            return resolved;
        };
        let kept = group[winner].clone();
        let removed = group.swap_remove(loser);
        resolved.push(Contradiction { kept, removed });
    }
}

/// Find every contradiction in the layer without changing it.
pub fn detect(layer: &Layer, policy: &MutexPolicy) -> Vec<Contradiction> {
    if policy.is_empty() {
        return vec![];
    }
    let mut groups: BTreeMap<(Label, Label), Vec<LayerEdge>> = BTreeMap::new();
    for edge in layer.edges() {
        groups
            .entry((edge.subject.clone(), edge.object.clone()))
            .or_default()
            .push(edge);
    }
    groups
        .into_values()
        .filter(|group| group.len() > 1)
        .flat_map(|group| resolve_group(group, policy))
        .collect()
}

/// Remove the weaker side of every contradiction in the layer.
pub fn repair(layer: &mut Layer, policy: &MutexPolicy) -> RepairReport {
    let repairs = detect(layer, policy);
    for c in &repairs {
        layer.remove_edge(&c.removed.subject, &c.removed.predicate, &c.removed.object);
        tracing::info!(
            subject = %c.removed.subject,
            object = %c.removed.object,
            kept = %c.kept.predicate,
            removed = %c.removed.predicate,
            "repaired contradiction"
        );
    }
    RepairReport { repairs }
}

/// Count how many `(subject, object)` pairs still carry opposing predicates.
pub fn violations(layer: &Layer, policy: &MutexPolicy) -> usize {
    let mut by_pair: HashMap<(Label, Label), Vec<Label>> = HashMap::new();
    for edge in layer.edges() {
        by_pair
            .entry((edge.subject, edge.object))
            .or_default()
            .push(edge.predicate);
    }
    by_pair
        .values()
        .filter(|preds| {
            preds.iter().enumerate().any(|(i, p)| {
                preds[i + 1..]
                    .iter()
                    .any(|q| policy.are_opposites(p, q))
            })
        })
        .count()
}
