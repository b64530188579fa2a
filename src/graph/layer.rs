//! A single graph layer with a dense adjacency mirror.
//!
//! Uses a petgraph `StableDiGraph` for the multigraph structure, a label
//! index for O(1) node lookups, an edge index keyed by
//! `(subject, object, predicate)` so re-asserted facts update in place, and an
//! `ndarray` matrix mirroring the strongest edge weight between every ordered
//! node pair.
//!
//! Nodes are never removed, so node indices are dense and double as matrix
//! rows.

use std::collections::HashMap;

use ndarray::Array2;
use petgraph::Direction;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use serde::Serialize;

use super::{EdgeData, Label};

/// An edge read out of a layer, with its endpoints resolved to labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerEdge {
    pub subject: Label,
    pub predicate: Label,
    pub object: Label,
    pub weight: f64,
    pub seq: u64,
}

/// Outcome of [`Layer::upsert`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upsert {
    Inserted,
    Updated { previous_weight: f64 },
}

/// One level of the layered graph.
pub struct Layer {
    level: usize,
    graph: StableDiGraph<Label, EdgeData>,
    node_index: HashMap<Label, NodeIndex>,
    edge_index: HashMap<(NodeIndex, NodeIndex, Label), EdgeIndex>,
    adjacency: Array2<f64>,
    adjacency_stale: bool,
}

impl Layer {
    /// Create an empty layer for the given level.
    pub fn new(level: usize) -> Self {
        Self {
            level,
            graph: StableDiGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            adjacency: Array2::zeros((0, 0)),
            adjacency_stale: false,
        }
    }

    /// Build a derived layer from a weighted adjacency matrix.
    ///
    /// Row `i` of `matrix` belongs to `labels[i]`. Every positive entry becomes
    /// one edge whose predicate is chosen by `predicate_for(i, j)`.
    pub fn from_matrix(
        level: usize,
        labels: &[Label],
        matrix: Array2<f64>,
        mut predicate_for: impl FnMut(usize, usize) -> &'static str,
    ) -> Self {
        let mut layer = Self::new(level);
        for label in labels {
            layer.ensure_node(label);
        }
        let mut seq = 0;
        for ((i, j), &weight) in matrix.indexed_iter() {
            if weight > 0.0 {
                let (from, to) = (NodeIndex::new(i), NodeIndex::new(j));
                let predicate = predicate_for(i, j).to_string();
                let edge = layer.graph.add_edge(
                    from,
                    to,
                    EdgeData {
                        predicate: predicate.clone(),
                        weight,
                        seq,
                    },
                );
                layer.edge_index.insert((from, to, predicate), edge);
                seq += 1;
            }
        }
        layer.adjacency = matrix;
        layer.adjacency_stale = false;
        layer
    }

    /// The level this layer sits at.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Ensure a node exists for the label, returning its index.
    pub fn ensure_node(&mut self, label: &str) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(label) {
            return idx;
        }
        let idx = self.graph.add_node(label.to_string());
        self.node_index.insert(label.to_string(), idx);
        self.adjacency_stale = true;
        idx
    }

    /// Insert an edge, or update the weight and sequence of the existing edge
    /// with the same `(subject, predicate, object)`.
    pub fn upsert(
        &mut self,
        subject: &str,
        predicate: &str,
        object: &str,
        weight: f64,
        seq: u64,
    ) -> Upsert {
        let from = self.ensure_node(subject);
        let to = self.ensure_node(object);
        self.adjacency_stale = true;

        let key = (from, to, predicate.to_string());
        if let Some(data) = self
            .edge_index
            .get(&key)
            .and_then(|&e| self.graph.edge_weight_mut(e))
        {
            let previous_weight = data.weight;
            data.weight = weight;
            data.seq = seq;
            return Upsert::Updated { previous_weight };
        }

        let edge = self.graph.add_edge(
            from,
            to,
            EdgeData {
                predicate: predicate.to_string(),
                weight,
                seq,
            },
        );
        self.edge_index.insert(key, edge);
        Upsert::Inserted
    }

    /// Remove the edge `(subject, predicate, object)`. Both nodes are kept.
    pub fn remove_edge(&mut self, subject: &str, predicate: &str, object: &str) -> Option<EdgeData> {
        let from = *self.node_index.get(subject)?;
        let to = *self.node_index.get(object)?;
        let edge = self.edge_index.remove(&(from, to, predicate.to_string()))?;
        self.adjacency_stale = true;
        self.graph.remove_edge(edge)
    }

    /// Check if a node exists.
    pub fn has_node(&self, label: &str) -> bool {
        self.node_index.contains_key(label)
    }

    /// Matrix row of a label.
    pub fn row_of(&self, label: &str) -> Option<usize> {
        self.node_index.get(label).map(|idx| idx.index())
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All node labels in matrix-row order.
    pub fn labels(&self) -> Vec<Label> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// All edges in storage order.
    pub fn edges(&self) -> Vec<LayerEdge> {
        self.graph
            .edge_indices()
            .filter_map(|ei| self.resolve(ei))
            .collect()
    }

    /// All edges from `subject` to `object`, one per predicate.
    pub fn edges_between(&self, subject: &str, object: &str) -> Vec<LayerEdge> {
        let (Some(&from), Some(&to)) = (self.node_index.get(subject), self.node_index.get(object))
        else {
            return vec![];
        };
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .filter(|e| e.target() == to)
            .filter_map(|e| self.resolve(e.id()))
            .collect()
    }

    /// Get all edges leaving `subject`.
    pub fn edges_from(&self, subject: &str) -> Vec<LayerEdge> {
        let Some(&from) = self.node_index.get(subject) else {
            return vec![];
        };
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .filter_map(|e| self.resolve(e.id()))
            .collect()
    }

    /// The dense adjacency mirror. Entry `(i, j)` is the strongest weight of
    /// any edge from row `i` to row `j`.
    ///
    /// Edge mutations mark the mirror stale; call
    /// [`refresh_adjacency`](Self::refresh_adjacency) once a batch of
    /// mutations is done.
    pub fn adjacency(&self) -> &Array2<f64> {
        &self.adjacency
    }

    /// Whether edge mutations happened since the last refresh.
    pub fn adjacency_stale(&self) -> bool {
        self.adjacency_stale
    }

    /// Rebuild the dense mirror from the graph.
    pub fn refresh_adjacency(&mut self) {
        let n = self.graph.node_count();
        let mut matrix = Array2::<f64>::zeros((n, n));
        let mut seen = Array2::<bool>::from_elem((n, n), false);
        for edge in self.graph.edge_references() {
            let cell = (edge.source().index(), edge.target().index());
            let weight = edge.weight().weight;
            if !seen[cell] || weight > matrix[cell] {
                matrix[cell] = weight;
                seen[cell] = true;
            }
        }
        self.adjacency = matrix;
        self.adjacency_stale = false;
    }

    fn resolve(&self, ei: EdgeIndex) -> Option<LayerEdge> {
        let (src, dst) = self.graph.edge_endpoints(ei)?;
        let data = self.graph.edge_weight(ei)?;
        Some(LayerEdge {
            subject: self.graph.node_weight(src)?.clone(),
            predicate: data.predicate.clone(),
            object: self.graph.node_weight(dst)?.clone(),
            weight: data.weight,
            seq: data.seq,
        })
    }
}

impl std::fmt::Debug for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layer")
            .field("level", &self.level)
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}
