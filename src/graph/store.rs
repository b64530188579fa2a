//! The level store: an ordered, gap-free sequence of layers.
//!
//! Level 0 holds ground-truth facts and is created lazily by the first
//! ingested fact. Levels 1 and up are derived and are replaced wholesale by
//! every expansion pass.

use crate::error::GraphError;

use super::layer::{Layer, Upsert};
use super::Triple;

/// Result type for level store operations.
pub type StoreResult<T> = std::result::Result<T, GraphError>;

/// Owns every layer plus the monotonic fact counter.
#[derive(Debug, Default)]
pub struct LevelStore {
    layers: Vec<Layer>,
    total_facts: u64,
    next_seq: u64,
}

impl LevelStore {
    /// Create an empty store with no layers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the layer at level `k`, or `None` if it has not been derived yet.
    pub fn get_layer(&self, k: usize) -> Option<&Layer> {
        self.layers.get(k)
    }

    /// Replace level `k`, or append it directly after the deepest layer.
    pub fn set_layer(&mut self, k: usize, layer: Layer) -> StoreResult<()> {
        match k.cmp(&self.layers.len()) {
            std::cmp::Ordering::Less => self.layers[k] = layer,
            std::cmp::Ordering::Equal => self.layers.push(layer),
            std::cmp::Ordering::Greater => {
                return Err(GraphError::LayerGap {
                    level: k,
                    depth: self.layers.len(),
                });
            }
        }
        Ok(())
    }

    /// Drop every layer at or above `depth`. Level 0 is never dropped.
    pub fn truncate(&mut self, depth: usize) {
        self.layers.truncate(depth.max(1));
    }

    /// Number of layers currently present.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// All layers in ascending level order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The deepest layer, if any.
    pub fn deepest(&self) -> Option<&Layer> {
        self.layers.last()
    }

    /// Total facts submitted so far. Never decreases.
    pub fn fact_count(&self) -> u64 {
        self.total_facts
    }

    /// Add `n` submitted facts to the running count.
    pub fn record_facts(&mut self, n: u64) {
        self.total_facts = self.total_facts.saturating_add(n);
    }

    /// Level 0, created on first use.
    pub fn base_mut(&mut self) -> &mut Layer {
        if self.layers.is_empty() {
            self.layers.push(Layer::new(0));
        }
        &mut self.layers[0]
    }

    /// Upsert a validated fact into level 0, stamping it with the next
    /// insertion sequence.
    pub fn upsert_fact(&mut self, fact: &Triple) -> Upsert {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.base_mut()
            .upsert(&fact.subject, &fact.predicate, &fact.object, fact.weight, seq)
    }
}
