//! Layered knowledge graph: ground-truth facts plus derived abstraction layers.
//!
//! - **Layer** ([`layer::Layer`]): a petgraph multigraph of labeled nodes and
//!   predicate-labeled weighted edges, mirrored into a dense adjacency matrix
//! - **Level store** ([`store::LevelStore`]): the ordered, gap-free sequence of
//!   layers, level 0 holding user facts
//! - **Contradiction repair** ([`contradiction`]): removes the weaker side of
//!   mutually exclusive predicate pairs on level 0
//! - **Analytics** ([`analytics`]): community detection and subgraph density

pub mod analytics;
pub mod contradiction;
pub mod layer;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::error::FactError;

/// Opaque node label. Two occurrences of the same label are the same node.
pub type Label = String;

fn default_weight() -> f64 {
    1.0
}

/// A fact (subject, predicate, object) with a weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    #[serde(default)]
    pub subject: Label,
    #[serde(default)]
    pub predicate: Label,
    #[serde(default)]
    pub object: Label,
    /// Strength of the assertion. Higher weight wins contradictions.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl Triple {
    /// Create a new fact with weight 1.0.
    pub fn new(
        subject: impl Into<Label>,
        predicate: impl Into<Label>,
        object: impl Into<Label>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            weight: default_weight(),
        }
    }

    /// Set the weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Reject facts with a blank label or a non-finite weight.
    pub fn validate(&self) -> Result<(), FactError> {
        if self.subject.trim().is_empty() {
            return Err(FactError::MissingSubject);
        }
        if self.predicate.trim().is_empty() {
            return Err(FactError::MissingPredicate);
        }
        if self.object.trim().is_empty() {
            return Err(FactError::MissingObject);
        }
        if !self.weight.is_finite() {
            return Err(FactError::InvalidWeight {
                weight: self.weight,
            });
        }
        Ok(())
    }
}

/// Edge data stored on petgraph edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeData {
    /// The predicate label for this edge.
    pub predicate: Label,
    /// Weight of the edge. On derived layers this is the derived confidence.
    pub weight: f64,
    /// Insertion sequence; refreshed whenever the fact is re-asserted.
    pub seq: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_labels_rejected() {
        assert_eq!(
            Triple::new(" ", "p", "o").validate(),
            Err(FactError::MissingSubject)
        );
        assert_eq!(
            Triple::new("s", "", "o").validate(),
            Err(FactError::MissingPredicate)
        );
        assert_eq!(
            Triple::new("s", "p", "\t").validate(),
            Err(FactError::MissingObject)
        );
    }

    #[test]
    fn nan_weight_rejected() {
        let err = Triple::new("s", "p", "o")
            .with_weight(f64::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, FactError::InvalidWeight { .. }));
    }

    #[test]
    fn json_weight_defaults_to_one() {
        let t: Triple =
            serde_json::from_str(r#"{"subject":"a","predicate":"p","object":"b"}"#).unwrap();
        assert_eq!(t.weight, 1.0);
        t.validate().unwrap();
    }

    #[test]
    fn json_missing_object_is_malformed() {
        let t: Triple = serde_json::from_str(r#"{"subject":"a","predicate":"p"}"#).unwrap();
        assert_eq!(t.validate(), Err(FactError::MissingObject));
    }
}
