//! Engine configuration, persisted as TOML.
//!
//! Every field has a serde default, so a config file only needs to name the
//! knobs it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration for the layered knowledge graph engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Accepted-fact count that fires the one-time bootstrap cascade.
    #[serde(default = "default_bootstrap_threshold")]
    pub bootstrap_threshold: u64,
    /// Ceiling on the number of layers, level 0 included.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Number of layers a pre-bootstrap light pass builds.
    #[serde(default = "default_light_depth")]
    pub light_depth: usize,
    /// Scale applied to shared-neighbor links; must stay below 1.
    #[serde(default = "default_structural_damping")]
    pub structural_damping: f64,
    /// Percentile of proposal scores a pair must exceed to be kept.
    #[serde(default = "default_proposal_percentile")]
    pub proposal_percentile: f64,
    /// Fixed weight assigned to every kept proposal.
    #[serde(default = "default_proposal_weight")]
    pub proposal_weight: f64,
    /// Percentile of positive weights below which derived edges are dropped.
    #[serde(default = "default_prune_percentile")]
    pub prune_percentile: f64,
    /// Optimisation steps the iterative scorer runs per pass.
    #[serde(default = "default_scorer_iterations")]
    pub scorer_iterations: usize,
    /// Seed for the iterative scorer's weight initialisation.
    #[serde(default = "default_scorer_seed")]
    pub scorer_seed: u64,
    /// Density a community must exceed to become an invented predicate.
    #[serde(default = "default_invention_threshold")]
    pub invention_threshold: f64,
    /// Minimum edge count of the deepest layer before invention runs.
    #[serde(default = "default_min_invention_edges")]
    pub min_invention_edges: usize,
    /// Communities smaller than this are ignored by invention.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    /// Hard cap on write-back drain rounds per foreground call.
    #[serde(default = "default_max_writeback_rounds")]
    pub max_writeback_rounds: usize,
    /// Curiosity scan interval in milliseconds.
    #[serde(default = "default_curiosity_interval_ms")]
    pub curiosity_interval_ms: u64,
    /// Substring that tags a label as unresolved.
    #[serde(default = "default_unknown_marker")]
    pub unknown_marker: String,
    /// Subject used when seeding unknown entities.
    #[serde(default = "default_curiosity_anchor")]
    pub curiosity_anchor: String,
    /// Mutually exclusive predicate pairs. Each pair applies in both directions.
    #[serde(default = "default_mutex_pairs")]
    pub mutex_pairs: Vec<(String, String)>,
}

fn default_bootstrap_threshold() -> u64 {
    50
}
fn default_max_depth() -> usize {
    3
}
fn default_light_depth() -> usize {
    2
}
fn default_structural_damping() -> f64 {
    0.2
}
fn default_proposal_percentile() -> f64 {
    95.0
}
fn default_proposal_weight() -> f64 {
    0.15
}
fn default_prune_percentile() -> f64 {
    5.0
}
fn default_scorer_iterations() -> usize {
    10
}
fn default_scorer_seed() -> u64 {
    7
}
fn default_invention_threshold() -> f64 {
    0.8
}
fn default_min_invention_edges() -> usize {
    5
}
fn default_min_cluster_size() -> usize {
    3
}
fn default_max_writeback_rounds() -> usize {
    4
}
fn default_curiosity_interval_ms() -> u64 {
    30_000
}
fn default_unknown_marker() -> String {
    "UNKNOWN".into()
}
fn default_curiosity_anchor() -> String {
    "curiosity_seed".into()
}
fn default_mutex_pairs() -> Vec<(String, String)> {
    vec![
        ("loves".into(), "hates".into()),
        ("bornIn".into(), "diedIn".into()),
        ("worksAt".into(), "firedFrom".into()),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bootstrap_threshold: default_bootstrap_threshold(),
            max_depth: default_max_depth(),
            light_depth: default_light_depth(),
            structural_damping: default_structural_damping(),
            proposal_percentile: default_proposal_percentile(),
            proposal_weight: default_proposal_weight(),
            prune_percentile: default_prune_percentile(),
            scorer_iterations: default_scorer_iterations(),
            scorer_seed: default_scorer_seed(),
            invention_threshold: default_invention_threshold(),
            min_invention_edges: default_min_invention_edges(),
            min_cluster_size: default_min_cluster_size(),
            max_writeback_rounds: default_max_writeback_rounds(),
            curiosity_interval_ms: default_curiosity_interval_ms(),
            unknown_marker: default_unknown_marker(),
            curiosity_anchor: default_curiosity_anchor(),
            mutex_pairs: default_mutex_pairs(),
        }
    }
}

impl EngineConfig {
    /// Curiosity scan interval as a [`Duration`].
    pub fn curiosity_interval(&self) -> Duration {
        Duration::from_millis(self.curiosity_interval_ms)
    }

    /// Check every field for values the engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                message: message.into(),
            }
        }

        if self.max_depth == 0 {
            return Err(invalid("max_depth", "must be at least 1 (level 0 always exists)"));
        }
        if self.light_depth == 0 || self.light_depth > self.max_depth {
            return Err(invalid(
                "light_depth",
                format!("must be between 1 and max_depth ({})", self.max_depth),
            ));
        }
        if !(self.structural_damping > 0.0 && self.structural_damping < 1.0) {
            return Err(invalid(
                "structural_damping",
                "must lie strictly between 0 and 1 so structural links never outweigh scored ones",
            ));
        }
        for (field, value) in [
            ("proposal_percentile", self.proposal_percentile),
            ("prune_percentile", self.prune_percentile),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(field, "must be a percentile in [0, 100]"));
            }
        }
        if !(self.proposal_weight.is_finite() && self.proposal_weight > 0.0) {
            return Err(invalid("proposal_weight", "must be a positive finite number"));
        }
        if !self.invention_threshold.is_finite() {
            return Err(invalid("invention_threshold", "must be finite"));
        }
        if self.curiosity_interval_ms == 0 {
            return Err(invalid("curiosity_interval_ms", "must be greater than zero"));
        }
        if self.unknown_marker.trim().is_empty() {
            return Err(invalid("unknown_marker", "must not be blank"));
        }
        if self.curiosity_anchor.trim().is_empty() {
            return Err(invalid("curiosity_anchor", "must not be blank"));
        }
        for (p, q) in &self.mutex_pairs {
            if p == q {
                return Err(invalid(
                    "mutex_pairs",
                    format!("predicate \"{p}\" cannot be its own opposite"),
                ));
            }
        }
        Ok(())
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
