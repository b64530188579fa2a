// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # strata-kg
//!
//! A layered knowledge graph engine: ground-truth facts on level 0, derived
//! abstraction layers above it, predicate invention from dense clusters, and
//! a background curiosity scan over unresolved entities.
//!
//! ## Architecture
//!
//! - **Graph** (`graph`): petgraph layers with dense ndarray mirrors, the
//!   level store, and contradiction repair over mutually exclusive predicates
//! - **Expansion** (`expand`): derives level k+1 from level k with structural
//!   links, pluggable scored proposals, and percentile pruning
//! - **Invention** (`invent`): names dense communities of the deepest layer and
//!   writes them back as ordinary facts
//! - **Curiosity** (`curiosity`): goal synthesis and the background scanner
//! - **Engine** (`engine`): the locked facade tying it together, including the
//!   one-shot bootstrap cascade
//!
//! ## Library usage
//!
//! ```no_run
//! use strata_kg::config::EngineConfig;
//! use strata_kg::engine::Engine;
//! use strata_kg::graph::Triple;
//!
//! let engine = Engine::new(EngineConfig::default()).unwrap();
//! let report = engine
//!     .ingest(vec![Triple::new("Sun", "isA", "Star").with_weight(0.9)])
//!     .unwrap();
//! assert_eq!(report.total_facts, 1);
//! let hits = engine.query(&(Some("Sun".into()), None, None), None, 5);
//! println!("{hits:?}");
//! ```

pub mod config;
pub mod curiosity;
pub mod engine;
pub mod error;
pub mod expand;
pub mod graph;
pub mod invent;
