//! Engine facade: top-level API for the layered knowledge graph.
//!
//! The `Engine` owns the level store, the mutex policy, the edge scorer, the
//! invention registry, the goal board, and the curiosity daemon. All layer
//! mutation goes through one `RwLock`; the daemon only ever takes the read
//! side.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ndarray::{Array2, s};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::curiosity::{self, CuriosityDaemon, Goal, GoalBoard, UNKNOWN_ENTITY};
use crate::error::{ExportError, FactError, StrataResult};
use crate::expand::scorer::{CommonNeighborScorer, EdgeScorer};
use crate::expand::{self, ExpansionOutcome, ExpansionParams};
use crate::graph::contradiction::{self, MutexPolicy};
use crate::graph::layer::LayerEdge;
use crate::graph::store::LevelStore;
use crate::graph::{Label, Triple};
use crate::invent::{self, InventedPredicate, InventionParams};

/// Predicate linking the curiosity anchor to a seeded entity.
pub const INVOLVES: &str = "involves";
/// Predicate typing a seeded entity as unresolved.
pub const TYPE: &str = "type";

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// A fact that failed validation, with its position in the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedFact {
    pub index: usize,
    pub error: FactError,
}

/// Outcome of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Well-formed facts committed to level 0.
    pub accepted: usize,
    /// Malformed facts, skipped without affecting the rest of the batch.
    pub rejected: Vec<RejectedFact>,
    /// Contradicting edges removed by the repair pass.
    pub repairs: usize,
    /// Running fact count after this call.
    pub total_facts: u64,
    /// Whether this call flipped the engine from cold to hot.
    pub bootstrap_triggered: bool,
}

/// One query hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub subject: Label,
    pub predicate: Label,
    pub object: Label,
    pub confidence: f64,
    pub level: usize,
}

/// `(subject, predicate, object)` with `None` as a wildcard.
pub type Pattern = (Option<Label>, Option<Label>, Option<Label>);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelStats {
    pub level: usize,
    pub nodes: usize,
    pub edges: usize,
    /// Fraction of edges carrying the unknown marker.
    pub unknown_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BootstrapStatus {
    pub bootstrapped: bool,
    pub total_facts: u64,
    pub threshold: u64,
}

/// Summary of engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub levels: Vec<LevelStats>,
    pub invented: Vec<InventedPredicate>,
    pub bootstrap: BootstrapStatus,
    pub goals: Vec<Goal>,
    pub daemon_running: bool,
    /// Write-back facts still queued.
    pub pending_writeback: usize,
}

impl std::fmt::Display for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "strata engine stats")?;
        writeln!(
            f,
            "  bootstrap:    {} ({}/{} facts)",
            if self.bootstrap.bootstrapped { "hot" } else { "cold" },
            self.bootstrap.total_facts,
            self.bootstrap.threshold
        )?;
        for level in &self.levels {
            writeln!(
                f,
                "  level {}:      {} nodes, {} edges, unknown ratio {:.3}",
                level.level, level.nodes, level.edges, level.unknown_ratio
            )?;
        }
        writeln!(f, "  invented:     {}", self.invented.len())?;
        for p in &self.invented {
            writeln!(f, "    {} ({} members, density {:.3})", p.name, p.members.len(), p.density)?;
        }
        writeln!(f, "  goals:        {}", self.goals.len())?;
        for goal in &self.goals {
            writeln!(f, "    {}", goal.description)?;
        }
        writeln!(f, "  daemon:       {}", if self.daemon_running { "running" } else { "stopped" })?;
        writeln!(f, "  pending:      {}", self.pending_writeback)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct LayerSnapshot {
    level: usize,
    nodes: Vec<Label>,
    edges: Vec<LayerEdge>,
}

#[derive(Serialize)]
struct Snapshot {
    bootstrapped: bool,
    total_facts: u64,
    depth: usize,
    invented: Vec<InventedPredicate>,
    layers: Vec<LayerSnapshot>,
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Everything guarded by the state lock.
#[derive(Debug, Default)]
struct EngineState {
    store: LevelStore,
    invented: BTreeMap<String, InventedPredicate>,
    pending: VecDeque<Triple>,
}

/// Claims a re-entrancy flag for the lifetime of the guard.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Shared between the engine handle and the curiosity thread.
struct EngineCore {
    config: EngineConfig,
    policy: MutexPolicy,
    scorer: Box<dyn EdgeScorer>,
    state: RwLock<EngineState>,
    bootstrapped: AtomicBool,
    expanding: AtomicBool,
    inventing: AtomicBool,
    goals: Mutex<GoalBoard>,
}

impl EngineCore {
    fn read_state(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(|poisoned| {
            tracing::warn!("engine state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(|poisoned| {
            tracing::warn!("engine state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn goal_board(&self) -> MutexGuard<'_, GoalBoard> {
        self.goals.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("goal board lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn is_hot(&self) -> bool {
        self.bootstrapped.load(Ordering::Acquire)
    }

    fn params(&self) -> ExpansionParams {
        ExpansionParams::from(&self.config)
    }

    /// Validate, upsert, count, repair. Level 0 adjacency is fresh afterwards.
    fn apply_facts(
        &self,
        state: &mut EngineState,
        facts: impl IntoIterator<Item = Triple>,
        report: &mut IngestReport,
    ) {
        let mut accepted = 0u64;
        for (index, fact) in facts.into_iter().enumerate() {
            if let Err(error) = fact.validate() {
                tracing::warn!(index, %error, "rejected malformed fact");
                report.rejected.push(RejectedFact { index, error });
                continue;
            }
            state.store.upsert_fact(&fact);
            accepted += 1;
        }
        state.store.record_facts(accepted);
        report.accepted += accepted as usize;

        if state.store.depth() == 0 {
            return;
        }
        let base = state.store.base_mut();
        report.repairs += contradiction::repair(base, &self.policy).removed();
        if base.adjacency_stale() {
            base.refresh_adjacency();
        }
    }

    /// Expand to `depth` unless an expansion is already in flight.
    fn expand_locked(&self, state: &mut EngineState, depth: usize) -> StrataResult<ExpansionOutcome> {
        let Some(_guard) = FlagGuard::claim(&self.expanding) else {
            tracing::debug!("expansion already in flight, skipping");
            return Ok(ExpansionOutcome::Skipped);
        };
        Ok(expand::expand_store(
            &mut state.store,
            depth,
            self.scorer.as_ref(),
            &self.params(),
        )?)
    }

    /// Discover predicates not registered yet, register them, and queue their
    /// write-back facts.
    fn invent_locked(&self, state: &mut EngineState, threshold: f64) -> Vec<InventedPredicate> {
        let Some(_guard) = FlagGuard::claim(&self.inventing) else {
            tracing::debug!("invention already in flight, skipping");
            return vec![];
        };
        let params = InventionParams::from_config(&self.config, threshold);
        let found = invent::discover(&state.store, &params, |label| {
            state.invented.contains_key(label)
        });
        let mut fresh = Vec::new();
        for predicate in found {
            if state.invented.contains_key(&predicate.name) {
                continue;
            }
            tracing::info!(
                name = %predicate.name,
                members = predicate.members.len(),
                density = predicate.density,
                "invented predicate"
            );
            state.pending.extend(predicate.write_back());
            state.invented.insert(predicate.name.clone(), predicate.clone());
            fresh.push(predicate);
        }
        fresh
    }

    /// Feed queued write-back facts through ingestion, for a bounded number
    /// of rounds. Each round re-expands and re-invents.
    fn drain_writeback(&self, state: &mut EngineState, report: &mut IngestReport) -> StrataResult<()> {
        for round in 0..self.config.max_writeback_rounds {
            if state.pending.is_empty() {
                return Ok(());
            }
            let batch: Vec<Triple> = state.pending.drain(..).collect();
            tracing::debug!(round, facts = batch.len(), "draining write-back queue");
            self.apply_facts(state, batch, report);
            self.expand_locked(state, self.config.max_depth)?;
            self.invent_locked(state, self.config.invention_threshold);
        }
        if !state.pending.is_empty() {
            tracing::warn!(
                pending = state.pending.len(),
                rounds = self.config.max_writeback_rounds,
                "write-back round cap reached, leaving facts queued"
            );
        }
        Ok(())
    }

    /// Expansion to `max_depth`, invention, and write-back.
    fn full_pass(
        &self,
        state: &mut EngineState,
        threshold: f64,
        report: &mut IngestReport,
    ) -> StrataResult<ExpansionOutcome> {
        let outcome = self.expand_locked(state, self.config.max_depth)?;
        self.invent_locked(state, threshold);
        self.drain_writeback(state, report)?;
        Ok(outcome)
    }

    /// Flip cold to hot if the fact count reached the threshold. Returns
    /// whether this call made the transition.
    fn try_bootstrap(&self, state: &EngineState) -> bool {
        state.store.fact_count() >= self.config.bootstrap_threshold
            && self
                .bootstrapped
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Run the bootstrap cascade if this call crossed the threshold.
    fn bootstrap_if_due(&self, state: &mut EngineState, report: &mut IngestReport) -> StrataResult<bool> {
        if !self.try_bootstrap(state) {
            return Ok(false);
        }
        tracing::info!(
            total_facts = state.store.fact_count(),
            threshold = self.config.bootstrap_threshold,
            "bootstrap threshold reached, running cascade"
        );
        report.bootstrap_triggered = true;
        self.full_pass(state, self.config.invention_threshold, report)?;
        Ok(true)
    }

    /// The pass that follows every ingestion.
    fn settle(&self, state: &mut EngineState, report: &mut IngestReport) -> StrataResult<()> {
        // Write-back left over from an earlier call goes in first.
        if !state.pending.is_empty() {
            self.drain_writeback(state, report)?;
        }
        if !self.bootstrap_if_due(state, report)? {
            if self.is_hot() {
                self.full_pass(state, self.config.invention_threshold, report)?;
            } else {
                self.expand_locked(state, self.config.light_depth)?;
            }
        }
        report.total_facts = state.store.fact_count();
        Ok(())
    }

    /// One curiosity cycle: scan under the read lock, then post goals.
    fn scan_goals(&self) -> usize {
        let goals = {
            let state = self.read_state();
            curiosity::scan(state.store.layers(), &self.config.unknown_marker)
        };
        let added = self.goal_board().extend(goals);
        if added > 0 {
            tracing::info!(added, "curiosity scan produced new goals");
        } else {
            tracing::debug!("curiosity scan found nothing new");
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The layered knowledge graph engine.
pub struct Engine {
    core: Arc<EngineCore>,
    daemon: Mutex<Option<CuriosityDaemon>>,
}

impl Engine {
    /// Create an engine using the common-neighbour scorer.
    pub fn new(config: EngineConfig) -> StrataResult<Self> {
        Self::with_scorer(config, CommonNeighborScorer)
    }

    /// Create an engine with a custom edge scorer.
    pub fn with_scorer(config: EngineConfig, scorer: impl EdgeScorer + 'static) -> StrataResult<Self> {
        config.validate()?;
        tracing::info!(
            max_depth = config.max_depth,
            bootstrap_threshold = config.bootstrap_threshold,
            scorer = scorer.name(),
            "initializing strata engine"
        );
        let policy = MutexPolicy::from_pairs(config.mutex_pairs.clone());
        Ok(Self {
            core: Arc::new(EngineCore {
                config,
                policy,
                scorer: Box::new(scorer),
                state: RwLock::new(EngineState::default()),
                bootstrapped: AtomicBool::new(false),
                expanding: AtomicBool::new(false),
                inventing: AtomicBool::new(false),
                goals: Mutex::new(GoalBoard::new()),
            }),
            daemon: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.core.is_hot()
    }

    /// Total facts accepted so far, write-back included.
    pub fn fact_count(&self) -> u64 {
        self.core.read_state().store.fact_count()
    }

    /// Number of layers currently present.
    pub fn depth(&self) -> usize {
        self.core.read_state().store.depth()
    }

    /// Ingest a batch of facts.
    ///
    /// Malformed facts are reported and skipped; the rest commit. Afterwards
    /// the whole of level 0 is repaired, and a light or full expansion runs
    /// depending on bootstrap state. The call that crosses the bootstrap
    /// threshold also starts the curiosity daemon.
    pub fn ingest(&self, facts: Vec<Triple>) -> StrataResult<IngestReport> {
        let mut report = IngestReport::default();
        {
            let mut state = self.core.write_state();
            self.core.apply_facts(&mut state, facts, &mut report);
            self.core.settle(&mut state, &mut report)?;
        }
        if report.bootstrap_triggered {
            self.start_curiosity()?;
        }
        Ok(report)
    }

    /// Wildcard match across one level, or all levels in ascending order.
    ///
    /// A level beyond the current depth yields no matches.
    pub fn query(&self, pattern: &Pattern, level: Option<usize>, limit: usize) -> Vec<QueryMatch> {
        let state = self.core.read_state();
        let layers = state.store.layers();
        let selected = match level {
            Some(k) => layers.get(k..=k).unwrap_or(&[]),
            None => layers,
        };
        let (s, p, o) = pattern;
        let hit = |want: &Option<Label>, got: &str| want.as_deref().is_none_or(|w| w == got);

        selected
            .iter()
            .flat_map(|layer| {
                let level = layer.level();
                layer.edges().into_iter().map(move |e| (level, e))
            })
            .filter(|(_, e)| hit(s, &e.subject) && hit(p, &e.predicate) && hit(o, &e.object))
            .take(limit)
            .map(|(level, e)| QueryMatch {
                subject: e.subject,
                predicate: e.predicate,
                object: e.object,
                confidence: e.weight,
                level,
            })
            .collect()
    }

    /// Snapshot of per-level counts, inventions, bootstrap state and goals.
    pub fn stats(&self) -> EngineStats {
        let marker = &self.core.config.unknown_marker;
        let (levels, invented, total_facts, pending) = {
            let state = self.core.read_state();
            let levels = state
                .store
                .layers()
                .iter()
                .map(|layer| LevelStats {
                    level: layer.level(),
                    nodes: layer.node_count(),
                    edges: layer.edge_count(),
                    unknown_ratio: curiosity::unknown_ratio(layer, marker),
                })
                .collect();
            (
                levels,
                state.invented.values().cloned().collect(),
                state.store.fact_count(),
                state.pending.len(),
            )
        };
        EngineStats {
            levels,
            invented,
            bootstrap: BootstrapStatus {
                bootstrapped: self.is_bootstrapped(),
                total_facts,
                threshold: self.core.config.bootstrap_threshold,
            },
            goals: self.goals(),
            daemon_running: self.curiosity_running(),
            pending_writeback: pending,
        }
    }

    /// Rebuild derived layers on demand.
    ///
    /// A cold engine gets a light pass unless `force` is set. A full pass
    /// also runs invention and drains write-back. Returns
    /// [`ExpansionOutcome::Skipped`] at once if an expansion is in flight.
    pub fn expand(&self, force: bool) -> StrataResult<ExpansionOutcome> {
        if self.core.expanding.load(Ordering::Acquire) {
            tracing::debug!("expansion already in flight, skipping");
            return Ok(ExpansionOutcome::Skipped);
        }
        let mut report = IngestReport::default();
        let outcome = {
            let mut state = self.core.write_state();
            let outcome = if force || self.core.is_hot() {
                self.core
                    .full_pass(&mut state, self.core.config.invention_threshold, &mut report)?
            } else {
                self.core.expand_locked(&mut state, self.core.config.light_depth)?
            };
            self.core.bootstrap_if_due(&mut state, &mut report)?;
            outcome
        };
        if report.bootstrap_triggered {
            self.start_curiosity()?;
        }
        Ok(outcome)
    }

    /// Run predicate invention on the current deepest layer.
    ///
    /// Returns only predicates not invented before. Their facts are written
    /// back through the bounded write-back loop.
    pub fn invent(&self, threshold: f64) -> StrataResult<Vec<InventedPredicate>> {
        if self.core.inventing.load(Ordering::Acquire) {
            tracing::debug!("invention already in flight, skipping");
            return Ok(vec![]);
        }
        let mut report = IngestReport::default();
        let invented = {
            let mut state = self.core.write_state();
            let invented = self.core.invent_locked(&mut state, threshold);
            self.core.drain_writeback(&mut state, &mut report)?;
            self.core.bootstrap_if_due(&mut state, &mut report)?;
            invented
        };
        if report.bootstrap_triggered {
            self.start_curiosity()?;
        }
        Ok(invented)
    }

    /// Ingest placeholder facts for each label, then start the daemon.
    ///
    /// Each label gets `(anchor, involves, label)` and
    /// `(label, type, UNKNOWN_ENTITY)`.
    pub fn seed_curiosity(&self, labels: Vec<Label>) -> StrataResult<IngestReport> {
        let anchor = &self.core.config.curiosity_anchor;
        let facts = labels
            .into_iter()
            .flat_map(|label| {
                [
                    Triple::new(anchor.clone(), INVOLVES, label.clone()),
                    Triple::new(label, TYPE, UNKNOWN_ENTITY),
                ]
            })
            .collect();
        let report = self.ingest(facts)?;
        self.start_curiosity()?;
        Ok(report)
    }

    /// Start the curiosity daemon. Returns `false` if it was already running.
    pub fn start_curiosity(&self) -> StrataResult<bool> {
        let mut slot = self.daemon_slot();
        if slot.as_ref().is_some_and(CuriosityDaemon::is_running) {
            return Ok(false);
        }
        let core = Arc::clone(&self.core);
        let daemon = CuriosityDaemon::spawn(core.config.curiosity_interval(), move || {
            core.scan_goals();
        })?;
        *slot = Some(daemon);
        Ok(true)
    }

    /// Stop the curiosity daemon if it is running.
    pub fn stop_curiosity(&self) {
        if let Some(mut daemon) = self.daemon_slot().take() {
            daemon.stop();
        }
    }

    pub fn curiosity_running(&self) -> bool {
        self.daemon_slot()
            .as_ref()
            .is_some_and(CuriosityDaemon::is_running)
    }

    /// Run one curiosity scan now. Returns the number of new goals.
    pub fn scan_now(&self) -> usize {
        self.core.scan_goals()
    }

    /// All goals in creation order.
    pub fn goals(&self) -> Vec<Goal> {
        self.core.goal_board().goals().to_vec()
    }

    /// Block-tridiagonal matrix of all layers.
    ///
    /// Block `(k, k)` is level k's adjacency, blocks `(k, k+1)` and
    /// `(k+1, k)` are level k's adjacency. Every block is zero-padded or cut
    /// to level 0's node count.
    pub fn block_matrix(&self) -> Array2<f64> {
        let state = self.core.read_state();
        let layers = state.store.layers();
        let Some(base) = layers.first() else {
            return Array2::zeros((0, 0));
        };
        let n = base.node_count();
        let depth = layers.len();
        let mut out = Array2::<f64>::zeros((n * depth, n * depth));

        let mut place = |row: usize, col: usize, adj: &Array2<f64>| {
            let m = adj.nrows().min(n);
            out.slice_mut(s![row * n..row * n + m, col * n..col * n + m])
                .assign(&adj.slice(s![..m, ..m]));
        };
        for (k, layer) in layers.iter().enumerate() {
            place(k, k, layer.adjacency());
            if k + 1 < depth {
                place(k, k + 1, layer.adjacency());
                place(k + 1, k, layer.adjacency());
            }
        }
        out
    }

    /// JSON snapshot of one level, or all levels, plus bootstrap metadata.
    pub fn export(&self, level: Option<usize>) -> StrataResult<serde_json::Value> {
        let snapshot = {
            let state = self.core.read_state();
            let layers = state.store.layers();
            let selected = match level {
                Some(k) => layers.get(k..=k).unwrap_or(&[]),
                None => layers,
            };
            Snapshot {
                bootstrapped: self.is_bootstrapped(),
                total_facts: state.store.fact_count(),
                depth: layers.len(),
                invented: state.invented.values().cloned().collect(),
                layers: selected
                    .iter()
                    .map(|layer| LayerSnapshot {
                        level: layer.level(),
                        nodes: layer.labels(),
                        edges: layer.edges(),
                    })
                    .collect(),
            }
        };
        serde_json::to_value(snapshot).map_err(|e| {
            ExportError::Json {
                message: e.to_string(),
            }
            .into()
        })
    }

    fn daemon_slot(&self) -> MutexGuard<'_, Option<CuriosityDaemon>> {
        self.daemon.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("daemon slot lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop_curiosity();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.core.config)
            .field("scorer", &self.core.scorer.name())
            .field("bootstrapped", &self.is_bootstrapped())
            .finish()
    }
}
