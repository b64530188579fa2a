//! Curiosity: exploration goals for unresolved entities.
//!
//! A scan walks every edge of every layer and turns each edge that carries
//! the unknown marker into a [`Goal`]. Scans only read layers. Goals live on a
//! separate append-only [`GoalBoard`].
//!
//! [`CuriosityDaemon`] runs the scan on a background thread at a fixed
//! interval until it is stopped.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::graph::Label;
use crate::graph::layer::{Layer, LayerEdge};

/// Type attached to seeded placeholder entities.
pub const UNKNOWN_ENTITY: &str = "UNKNOWN_ENTITY";

/// An exploration task for an external planner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Goal {
    pub description: String,
    /// The resolved side of the edge the goal came from.
    pub target_entity: Label,
    pub created_at: DateTime<Utc>,
}

/// Goal for one edge, or `None` when no part of it carries `marker`.
///
/// An unknown object is reported before an unknown subject, and an unknown
/// predicate only when both endpoints are resolved.
pub fn goal_for(edge: &LayerEdge, marker: &str) -> Option<Goal> {
    let (description, target) = if edge.object.contains(marker) {
        (
            format!("Research identity of {} connected to {}", edge.object, edge.subject),
            &edge.subject,
        )
    } else if edge.subject.contains(marker) {
        (
            format!("Research identity of {} connected to {}", edge.subject, edge.object),
            &edge.object,
        )
    } else if edge.predicate.contains(marker) {
        (
            format!(
                "Research relationship {} between {} and {}",
                edge.predicate, edge.subject, edge.object
            ),
            &edge.subject,
        )
    } else {
        return None;
    };
    Some(Goal {
        description,
        target_entity: target.clone(),
        created_at: Utc::now(),
    })
}

/// Goals for every marked edge across `layers`, in level order.
pub fn scan(layers: &[Layer], marker: &str) -> Vec<Goal> {
    layers
        .iter()
        .flat_map(|layer| layer.edges())
        .filter_map(|edge| goal_for(&edge, marker))
        .collect()
}

/// Fraction of a layer's edges that carry `marker` anywhere. Zero for an
/// edgeless layer.
pub fn unknown_ratio(layer: &Layer, marker: &str) -> f64 {
    let edges = layer.edges();
    if edges.is_empty() {
        return 0.0;
    }
    let marked = edges
        .iter()
        .filter(|e| {
            e.subject.contains(marker) || e.predicate.contains(marker) || e.object.contains(marker)
        })
        .count();
    marked as f64 / edges.len() as f64
}

/// Append-only goal list, de-duplicated by description.
#[derive(Debug, Default)]
pub struct GoalBoard {
    goals: Vec<Goal>,
    seen: HashSet<String>,
}

impl GoalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append goals whose description is not on the board yet. Returns how
    /// many were added.
    pub fn extend(&mut self, goals: impl IntoIterator<Item = Goal>) -> usize {
        let before = self.goals.len();
        for goal in goals {
            if self.seen.insert(goal.description.clone()) {
                self.goals.push(goal);
            }
        }
        self.goals.len() - before
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Background daemon
// ---------------------------------------------------------------------------

/// Handle to the background scanning thread.
///
/// The thread waits one interval, runs `tick`, and repeats. Dropping the
/// handle or calling [`stop`](Self::stop) signals the thread and joins it.
pub struct CuriosityDaemon {
    handle: Option<JoinHandle<()>>,
    shutdown: Option<mpsc::Sender<()>>,
    running: Arc<AtomicBool>,
}

impl CuriosityDaemon {
    /// Spawn the scanning thread.
    ///
    /// A panic inside `tick` is caught and logged; the daemon keeps running.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Result<Self, EngineError>
    where
        F: FnMut() + Send + 'static,
    {
        let (shutdown, signal) = mpsc::channel::<()>();
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("strata-curiosity".into())
            .spawn(move || {
                tracing::info!(interval_ms = interval.as_millis() as u64, "curiosity daemon started");
                loop {
                    match signal.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if std::panic::catch_unwind(AssertUnwindSafe(&mut tick)).is_err() {
                        tracing::error!("curiosity scan panicked, continuing with next cycle");
                    }
                }
                flag.store(false, Ordering::SeqCst);
                tracing::info!("curiosity daemon stopped");
            })
            .map_err(|source| {
                running.store(false, Ordering::SeqCst);
                EngineError::DaemonSpawn { source }
            })?;

        Ok(Self {
            handle: Some(handle),
            shutdown: Some(shutdown),
            running,
        })
    }

    /// Whether the scanning thread is still alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal the thread and wait for it to finish its current cycle.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("curiosity daemon thread exited abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for CuriosityDaemon {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CuriosityDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CuriosityDaemon")
            .field("running", &self.is_running())
            .finish()
    }
}
