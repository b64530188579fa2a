//! End-to-end integration tests for the strata engine.
//!
//! These tests drive the public `Engine` API through ingestion, repair,
//! bootstrap, expansion, invention, curiosity and query, and check that the
//! pieces agree with each other.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use strata_kg::config::EngineConfig;
use strata_kg::engine::Engine;
use strata_kg::graph::Triple;
use strata_kg::invent::{INVENTED_PREDICATE, IS_A, MEMBER_OF, predicate_name};

fn engine_with(config: EngineConfig) -> Engine {
    Engine::new(config).unwrap()
}

fn test_engine() -> Engine {
    engine_with(EngineConfig::default())
}

fn clique(members: &[&str], predicate: &str) -> Vec<Triple> {
    let mut facts = Vec::new();
    for s in members {
        for o in members {
            if s != o {
                facts.push(Triple::new(*s, predicate, *o));
            }
        }
    }
    facts
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[test]
fn bootstrap_fires_on_fiftieth_fact() {
    let engine = test_engine();
    for i in 0..49 {
        let report = engine
            .ingest(vec![Triple::new(format!("n{i}"), "next", format!("n{}", i + 1))])
            .unwrap();
        assert!(!report.bootstrap_triggered, "fired early at fact {}", i + 1);
        assert_eq!(report.total_facts, i + 1);
    }
    assert!(!engine.is_bootstrapped());
    assert!(!engine.curiosity_running());

    let report = engine
        .ingest(vec![Triple::new("n49", "next", "n50")])
        .unwrap();
    assert!(report.bootstrap_triggered);
    assert!(engine.is_bootstrapped());

    let stats = engine.stats();
    assert!(stats.bootstrap.bootstrapped);
    assert_eq!(stats.levels.len(), engine.config().max_depth);
    assert!(stats.levels.iter().all(|l| l.nodes > 0));
    assert!(stats.daemon_running);
}

#[test]
fn bootstrap_fires_exactly_once() {
    let engine = engine_with(EngineConfig {
        bootstrap_threshold: 3,
        ..Default::default()
    });
    let mut fired = 0;
    for i in 0..8 {
        let report = engine
            .ingest(vec![Triple::new("hub", "has", format!("leaf{i}"))])
            .unwrap();
        fired += usize::from(report.bootstrap_triggered);
    }
    assert_eq!(fired, 1);
    assert!(engine.is_bootstrapped());
}

// ---------------------------------------------------------------------------
// Repair and upsert
// ---------------------------------------------------------------------------

#[test]
fn stronger_opposite_replaces_weaker() {
    let engine = test_engine();
    engine
        .ingest(vec![Triple::new("X", "loves", "Y").with_weight(0.9)])
        .unwrap();
    let report = engine
        .ingest(vec![Triple::new("X", "hates", "Y").with_weight(0.95)])
        .unwrap();
    assert_eq!(report.repairs, 1);

    let level0 = engine.query(&(Some("X".into()), None, Some("Y".into())), Some(0), 10);
    assert_eq!(level0.len(), 1);
    assert_eq!(level0[0].predicate, "hates");
    assert!((level0[0].confidence - 0.95).abs() < 1e-12);
}

#[test]
fn reasserted_fact_updates_weight_and_counts_twice() {
    let engine = test_engine();
    engine
        .ingest(vec![Triple::new("A", "knows", "B").with_weight(0.3)])
        .unwrap();
    let report = engine
        .ingest(vec![Triple::new("A", "knows", "B").with_weight(0.7)])
        .unwrap();
    assert_eq!(report.total_facts, 2);
    assert_eq!(engine.fact_count(), 2);

    let level0 = engine.query(&(None, None, None), Some(0), 10);
    assert_eq!(level0.len(), 1);
    assert!((level0[0].confidence - 0.7).abs() < 1e-12);
    assert_eq!(engine.stats().levels[0].edges, 1);
}

#[test]
fn contradiction_within_one_batch_is_repaired() {
    let engine = test_engine();
    let report = engine
        .ingest(vec![
            Triple::new("ada", "bornIn", "london").with_weight(0.4),
            Triple::new("ada", "diedIn", "london").with_weight(0.8),
            Triple::new("ada", "worksAt", "lab"),
        ])
        .unwrap();
    assert_eq!(report.repairs, 1);
    let hits = engine.query(&(Some("ada".into()), None, Some("london".into())), Some(0), 10);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].predicate, "diedIn");
}

// ---------------------------------------------------------------------------
// Curiosity
// ---------------------------------------------------------------------------

#[test]
fn seeded_unknowns_produce_one_goal_each() {
    let engine = engine_with(EngineConfig {
        curiosity_interval_ms: 50,
        ..Default::default()
    });
    engine
        .seed_curiosity(vec!["glyph_a".into(), "glyph_b".into(), "glyph_c".into()])
        .unwrap();
    assert!(engine.curiosity_running());

    std::thread::sleep(Duration::from_millis(400));
    let goals = engine.goals();
    assert_eq!(goals.len(), 3, "goals: {goals:?}");
    let targets: BTreeSet<&str> = goals.iter().map(|g| g.target_entity.as_str()).collect();
    assert_eq!(targets, BTreeSet::from(["glyph_a", "glyph_b", "glyph_c"]));

    // Further scans do not repeat goals.
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(engine.goals().len(), 3);

    engine.stop_curiosity();
    assert!(!engine.curiosity_running());
}

#[test]
fn unknown_ratio_reported_per_level() {
    let engine = test_engine();
    engine
        .ingest(vec![
            Triple::new("a", "knows", "UNKNOWN_1"),
            Triple::new("a", "knows", "b"),
        ])
        .unwrap();
    let stats = engine.stats();
    assert!((stats.levels[0].unknown_ratio - 0.5).abs() < 1e-12);
    assert!(engine.scan_now() >= 1);
    assert_eq!(engine.scan_now(), 0);
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[test]
fn query_respects_limit_order_and_pattern() {
    let engine = test_engine();
    let mut facts: Vec<Triple> = (0..6)
        .map(|i| Triple::new("X", "links", format!("t{i}")))
        .collect();
    facts.push(Triple::new("t0", "links", "t1"));
    engine.ingest(facts).unwrap();
    engine.expand(true).unwrap();

    let hits = engine.query(&(Some("X".into()), None, None), None, 5);
    assert_eq!(hits.len(), 5);
    assert!(hits.iter().all(|h| h.subject == "X"));
    assert!(hits.windows(2).all(|w| w[0].level <= w[1].level));

    let all = engine.query(&(Some("X".into()), None, None), None, 1000);
    let levels: BTreeSet<usize> = all.iter().map(|h| h.level).collect();
    assert!(levels.len() > 1, "derived levels should match too");
    assert!(all.windows(2).all(|w| w[0].level <= w[1].level));
}

// ---------------------------------------------------------------------------
// Invention
// ---------------------------------------------------------------------------

#[test]
fn bootstrap_cascade_invents_and_writes_back() {
    let engine = engine_with(EngineConfig {
        bootstrap_threshold: 24,
        ..Default::default()
    });
    let mut facts = clique(&["a", "b", "c", "d"], "knows");
    facts.extend(clique(&["p", "q", "r", "s"], "trades"));
    let report = engine.ingest(facts).unwrap();
    assert!(report.bootstrap_triggered);

    let stats = engine.stats();
    assert!(!stats.invented.is_empty());
    let names: HashSet<&str> = stats.invented.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names.len(), stats.invented.len());
    for p in &stats.invented {
        assert!(p.density > engine.config().invention_threshold);
        assert!(p.members.len() >= engine.config().min_cluster_size);
    }

    // The first clique is invented and written back as ordinary level-0 facts.
    let members = ["a", "b", "c", "d"].map(String::from);
    let name = predicate_name(&members);
    let first = stats
        .invented
        .iter()
        .find(|p| p.name == name)
        .expect("the first clique should be invented");
    let is_a = engine.query(
        &(Some(first.name.clone()), Some(IS_A.into()), Some(INVENTED_PREDICATE.into())),
        Some(0),
        1,
    );
    assert_eq!(is_a.len(), 1);
    let membership = engine.query(&(None, Some(MEMBER_OF.into()), Some(first.name.clone())), Some(0), 100);
    assert_eq!(membership.len(), first.members.len());
    assert!(engine.fact_count() > 24);
}

#[test]
fn manual_invention_never_reemits_a_name() {
    let engine = engine_with(EngineConfig {
        bootstrap_threshold: 12,
        ..Default::default()
    });
    engine.ingest(clique(&["a", "b", "c", "d"], "knows")).unwrap();
    let before: HashSet<String> = engine.stats().invented.into_iter().map(|p| p.name).collect();
    assert!(!before.is_empty());

    let again = engine.invent(engine.config().invention_threshold).unwrap();
    assert!(again.iter().all(|p| !before.contains(&p.name)));
}

#[test]
fn sparse_graph_invents_nothing() {
    let engine = test_engine();
    engine
        .ingest(vec![Triple::new("a", "knows", "b"), Triple::new("c", "knows", "d")])
        .unwrap();
    engine.expand(true).unwrap();
    assert!(engine.invent(0.1).unwrap().is_empty());
    assert!(engine.stats().invented.is_empty());
}

#[test]
fn invention_settles_after_bootstrap() {
    let engine = engine_with(EngineConfig {
        bootstrap_threshold: 12,
        max_writeback_rounds: 1,
        ..Default::default()
    });
    let report = engine.ingest(clique(&["a", "b", "c", "d"], "knows")).unwrap();
    assert!(report.bootstrap_triggered);

    // One clique, one predicate: its isA fact plus four memberships went in
    // within the single allowed round, and nothing new was found after.
    let members = ["a", "b", "c", "d"].map(String::from);
    let stats = engine.stats();
    assert_eq!(stats.invented.len(), 1, "invented: {:?}", stats.invented);
    assert_eq!(stats.invented[0].name, predicate_name(&members));
    assert_eq!(stats.pending_writeback, 0);
    assert_eq!(stats.bootstrap.total_facts, 12 + 5);
    assert_eq!(report.total_facts, 12 + 5);

    for i in 0..6u64 {
        let report = engine
            .ingest(vec![Triple::new(format!("u{i}"), "likes", format!("v{i}"))])
            .unwrap();
        let stats = engine.stats();
        assert_eq!(stats.invented.len(), 1, "after call {i}: {:?}", stats.invented);
        assert_eq!(stats.pending_writeback, 0, "after call {i}");
        assert_eq!(report.total_facts, 12 + 5 + i + 1);
        // a..d, the predicate node, the sink, and two nodes per later fact
        assert_eq!(stats.levels[0].nodes, 6 + 2 * (i as usize + 1));
    }

    let names = engine.query(&(None, Some(IS_A.into()), Some(INVENTED_PREDICATE.into())), Some(0), 100);
    assert_eq!(names.len(), 1);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_ingest_and_reads() {
    let engine = Arc::new(engine_with(EngineConfig {
        bootstrap_threshold: 10_000,
        curiosity_interval_ms: 5,
        ..Default::default()
    }));
    // The daemon scans under the read lock while the writers ingest.
    engine.seed_curiosity(vec!["glyph".into()]).unwrap();
    assert!(engine.curiosity_running());

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for i in 0..10 {
                    let predicate = if i % 2 == 0 { "loves" } else { "hates" };
                    engine
                        .ingest(vec![
                            Triple::new(format!("w{t}"), predicate, "target").with_weight(i as f64),
                            Triple::new(format!("w{t}"), "knows", format!("k{i}")),
                        ])
                        .unwrap();
                }
            })
        })
        .collect();
    let reader = {
        let engine = Arc::clone(&engine);
        std::thread::spawn(move || {
            for _ in 0..20 {
                let _ = engine.stats();
                let _ = engine.query(&(None, None, None), None, 10);
                let _ = engine.expand(false).unwrap();
            }
        })
    };
    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();
    std::thread::sleep(Duration::from_millis(100));

    assert!(engine.curiosity_running());
    assert!(engine.goals().iter().any(|g| g.target_entity == "glyph"));
    engine.stop_curiosity();

    assert_eq!(engine.fact_count(), 2 + 80);
    for t in 0..4 {
        let hits = engine.query(&(Some(format!("w{t}")), None, Some("target".into())), Some(0), 10);
        assert_eq!(hits.len(), 1, "opposites survived for w{t}: {hits:?}");
        assert_eq!(hits[0].predicate, "hates");
    }
}

// ---------------------------------------------------------------------------
// Export and block matrix
// ---------------------------------------------------------------------------

#[test]
fn export_and_block_matrix_cover_all_levels() {
    let engine = test_engine();
    engine.ingest(clique(&["a", "b", "c"], "knows")).unwrap();
    engine.expand(true).unwrap();
    let depth = engine.depth();

    let json = engine.export(None).unwrap();
    assert_eq!(json["layers"].as_array().unwrap().len(), depth);
    assert_eq!(json["depth"], depth);

    let nodes = engine.stats().levels[0].nodes;
    assert_eq!(engine.block_matrix().dim(), (nodes * depth, nodes * depth));
}
