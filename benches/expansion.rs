//! Benchmarks for the expansion pass.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};

use strata_kg::expand::scorer::{CommonNeighborScorer, EdgeScorer, IterativeScorer};
use strata_kg::expand::{ExpansionParams, expand_store};
use strata_kg::graph::Triple;
use strata_kg::graph::store::LevelStore;

fn random_store(nodes: usize, edges: usize) -> LevelStore {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let mut store = LevelStore::new();
    for _ in 0..edges {
        let s = rng.gen_range(0..nodes);
        let o = rng.gen_range(0..nodes);
        let fact = Triple::new(format!("n{s}"), "rel", format!("n{o}"))
            .with_weight(rng.gen_range(0.1..1.0));
        store.upsert_fact(&fact);
    }
    store.base_mut().refresh_adjacency();
    store
}

fn bench_expand(c: &mut Criterion, name: &str, scorer: &dyn EdgeScorer) {
    let params = ExpansionParams::default();
    let base = random_store(200, 800);
    c.bench_function(name, |bench| {
        bench.iter_batched(
            || {
                let mut store = LevelStore::new();
                for e in base.get_layer(0).into_iter().flat_map(|l| l.edges()) {
                    store.upsert_fact(&Triple::new(e.subject, e.predicate, e.object).with_weight(e.weight));
                }
                store
            },
            |mut store| black_box(expand_store(&mut store, 3, scorer, &params).unwrap()),
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_common_neighbor(c: &mut Criterion) {
    bench_expand(c, "expand_200n_common_neighbor", &CommonNeighborScorer);
}

fn bench_iterative(c: &mut Criterion) {
    bench_expand(c, "expand_200n_iterative", &IterativeScorer::new(10, 7));
}

criterion_group!(benches, bench_common_neighbor, bench_iterative);
criterion_main!(benches);
