//! # Brain Benchmarks
//!
//! Performance benchmarks for learning, retrieval and history operations.
//!
//! Run with: `cargo bench -p brain-core`

use brain_core::{
    Brain, BrainConfig, EdgeType, ManualClock, MemoryStore, NodeContent, NodeContext, NodeId,
    NodeType, QueryOptions, Timestamp, Trigger,
};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

const WORDS: [&str; 12] = [
    "parser", "cache", "retry", "handler", "schema", "token", "buffer", "index", "stream",
    "lock", "config", "error",
];

fn summary(i: usize) -> String {
    format!(
        "{} {} {}",
        WORDS[i % WORDS.len()],
        WORDS[(i / 3) % WORDS.len()],
        i
    )
}

/// A brain with `size` nodes spread over a handful of files, plus a causal
/// chain through every node.
fn populated_brain(size: usize) -> (Brain, Vec<NodeId>) {
    let clock = Arc::new(ManualClock::new(Timestamp(1_700_000_000_000)));
    let mut brain = Brain::open(
        Box::new(MemoryStore::new()),
        clock.clone(),
        BrainConfig::default(),
    )
    .expect("open");

    let mut ids = Vec::with_capacity(size);
    for i in 0..size {
        clock.advance_millis(60_000);
        let node = brain
            .learn(
                NodeType::Pattern,
                NodeContent::new(summary(i), ""),
                NodeContext::file(format!("src/mod_{}.rs", i % 8)),
                &[],
            )
            .expect("learn");
        ids.push(node.id);
    }
    for pair in ids.windows(2) {
        if !brain.edges().are_connected(&pair[0], &pair[1], None) {
            brain
                .link(&pair[0], &pair[1], EdgeType::Causal, None)
                .expect("link");
        }
    }
    (brain, ids)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_learn(c: &mut Criterion) {
    let mut group = c.benchmark_group("learn");

    for size in [100, 500].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(populated_brain(size)));
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_text");

    for size in [100, 1000].iter() {
        let (brain, _) = populated_brain(*size);
        let opts = QueryOptions::text("retry handler");
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(brain.query(black_box(&opts))));
        });
    }

    group.finish();
}

fn bench_spread_activation(c: &mut Criterion) {
    let mut group = c.benchmark_group("spread_activation");

    for size in [100, 1000].iter() {
        let (brain, ids) = populated_brain(*size);
        let seeds = vec![(ids[0].clone(), 1.0), (ids[size / 2].clone(), 0.8)];
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(brain.query_engine().spread_activation(
                    black_box(&seeds),
                    3,
                    0.5,
                    0.05,
                ))
            });
        });
    }

    group.finish();
}

fn bench_find_path(c: &mut Criterion) {
    let (brain, ids) = populated_brain(1000);
    let from = ids[0].clone();
    let to = ids[20].clone();

    c.bench_function("find_path_1000", |b| {
        b.iter(|| black_box(brain.find_path(black_box(&from), black_box(&to), 32)));
    });
}

fn bench_commit_rollback(c: &mut Criterion) {
    c.bench_function("commit_then_rollback_100", |b| {
        b.iter(|| {
            let clock = Arc::new(ManualClock::new(Timestamp(0)));
            let mut brain = Brain::open(
                Box::new(MemoryStore::new()),
                clock.clone(),
                BrainConfig::default(),
            )
            .expect("open");
            brain
                .learn(NodeType::Pattern, NodeContent::new("base", ""), NodeContext::default(), &[])
                .expect("learn");
            let base = brain.commit("base", Trigger::Manual).expect("commit").expect("hash");
            for i in 0..100 {
                clock.advance_millis(1_000);
                brain
                    .learn(NodeType::Pattern, NodeContent::new(summary(i), ""), NodeContext::default(), &[])
                    .expect("learn");
            }
            brain.commit("bulk", Trigger::Auto).expect("commit");
            black_box(brain.rollback(&base).expect("rollback"))
        });
    });
}

criterion_group!(
    benches,
    bench_learn,
    bench_query,
    bench_spread_activation,
    bench_find_path,
    bench_commit_rollback,
);

criterion_main!(benches);
