//! # Query Benchmarks
//!
//! Performance benchmarks for HashEqual ingestion and traversal.
//!
//! Run with: `cargo bench -p hasheq-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use hasheq_core::{
    ArtifactPattern, ArtifactSpec, Context, Graph, HashEqualFilter, HashEqualInput,
    HashEqualLedger,
};
use std::hint::black_box;

fn spec(i: usize) -> ArtifactSpec {
    ArtifactSpec::new("sha256", format!("{i:064x}"))
}

/// Ledger with `size` artifacts chained as 0≡1, 1≡2, ...
fn create_chain(size: usize) -> HashEqualLedger<Graph> {
    let ledger = HashEqualLedger::new(Graph::new());
    let ctx = Context::background();
    for i in 0..size {
        ledger.register_artifact(&ctx, &spec(i)).expect("register");
    }
    let input = HashEqualInput::new("bench", "criterion", "chain");
    for i in 1..size {
        ledger
            .ingest_hash_equal(&ctx, &spec(i - 1), &spec(i), &input)
            .expect("ingest");
    }
    ledger
}

/// Ledger with one hub artifact equal to `size - 1` spokes.
fn create_star(size: usize) -> HashEqualLedger<Graph> {
    let ledger = HashEqualLedger::new(Graph::new());
    let ctx = Context::background();
    for i in 0..size {
        ledger.register_artifact(&ctx, &spec(i)).expect("register");
    }
    let input = HashEqualInput::new("bench", "criterion", "star");
    for i in 1..size {
        // Alternate direction so both traversal branches are exercised.
        let (left, right) = if i % 2 == 0 { (0, i) } else { (i, 0) };
        ledger
            .ingest_hash_equal(&ctx, &spec(left), &spec(right), &input)
            .expect("ingest");
    }
    ledger
}

fn pattern(i: usize) -> ArtifactPattern {
    let s = spec(i);
    ArtifactPattern::exact(s.algorithm, s.digest)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest_chain");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_chain(size)));
        });
    }

    group.finish();
}

fn bench_query_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_single_pattern");

    for size in [100, 1000, 10000].iter() {
        let ledger = create_star(*size);
        let filter = HashEqualFilter::artifacts(vec![pattern(0)]);
        let ctx = Context::background();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ledger.hash_equal(&ctx, &filter).expect("query")));
        });
    }

    group.finish();
}

fn bench_query_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_pair_pattern");

    for size in [100, 1000, 10000].iter() {
        let ledger = create_star(*size);
        let filter = HashEqualFilter::artifacts(vec![pattern(size - 1), pattern(0)]);
        let ctx = Context::background();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ledger.hash_equal(&ctx, &filter).expect("query")));
        });
    }

    group.finish();
}

fn bench_query_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_all");

    for size in [100, 1000].iter() {
        let ledger = create_chain(*size);
        let filter = HashEqualFilter::default();
        let ctx = Context::background();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(ledger.hash_equal(&ctx, &filter).expect("query")));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ingest,
    bench_query_single,
    bench_query_pair,
    bench_query_all
);
criterion_main!(benches);
