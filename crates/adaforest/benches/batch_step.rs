//! One orchestrator step per inducer: first batch (build) and a drifted
//! follow-up batch (repair, transient build).
//!
//! Run with: `cargo bench --bench batch_step`

use adaforest::induction::InducerKind;
use adaforest::model::{AdfConfig, ForestOrchestrator};
use adaforest::testing::noisy_batch;
use adaforest::{BatchStats, Parallelism};

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

// =============================================================================
// Setup
// =============================================================================

const BATCH_SIZES: [usize; 2] = [500, 2_000];
const CLASSES: [&str; 3] = ["low", "mid", "high"];

fn config(inducer: InducerKind) -> AdfConfig {
    AdfConfig::builder()
        .inducer(inducer)
        .ensemble_size(10)
        .min_leaf_size(20)
        .build()
        .unwrap()
}

fn batches(n: usize) -> (BatchStats, BatchStats) {
    let first = noisy_batch(n, 1, 0.0, 10.0, &CLASSES, 0.05);
    // shifted range and heavier noise
    let drifted = noisy_batch(n, 2, 5.0, 15.0, &CLASSES, 0.2);
    (first, drifted)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_first_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_step/first");
    for n in BATCH_SIZES {
        let (first, _) = batches(n);
        group.throughput(Throughput::Elements(n as u64));
        for inducer in [InducerKind::RandomForest, InducerKind::Heuristic, InducerKind::Hoeffding] {
            group.bench_with_input(BenchmarkId::new(inducer.code(), n), &first, |b, batch| {
                b.iter_batched(
                    || ForestOrchestrator::with_parallelism(config(inducer), Parallelism::Sequential).unwrap(),
                    |mut adf| black_box(adf.process_batch("first", batch.clone()).unwrap()),
                    BatchSize::SmallInput,
                )
            });
        }
    }
    group.finish();
}

fn bench_drifted_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_step/drifted");
    for n in BATCH_SIZES {
        let (first, drifted) = batches(n);
        group.throughput(Throughput::Elements(n as u64));
        for (label, parallelism) in [("seq", Parallelism::Sequential), ("par", Parallelism::Parallel)] {
            let trained = || {
                let mut adf = ForestOrchestrator::with_parallelism(config(InducerKind::RandomForest), parallelism).unwrap();
                adf.process_batch("first", first.clone()).unwrap();
                adf
            };
            group.bench_with_input(BenchmarkId::new(label, n), &drifted, |b, batch| {
                b.iter_batched(
                    &trained,
                    |mut adf| black_box(adf.process_batch("drifted", batch.clone()).unwrap()),
                    BatchSize::LargeInput,
                )
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_first_batch, bench_drifted_batch);
criterion_main!(benches);
