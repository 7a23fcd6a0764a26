//! Benchmarks for consensus aggregation
//!
//! Measures banding and aggregation cost as the number of sources grows.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sentinel_consensus::{band, ConsensusAggregator};
use sentinel_history::{Reading, SourceId};

fn round(sources: usize) -> Vec<Reading> {
    (0..sources)
        .map(|i| {
            // Three loose groups plus stragglers
            let value = match i % 4 {
                0 | 1 => 10.0 + (i % 3) as f64 * 0.001,
                2 => 10.5,
                _ => 9.0 + i as f64,
            };
            Reading::new(SourceId::new(format!("source-{}", i)), value, i as u64).unwrap()
        })
        .collect()
}

/// Benchmark banding alone
fn bench_band(c: &mut Criterion) {
    let mut group = c.benchmark_group("band");
    for &n in &[5usize, 21, 64, 128] {
        let readings = round(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &readings, |b, r| {
            b.iter(|| band(black_box(r), 0.01))
        });
    }
    group.finish();
}

/// Benchmark full aggregation
fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    for &n in &[5usize, 21, 64, 128] {
        let readings = round(n);
        let aggregator = ConsensusAggregator::new((n / 3).max(2), 0.01).unwrap();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &readings, |b, r| {
            b.iter(|| aggregator.aggregate(black_box(r)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_band, bench_aggregate);
criterion_main!(benches);
