//! Performance benchmarks for capture and state reconstruction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use retrace::{LocationId, Observed, Outcome, Recording, ScopeId, Session, SessionConfig, Value};
use std::sync::Arc;

fn record(steps: u64, checkpoint_interval: u64) -> Arc<Recording> {
    let mut session = Session::begin(SessionConfig {
        checkpoint_interval,
        state_cache_size: 0,
        ..Default::default()
    })
    .unwrap();

    for i in 0..steps as i64 {
        session
            .bind(ScopeId::GLOBAL, format!("v{}", i % 32), i, LocationId((i % 11) as u64))
            .unwrap();
    }
    session.end(Outcome::Completed)
}

/// Benchmark capture throughput for scalars and copied containers
fn bench_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("scalar_bind", |b| {
        b.iter(|| {
            let mut session = Session::begin(SessionConfig::default()).unwrap();
            for i in 0..1000i64 {
                session
                    .bind(ScopeId::GLOBAL, "i", black_box(i), LocationId(1))
                    .unwrap();
            }
            session.end(Outcome::Completed)
        });
    });

    for record_state in [true, false] {
        group.bench_with_input(
            BenchmarkId::new("container_update", record_state),
            &record_state,
            |b, &record_state| {
                let items: Vec<i64> = (0..64).collect();
                let snapshot = || Value::list(items.iter().copied());

                b.iter(|| {
                    let mut session = Session::begin(SessionConfig {
                        record_state,
                        ..Default::default()
                    })
                    .unwrap();
                    for _ in 0..1000 {
                        session
                            .update(
                                ScopeId::GLOBAL,
                                "xs",
                                Observed::Absent,
                                Observed::container("list", &snapshot),
                                LocationId(2),
                            )
                            .unwrap();
                    }
                    session.end(Outcome::Completed)
                });
            },
        );
    }

    group.finish();
}

/// Benchmark state(n) latency with varying checkpoint intervals
fn bench_state_reconstruction(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_reconstruction");

    for interval in [16u64, 256, 4096] {
        let recording = record(50_000, interval);
        group.bench_with_input(
            BenchmarkId::new("checkpoint_interval", interval),
            &recording,
            |b, recording| {
                let mut n = 0u64;
                b.iter(|| {
                    n = (n + 7919) % recording.steps();
                    black_box(recording.state(n).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// State latency should not grow with recording length
fn bench_recording_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("recording_length");

    for steps in [1_000u64, 10_000, 100_000] {
        let recording = record(steps, 256);
        group.bench_with_input(BenchmarkId::new("steps", steps), &recording, |b, recording| {
            let n = recording.steps() - 1;
            b.iter(|| black_box(recording.state(n).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark visit lookups
fn bench_visits(c: &mut Criterion) {
    let recording = record(100_000, 256);

    c.bench_function("visits_partition_point", |b| {
        b.iter(|| {
            let visits = recording.visits(LocationId(3));
            black_box(visits.partition_point(|s| s.0 < 50_000))
        });
    });
}

criterion_group!(
    benches,
    bench_capture,
    bench_state_reconstruction,
    bench_recording_length,
    bench_visits,
);
criterion_main!(benches);
