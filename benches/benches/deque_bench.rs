use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zkv::{BasicDeque, DequeOps, InsertPosition, SegmentedDeque};

const OPS: usize = 10_000;

fn bench_rpush(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque_rpush");
    group.throughput(Throughput::Elements(OPS as u64));

    for &node_size in &[64usize, 256, 4096] {
        group.bench_with_input(
            BenchmarkId::new("segmented", node_size),
            &node_size,
            |b, &size| {
                b.iter(|| {
                    let mut d = SegmentedDeque::with_min_node_size(size).unwrap();
                    for i in 0..OPS {
                        d.rpush(black_box(if i % 2 == 0 { "value" } else { "12345" }))
                            .unwrap();
                    }
                    black_box(d);
                });
            },
        );
    }

    group.bench_function("basic", |b| {
        b.iter(|| {
            let mut d = BasicDeque::new();
            for i in 0..OPS {
                d.rpush(black_box(if i % 2 == 0 { "value" } else { "12345" }))
                    .unwrap();
            }
            black_box(d);
        });
    });

    group.finish();
}

fn bench_lpush(c: &mut Criterion) {
    let mut group = c.benchmark_group("deque_lpush");
    group.throughput(Throughput::Elements(OPS as u64));

    group.bench_function("segmented", |b| {
        b.iter(|| {
            let mut d = SegmentedDeque::new();
            for _ in 0..OPS {
                d.lpush(black_box("value")).unwrap();
            }
            black_box(d);
        });
    });

    group.bench_function("basic", |b| {
        b.iter(|| {
            let mut d = BasicDeque::new();
            for _ in 0..OPS {
                d.lpush(black_box("value")).unwrap();
            }
            black_box(d);
        });
    });

    group.finish();
}

fn filled() -> SegmentedDeque {
    let mut d = SegmentedDeque::new();
    for i in 0..OPS {
        d.rpush(&format!("item-{i}")).unwrap();
    }
    d
}

fn bench_pop_both_ends(c: &mut Criterion) {
    c.bench_function("deque_pop_both_ends_10k", |b| {
        b.iter_batched(
            filled,
            |mut d| {
                while !d.is_empty() {
                    black_box(d.lpop().unwrap());
                    if !d.is_empty() {
                        black_box(d.rpop().unwrap());
                    }
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_lrange_and_linsert(c: &mut Criterion) {
    let d = filled();
    c.bench_function("deque_lrange_tail_100", |b| {
        b.iter(|| black_box(d.lrange(black_box(-100), -1).unwrap()));
    });

    c.bench_function("deque_linsert_middle", |b| {
        b.iter_batched(
            filled,
            |mut d| {
                black_box(
                    d.linsert("item-5000", "inserted", InsertPosition::Before)
                        .unwrap(),
                )
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    bench_rpush,
    bench_lpush,
    bench_pop_both_ends,
    bench_lrange_and_linsert
);
criterion_main!(benches);
