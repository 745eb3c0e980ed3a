use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use zkv::{BloomFilter, BloomOptions, CountMinSketch, CuckooFilter, CuckooOptions};

fn keys(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("key:{i}").into_bytes()).collect()
}

fn bench_bloom(c: &mut Criterion) {
    let mut group = c.benchmark_group("bloom");
    let items = keys(10_000);

    for &rate in &[0.01f64, 0.001] {
        let opts = BloomOptions::new(rate, 10_000).unwrap();
        group.bench_with_input(BenchmarkId::new("add_10k", rate), &opts, |b, &opts| {
            b.iter(|| {
                let mut bf = BloomFilter::with_rng(opts, &mut StdRng::seed_from_u64(1)).unwrap();
                for item in &items {
                    black_box(bf.add(item).unwrap());
                }
            });
        });
    }

    let mut bf =
        BloomFilter::with_rng(BloomOptions::new(0.01, 10_000).unwrap(), &mut StdRng::seed_from_u64(1))
            .unwrap();
    for item in &items {
        bf.add(item).unwrap();
    }
    group.bench_function("exists_10k", |b| {
        b.iter(|| {
            for item in &items {
                black_box(bf.exists(item).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_cuckoo(c: &mut Criterion) {
    let mut group = c.benchmark_group("cuckoo");
    let items = keys(8_000);
    let opts = CuckooOptions::new(10_000, 4, 20, 1).unwrap();

    group.bench_function("add_8k", |b| {
        b.iter(|| {
            let mut cf = CuckooFilter::with_rng(opts, StdRng::seed_from_u64(7)).unwrap();
            for item in &items {
                black_box(cf.add(item).unwrap());
            }
        });
    });

    let mut cf = CuckooFilter::with_rng(opts, StdRng::seed_from_u64(7)).unwrap();
    for item in &items {
        cf.add(item).unwrap();
    }
    group.bench_function("contains_8k", |b| {
        b.iter(|| {
            for item in &items {
                black_box(cf.contains(item).unwrap());
            }
        });
    });
    group.finish();
}

fn bench_cms(c: &mut Criterion) {
    let items = keys(10_000);
    c.bench_function("cms_incr_by_10k", |b| {
        b.iter(|| {
            let mut cms = CountMinSketch::from_error_rate(0.001, 0.01).unwrap();
            for item in &items {
                black_box(cms.incr_by(item, 1));
            }
        });
    });

    let sources: Vec<CountMinSketch> = (0..4)
        .map(|n| {
            let mut cms = CountMinSketch::new(5, 2048).unwrap();
            for item in items.iter().skip(n * 100).take(1000) {
                cms.incr_by(item, 1);
            }
            cms
        })
        .collect();
    let refs: Vec<&CountMinSketch> = sources.iter().collect();
    c.bench_function("cms_merge_4", |b| {
        b.iter(|| {
            let mut dest = CountMinSketch::new(5, 2048).unwrap();
            dest.merge(black_box(&refs), &[]).unwrap();
            black_box(dest);
        });
    });
}

criterion_group!(benches, bench_bloom, bench_cuckoo, bench_cms);
criterion_main!(benches);
