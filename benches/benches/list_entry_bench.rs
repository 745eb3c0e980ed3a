use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zkv::database::{list_entry, varint};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_entry_encode");

    let cases = [
        ("uint7", "42".to_string()),
        ("int24", "8000000".to_string()),
        ("int64", i64::MIN.to_string()),
        ("str6", "hello".to_string()),
        ("str12", "x".repeat(1000)),
    ];
    for (name, value) in &cases {
        group.throughput(Throughput::Bytes(value.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), value, |b, v| {
            b.iter(|| black_box(list_entry::encode(black_box(v)).unwrap()));
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_entry_decode");

    for value in ["42", "-9223372036854775808", "hello world"] {
        let buf = list_entry::encode(value).unwrap();
        group.bench_with_input(BenchmarkId::new("forward", value), &buf, |b, buf| {
            b.iter(|| black_box(list_entry::decode(black_box(buf)).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("backward", value), &buf, |b, buf| {
            b.iter(|| black_box(list_entry::decode_last(black_box(buf)).unwrap()));
        });
    }
    group.finish();
}

fn bench_varint(c: &mut Criterion) {
    let values: Vec<i64> = (0..1000).map(|i| (i * 7919) - 500_000).collect();
    c.bench_function("varint_zigzag_roundtrip_1000", |b| {
        b.iter(|| {
            for &v in &values {
                let bytes = varint::encode_int(black_box(v));
                black_box(varint::decode_int(&bytes));
            }
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_varint);
criterion_main!(benches);
