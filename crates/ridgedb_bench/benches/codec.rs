//! Value, key and row codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ridgedb_bench::utils::{events_schema, generate_events};
use ridgedb_codec::{decode_values, encode_value, encode_values, DataValue, ValueEncoder};
use ridgedb_core::{CompositeKey, Row};

/// A three-column key mixing integer, text and timestamp components.
fn mixed_key() -> CompositeKey {
    CompositeKey::new(vec![
        DataValue::Integer(42),
        DataValue::from("alice@example.com"),
        DataValue::Timestamp(1_700_000_000_000_000),
    ])
}

/// Benchmark encoding single values.
fn bench_encode_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_value");

    group.bench_function("null", |b| {
        let value = DataValue::Null;
        b.iter(|| black_box(encode_value(black_box(&value))));
    });

    group.bench_function("integer", |b| {
        let value = DataValue::Integer(1 << 40);
        b.iter(|| black_box(encode_value(black_box(&value))));
    });

    group.bench_function("text_short", |b| {
        let value = DataValue::from("hello");
        b.iter(|| black_box(encode_value(black_box(&value))));
    });

    for size in [64, 1024, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("bytes", size), size, |b, &size| {
            let value = DataValue::Bytes(vec![0u8; size]);
            b.iter(|| black_box(encode_value(black_box(&value))));
        });
    }

    group.finish();
}

/// Benchmark composite key encoding, decoding and hashing.
fn bench_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("composite_key");
    let key = mixed_key();
    let encoded = key.to_bytes();

    group.bench_function("to_bytes", |b| b.iter(|| black_box(black_box(&key).to_bytes())));
    group.bench_function("from_bytes", |b| {
        b.iter(|| black_box(CompositeKey::from_bytes(black_box(&encoded)).unwrap()));
    });
    group.bench_function("hash_code", |b| b.iter(|| black_box(black_box(&key).hash_code())));
    group.bench_function("compare", |b| {
        let other = CompositeKey::new(vec![DataValue::Integer(42), DataValue::from("bob@example.com")]);
        b.iter(|| black_box(black_box(&key).cmp(black_box(&other))));
    });

    group.finish();
}

/// Benchmark row serialization against a schema.
fn bench_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("row");
    let schema = events_schema();

    for payload in [16usize, 256, 2048].iter() {
        let row = generate_events(1, *payload).remove(0);
        let bytes = row.serialize();
        group.throughput(Throughput::Bytes(bytes.len() as u64));

        group.bench_with_input(BenchmarkId::new("serialize", payload), &row, |b, row| {
            b.iter(|| black_box(row.serialize()));
        });
        group.bench_with_input(BenchmarkId::new("deserialize", payload), &bytes, |b, bytes| {
            b.iter(|| black_box(Row::deserialize(black_box(bytes), &schema).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark encoder reuse against the one-shot sequence encoder.
fn bench_encoder_reuse(c: &mut Criterion) {
    let values: Vec<_> = (0..100).map(DataValue::Integer).collect();

    c.bench_function("encoder_reuse_100", |b| {
        b.iter(|| {
            let mut encoder = ValueEncoder::with_capacity(512);
            for value in &values {
                encoder.encode(black_box(value));
            }
            black_box(encoder.into_bytes());
        });
    });

    c.bench_function("encode_values_100", |b| {
        b.iter(|| {
            let bytes = encode_values(black_box(&values));
            black_box(decode_values(&bytes).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_encode_value,
    bench_keys,
    bench_rows,
    bench_encoder_reuse,
);

criterion_main!(benches);
