//! Benchmark utilities.

use rand::seq::SliceRandom;
use rand::Rng;
use ridgedb_codec::{DataType, DataValue};
use ridgedb_core::{ColumnDef, CompositeKey, IndexConfig, Row, TableSchema};

/// Generate random bytes of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` distinct integer keys in random order.
pub fn shuffled_keys(count: usize) -> Vec<CompositeKey> {
    let mut ids: Vec<i64> = (0..count as i64).collect();
    ids.shuffle(&mut rand::thread_rng());
    ids.into_iter().map(CompositeKey::from).collect()
}

/// Index sizing used by the benchmarks.
pub fn bench_index_config() -> IndexConfig {
    IndexConfig::new().page_size(4096).capacity(64)
}

/// `events(id INTEGER, kind TEXT, payload BYTES)` keyed by `id`.
pub fn events_schema() -> TableSchema {
    TableSchema::new(
        "events",
        vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("kind", DataType::Text),
            ColumnDef::new("payload", DataType::Bytes),
        ],
        &["id"],
    )
    .expect("events schema is valid")
}

/// Generate `count` events with ids `0..count`, one of eight kinds each,
/// and a random payload of `payload_size` bytes.
pub fn generate_events(count: usize, payload_size: usize) -> Vec<Row> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|id| {
            Row::new(vec![
                DataValue::Integer(id as i64),
                DataValue::Text(format!("kind{}", rng.gen_range(0..8))),
                DataValue::Bytes(random_data(payload_size)),
            ])
        })
        .collect()
}
