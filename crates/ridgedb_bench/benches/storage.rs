//! Page store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ridgedb_bench::utils::random_data;
use ridgedb_storage::{FilePageStore, InMemoryPageStore, PageId, PageStore};
use tempfile::TempDir;

const PAGE_SIZES: [usize; 3] = [512, 4096, 16384];

fn fill(store: &mut dyn PageStore, pages: usize) {
    let size = store.page_size();
    for _ in 0..pages {
        let mut page = store.allocate_page().unwrap();
        page.data_mut().copy_from_slice(&random_data(size));
        store.write_page(&page).unwrap();
    }
}

/// Benchmark page allocation.
fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_page");

    for size in PAGE_SIZES.iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("inmemory", size), size, |b, &size| {
            let mut store = InMemoryPageStore::new(size);
            b.iter(|| black_box(store.allocate_page().unwrap()));
        });
    }

    group.finish();
}

/// Benchmark rewriting one page in place.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_page");

    for size in PAGE_SIZES.iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("inmemory", size), size, |b, &size| {
            let mut store = InMemoryPageStore::new(size);
            fill(&mut store, 1);
            let page = store.read_page(PageId(0)).unwrap();
            b.iter(|| store.write_page(black_box(&page)).unwrap());
        });
    }

    group.sample_size(50);
    for size in PAGE_SIZES.iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("file", size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let mut store = FilePageStore::open(&temp_dir.path().join("bench.idx"), size).unwrap();
            fill(&mut store, 1);
            let page = store.read_page(PageId(0)).unwrap();
            b.iter(|| store.write_page(black_box(&page)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark reads in a pseudo-random page order.
fn bench_random_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_read");
    let page_count = 1_000u32;

    group.bench_function("inmemory_1000_pages", |b| {
        let mut store = InMemoryPageStore::new(4096);
        fill(&mut store, page_count as usize);
        let mut idx = 0u32;
        b.iter(|| {
            let page = store.read_page(PageId((idx * 7) % page_count)).unwrap();
            idx = (idx + 1) % page_count;
            black_box(page);
        });
    });

    group.sample_size(50);
    group.bench_function("file_1000_pages", |b| {
        let temp_dir = TempDir::new().unwrap();
        let mut store = FilePageStore::open(&temp_dir.path().join("bench.idx"), 4096).unwrap();
        fill(&mut store, page_count as usize);
        store.flush().unwrap();
        let mut idx = 0u32;
        b.iter(|| {
            let page = store.read_page(PageId((idx * 7) % page_count)).unwrap();
            idx = (idx + 1) % page_count;
            black_box(page);
        });
    });

    group.finish();
}

/// Benchmark flushing after a dirty page.
fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let mut store = FilePageStore::open(&temp_dir.path().join("bench.idx"), 4096).unwrap();
    fill(&mut store, 1);
    let page = store.read_page(PageId(0)).unwrap();

    group.bench_function("file_after_write", |b| {
        b.iter(|| {
            store.write_page(&page).unwrap();
            store.flush().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_allocate,
    bench_write,
    bench_random_read,
    bench_flush,
);

criterion_main!(benches);
