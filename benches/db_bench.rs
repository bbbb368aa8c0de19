// Read/write performance benchmarks for DeepDB

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use deepdb::{Db, DbKind, Options};
use std::hint::black_box;
use tempfile::TempDir;

fn benchmark_sequential_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_write");

    for size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let db = Db::open(dir.path().join("bench.db"), Options::default()).unwrap();

                for i in 0..size {
                    let key = format!("key{:08}", i);
                    let value = format!("value{:08}", i);
                    db.put(key.as_bytes(), value.as_bytes()).unwrap();
                }

                black_box(&db);
            });
        });
    }

    group.finish();
}

fn benchmark_random_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_read");

    for size in [1000, 10000].iter() {
        group.throughput(Throughput::Elements(100));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let db = Db::open(dir.path().join("bench.db"), Options::default()).unwrap();
            for i in 0..size {
                let key = format!("key{:08}", i);
                let value = format!("value{:08}", i);
                db.put(key.as_bytes(), value.as_bytes()).unwrap();
            }

            use rand::Rng;
            let mut rng = rand::rng();

            b.iter(|| {
                for _ in 0..100 {
                    let i = rng.random_range(0..size);
                    let key = format!("key{:08}", i);
                    black_box(db.get(key.as_bytes()).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn benchmark_list_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_push");

    for size in [100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                let db = Db::open(
                    dir.path().join("bench.db"),
                    Options::new().kind(DbKind::List),
                )
                .unwrap();

                for i in 0..size {
                    db.push([format!("element{:08}", i)]).unwrap();
                }

                black_box(&db);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_sequential_write,
    benchmark_random_read,
    benchmark_list_push
);
criterion_main!(benches);
