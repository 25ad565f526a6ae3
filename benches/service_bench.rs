use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use kvrpc::{KvsService, SledEngine};
use rand::prelude::*;
use tempfile::TempDir;

fn open_service() -> (TempDir, KvsService<SledEngine>, kvrpc::Handle) {
    let temp_dir = TempDir::new().unwrap();
    let service = KvsService::<SledEngine>::new();
    let handle = service
        .open(temp_dir.path().join("db").to_str().unwrap())
        .unwrap();
    (temp_dir, service, handle)
}

fn write_bench(c: &mut Criterion) {
    c.bench_function("put", |b| {
        b.iter_batched(
            open_service,
            |(_dir, service, handle)| {
                for i in 0..100 {
                    service
                        .put(handle, format!("key{}", i).as_bytes(), b"value")
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn read_bench(c: &mut Criterion) {
    let (_dir, service, handle) = open_service();
    for i in 0..100 {
        service
            .put(handle, format!("key{}", i).as_bytes(), b"value")
            .unwrap();
    }
    let mut rng = thread_rng();

    c.bench_function("get", |b| {
        b.iter(|| {
            let key = format!("key{}", rng.gen_range(0..100));
            service.get(handle, key.as_bytes()).unwrap();
        })
    });

    c.bench_function("multi_get", |b| {
        b.iter(|| {
            let keys: Vec<Vec<u8>> = (0..16)
                .map(|_| format!("key{}", rng.gen_range(0..100)).into_bytes())
                .collect();
            service.multi_get(handle, &keys).unwrap();
        })
    });
}

criterion_group!(benches, write_bench, read_bench);
criterion_main!(benches);
