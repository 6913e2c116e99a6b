//! Benchmarks for lock acquisition latency

use criterion::{Criterion, criterion_group, criterion_main};
use lease_lock_core::prelude::*;

fn bench_memory_lock_acquisition(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let lock = rt.block_on(async { DistributedLock::new(MemoryStore::new()).unwrap() });
    let owner = LockOwner::from("bench");

    let mut group = c.benchmark_group("memory_lock");
    group.bench_function("lock_unlock", |b| {
        b.to_async(&rt).iter(|| async {
            if lock.lock("bench-lock", &owner).await {
                lock.unlock("bench-lock", &owner).await;
            }
        });
    });

    group.bench_function("reentrant_lock_unlock", |b| {
        b.to_async(&rt).iter(|| async {
            lock.lock("bench-reentrant", &owner).await;
            lock.lock("bench-reentrant", &owner).await;
            lock.unlock("bench-reentrant", &owner).await;
            lock.unlock("bench-reentrant", &owner).await;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_lock_acquisition);
criterion_main!(benches);
