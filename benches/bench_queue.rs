//! Throughput benchmark for the bounded job queue, exercised through the
//! public `ThreadPool` API (the queue itself is a private implementation
//! detail). Grounded on the teacher's `[[bench]]` convention in
//! `examples/shadow-shadow/Cargo.toml`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use thpool::{ThreadPool, ThreadPoolConfig};

fn bench_unbounded_throughput(c: &mut Criterion) {
    c.bench_function("unbounded_queue_4_workers_1000_jobs", |b| {
        b.iter_batched(
            || {
                let pool: ThreadPool<()> =
                    ThreadPool::new(ThreadPoolConfig::new("bench", 4)).unwrap();
                let counter = Arc::new(AtomicUsize::new(0));
                (pool, counter)
            },
            |(pool, counter)| {
                for _ in 0..1000 {
                    let counter = Arc::clone(&counter);
                    pool.add_work(move |_w| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    })
                    .unwrap();
                }
                pool.wait().unwrap();
                assert_eq!(counter.load(Ordering::Relaxed), 1000);
                pool.shutdown().unwrap();
                pool.destroy().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_bounded_back_pressure(c: &mut Criterion) {
    c.bench_function("bounded_queue_max8_2_workers_200_jobs", |b| {
        b.iter_batched(
            || {
                ThreadPool::<()>::new(ThreadPoolConfig::new("bbp", 2).with_work_num_max(8))
                    .unwrap()
            },
            |pool| {
                for _ in 0..200 {
                    pool.add_work(|_w| {}).unwrap();
                }
                pool.wait().unwrap();
                pool.shutdown().unwrap();
                pool.destroy().unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_unbounded_throughput, bench_bounded_back_pressure);
criterion_main!(benches);
