//! Queue throughput benchmark
//!
//! Measures the hot path: push → dispatch → complete → release, for the
//! callback engine with a synchronous worker and for the async adaptor.

use std::convert::Infallible;
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use tokio::runtime::Runtime;

use everruns_queue::{AsyncQueue, Done, Queue, QueueConfig};

/// Synchronous worker: every push runs to completion before returning
fn bench_callback_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_throughput/callback_sync");
    group.throughput(Throughput::Elements(1));

    for concurrency in [1usize, 16] {
        let queue = Queue::new(
            |value: u64, done: Done<u64, Infallible>| done.ok(value + 1),
            concurrency,
        )
        .unwrap();
        let sum = Arc::new(AtomicU64::new(0));

        group.bench_with_input(
            BenchmarkId::new("concurrency", concurrency),
            &concurrency,
            |b, _| {
                b.iter(|| {
                    let sum = Arc::clone(&sum);
                    queue.push(black_box(1), move |_, result| {
                        if let Ok(value) = result {
                            sum.fetch_add(value, Ordering::Relaxed);
                        }
                    });
                });
            },
        );
    }

    group.finish();
}

/// Paused queue filled with a backlog, then released in one go
fn bench_callback_backlog(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_throughput/callback_backlog");

    for backlog in [100u64, 1000] {
        group.throughput(Throughput::Elements(backlog));

        let config = QueueConfig::new(4).with_preallocate(backlog as usize);
        let queue = Queue::with_config(
            (),
            |_: &(), value: u64, done: Done<u64, Infallible>| done.ok(value),
            config,
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("tasks", backlog), &backlog, |b, &backlog| {
            b.iter(|| {
                queue.pause();
                for value in 0..backlog {
                    queue.push(value, |_, result| {
                        black_box(result.ok());
                    });
                }
                queue.resume();
                assert!(queue.idle());
            });
        });
    }

    group.finish();
}

/// Async adaptor: spawn, await and settle a batch of trivial futures
fn bench_async_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("queue_throughput/async_batch");
    group.sample_size(20);

    for concurrency in [1usize, 8, 64] {
        let batch = 1000u64;
        group.throughput(Throughput::Elements(batch));

        let queue: AsyncQueue<u64, u64> = rt.block_on(async {
            AsyncQueue::new(|value: u64| async move { Ok(value * 2) }, concurrency).unwrap()
        });

        group.bench_with_input(
            BenchmarkId::new("concurrency", concurrency),
            &concurrency,
            |b, _| {
                b.to_async(&rt).iter(|| async {
                    let results = join_all((0..batch).map(|value| queue.push(value))).await;
                    black_box(results);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_callback_sync,
    bench_callback_backlog,
    bench_async_batch
);
criterion_main!(benches);
