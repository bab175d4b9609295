//! Benchmarks for the counter store and limiters.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use roastify_core::limits::{CounterStore, RateLimitConfig, RateLimiter, UpstreamQuota};
use std::sync::Arc;
use std::time::Duration;

fn bench_counter_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_check");
    group.throughput(Throughput::Elements(1));

    let store = CounterStore::new();
    group.bench_function("single_key_admitted", |b| { b.iter(|| black_box(store.check("hot", Duration::from_secs(60), u64::MAX))); });

    let saturated = CounterStore::new();
    saturated.check("full", Duration::from_secs(3_600), 1);
    group.bench_function("single_key_rejected", |b| { b.iter(|| black_box(saturated.check("full", Duration::from_secs(3_600), 1))); });

    for keys in [100usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("many_keys", keys), &keys, |b, &keys| {
            let store = CounterStore::new();
            let names: Vec<String> = (0..keys).map(|i| format!("api:10.0.{}.{}:/api/ai", i / 256, i % 256)).collect();
            let mut i = 0;
            b.iter(|| { black_box(store.check(&names[i % keys], Duration::from_secs(60), 1_000_000)); i += 1; });
        });
    }
    group.finish();
}

fn bench_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");
    let store = Arc::new(CounterStore::new());
    let limiter = RateLimiter::new(RateLimiter::AI, RateLimitConfig::builder().max_requests(u64::MAX).build(), store.clone());
    let quota = UpstreamQuota::new(u64::MAX, store);

    group.bench_function("check", |b| { b.iter(|| black_box(limiter.check("192.0.2.1", "/api/ai"))); });
    group.bench_function("quota_acquire", |b| { b.iter(|| black_box(quota.acquire().is_ok())); });
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_sweep");
    for size in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let store = CounterStore::new();
            for i in 0..size {
                store.check(&format!("k{i}"), Duration::from_secs(60), 10);
            }
            b.iter(|| black_box(store.sweep()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_counter_check, bench_limiter, bench_sweep);
criterion_main!(benches);
