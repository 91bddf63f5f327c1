use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use http_throttle::{
    strip_port, ClassLimits, Identity, IdentityResolver, LimitPolicy, MemoryStore, Metrics,
    RateLimiter,
};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn limiter(max_requests: u32) -> RateLimiter<MemoryStore> {
    let limits = ClassLimits::new(max_requests, 3600, 60).unwrap();
    RateLimiter::new(
        MemoryStore::new(),
        Arc::new(LimitPolicy::new(limits, limits, Some("token".to_string()))),
        Metrics::new(),
    )
}

/// Benchmark identity resolution
fn bench_identity_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity_resolution");
    let resolver = IdentityResolver::new(Some("token".to_string()));

    group.bench_function("ip_v4", |b| {
        b.iter(|| resolver.resolve(black_box(None), black_box("192.168.1.1:54321")))
    });

    group.bench_function("ip_v6", |b| {
        b.iter(|| resolver.resolve(black_box(None), black_box("[2001:db8::1]:443")))
    });

    group.bench_function("trusted_token", |b| {
        b.iter(|| resolver.resolve(black_box(Some("token")), black_box("10.0.0.1:1")))
    });

    group.bench_function("strip_port", |b| {
        b.iter(|| strip_port(black_box("203.0.113.7:8080")))
    });

    group.finish();
}

/// Benchmark the admission path against the in-memory store
fn bench_admission(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("admission");
    group.throughput(Throughput::Elements(1));

    // Counter path: limit high enough to never block
    let counting = limiter(u32::MAX);
    let identity = Identity::ip("10.0.0.1");
    group.bench_function("allow_single_identity", |b| {
        b.to_async(&rt)
            .iter(|| async { counting.check(black_box(&identity)).await.unwrap() })
    });

    // Block path: first request exhausts the budget, the rest hit the marker
    let blocking = limiter(1);
    let blocked = Identity::ip("10.0.0.2");
    rt.block_on(async {
        blocking.check(&blocked).await.unwrap();
        blocking.check(&blocked).await.unwrap();
    });
    group.bench_function("deny_blocked_identity", |b| {
        b.to_async(&rt)
            .iter(|| async { blocking.check(black_box(&blocked)).await.unwrap() })
    });

    group.finish();
}

/// Benchmark how the store scales with distinct callers
fn bench_many_identities(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("many_identities");

    for count in [100, 1_000, 10_000] {
        let identities: Vec<Identity> = (0..count)
            .map(|i| Identity::ip(&format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff)))
            .collect();
        let limiter = limiter(u32::MAX);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &identities, |b, ids| {
            b.to_async(&rt).iter(|| async {
                for identity in ids {
                    limiter.check(identity).await.unwrap();
                }
            })
        });
    }

    group.finish();
}

/// Benchmark concurrent admission across tasks
fn bench_concurrent(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent");

    for tasks in [2, 4, 8] {
        let limiter = Arc::new(limiter(u32::MAX));
        group.throughput(Throughput::Elements(tasks as u64 * 100));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| {
                let limiter = Arc::clone(&limiter);
                async move {
                    let handles: Vec<_> = (0..tasks)
                        .map(|t| {
                            let limiter = Arc::clone(&limiter);
                            tokio::spawn(async move {
                                let identity = Identity::ip(&format!("10.0.1.{}", t));
                                for _ in 0..100 {
                                    limiter.check(&identity).await.unwrap();
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_identity_resolution,
    bench_admission,
    bench_many_identities,
    bench_concurrent
);
criterion_main!(benches);
