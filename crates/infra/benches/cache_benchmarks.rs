use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use storepulse_core::ManualClock;
use storepulse_infra::cache::{CacheAside, CacheParams, TtlCache, derive_key};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
    ))
}

fn filled_cache(entries: usize) -> TtlCache {
    let cache = TtlCache::new(clock());
    for i in 0..entries {
        cache.set(
            format!("top_products:{i:016x}"),
            json!({"product_name": "Coffee", "total_cents": 1198, "sales_count": 2}),
            Duration::from_secs(600),
        );
    }
    cache
}

fn bench_ttl_cache_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("ttl_cache_lookup");
    group.throughput(Throughput::Elements(1));

    for entries in [10usize, 1_000, 100_000] {
        let cache = filled_cache(entries);
        let hit_key = format!("top_products:{:016x}", entries / 2);

        group.bench_with_input(BenchmarkId::new("hit", entries), &hit_key, |b, key| {
            b.iter(|| black_box(cache.get(black_box(key))));
        });
        group.bench_with_input(BenchmarkId::new("miss", entries), &entries, |b, _| {
            b.iter(|| black_box(cache.get(black_box("revenue_metrics:absent"))));
        });
    }

    group.finish();
}

fn bench_expiry_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("ttl_cache_expiry");

    // set + read past expiry: measures the lazy eviction path.
    group.bench_function("set_then_expired_get", |b| {
        let clock = clock();
        let cache = TtlCache::new(clock.clone());
        b.iter(|| {
            cache.set("revenue:k", json!(2048), Duration::from_secs(1));
            clock.advance(chrono::Duration::seconds(2));
            black_box(cache.get("revenue:k"));
        });
    });

    group.finish();
}

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_key_derivation");

    for n in [1usize, 3, 8] {
        let params = (0..n).fold(CacheParams::new(), |p, i| {
            p.with(format!("param_{i}"), &(i as i64 * 31)).unwrap()
        });
        group.bench_with_input(BenchmarkId::new("params", n), &params, |b, params| {
            b.iter(|| black_box(derive_key("top_products", black_box(params))));
        });
    }

    group.finish();
}

fn bench_cache_aside_hit(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let cache = Arc::new(TtlCache::new(clock()));
    let aside: CacheAside<i64> = CacheAside::new(cache, "revenue", Duration::from_secs(180));
    let params = CacheParams::new().with("days", &30).unwrap();
    rt.block_on(aside.get_or_compute(&params, || async {
        Ok::<_, std::convert::Infallible>(2048)
    }))
    .unwrap();

    c.bench_function("cache_aside_hit", |b| {
        b.iter(|| {
            let value = rt
                .block_on(aside.get_or_compute(&params, || async {
                    Ok::<_, std::convert::Infallible>(0)
                }))
                .unwrap();
            black_box(value)
        });
    });
}

criterion_group!(
    benches,
    bench_ttl_cache_lookup,
    bench_expiry_eviction,
    bench_key_derivation,
    bench_cache_aside_hit
);
criterion_main!(benches);
