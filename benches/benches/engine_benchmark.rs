//! Engine benchmarks: range planning, limiter overhead and in-memory downloads.
//!
//! Run with: `cargo bench --package dataquery-bench`

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use dataquery_bench::MemoryTransport;
use dataquery_engine::{
    ChunkPlanner, FileDownloadConfig, FileDownloader, FileRequest, RateLimiter, RetryPolicy,
    Transport,
};
use std::hint::black_box;
use std::sync::Arc;
use tempfile::TempDir;

const MIB: u64 = 1024 * 1024;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn planner_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("planner");
    for parts in [1usize, 5, 64] {
        let planner = ChunkPlanner::new(parts, 2 * MIB);
        group.bench_with_input(BenchmarkId::new("plan_1gib", parts), &planner, |b, planner| {
            b.iter(|| planner.plan(black_box(Some(1024 * MIB)), black_box(true)));
        });
    }
    group.finish();
}

fn limiter_benchmark(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("rate_limiter");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("disabled_1000", |b| {
        let limiter = RateLimiter::disabled();
        b.to_async(&rt).iter(|| async {
            for _ in 0..1000 {
                limiter.acquire().await;
            }
        });
    });

    // Burst large enough that no acquire waits; measures bookkeeping only.
    group.bench_function("uncontended_1000", |b| {
        b.to_async(&rt).iter(|| async {
            let limiter = RateLimiter::per_minute(60_000, 1000);
            for _ in 0..1000 {
                limiter.acquire().await;
            }
        });
    });
    group.finish();
}

fn download_benchmark(c: &mut Criterion) {
    let rt = runtime();
    let server = MemoryTransport::with_len(32 * MIB as usize);
    let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or_default();

    let mut group = c.benchmark_group("download");
    group.sample_size(10);
    group.throughput(Throughput::Bytes(server.len()));

    for parts in [1usize, 4, 8] {
        let transport: Arc<dyn Transport> = Arc::new(server.clone());
        let downloader = FileDownloader::new(
            transport,
            RateLimiter::disabled(),
            RetryPolicy::no_retry(),
            FileDownloadConfig {
                parts_per_file: parts,
                min_part_size: MIB,
                overwrite: true,
                ..FileDownloadConfig::default()
            },
        );
        group.bench_with_input(BenchmarkId::new("32mib", parts), &downloader, |b, downloader| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let dir = TempDir::new().unwrap();
                let request = FileRequest {
                    file_id: "BENCH".to_string(),
                    file_date: date,
                    url: "memory://bench".to_string(),
                    destination: dir.path().join("bench.bin"),
                };
                let start = std::time::Instant::now();
                for _ in 0..iters {
                    let result = downloader.download(&request, None).await;
                    assert!(result.is_completed());
                }
                start.elapsed()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, planner_benchmark, limiter_benchmark, download_benchmark);
criterion_main!(benches);
