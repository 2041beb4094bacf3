use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, Criterion};
use rsms_gateway::cache::SignalCache;
use rsms_gateway::sim::Simulator;
use rsms_protocol::{codec, CommandFlag, MessageBuilder, ReportOptions};
use std::time::Duration;

// Realtime body from a fully populated snapshot (the per-second hot path)
fn bench_realtime_unit(c: &mut Criterion) {
    let path = std::env::temp_dir().join("rsms_bench_cache.dat");
    let cache = SignalCache::new(path, Duration::from_secs(5));
    Simulator::new(42).step(&cache);
    let at = NaiveDate::from_ymd_opt(2025, 8, 14)
        .and_then(|d| d.and_hms_opt(10, 30, 0))
        .expect("valid timestamp");

    c.bench_function("realtime_unit_snapshot", |b| {
        b.iter(|| {
            let snap = cache.snapshot();
            std::hint::black_box(codec::realtime_unit(&snap, &at, ReportOptions::default()));
        });
    });

    let snap = cache.snapshot();
    c.bench_function("realtime_unit_with_engine", |b| {
        b.iter(|| {
            let opts = ReportOptions { include_engine: true };
            std::hint::black_box(codec::realtime_unit(&snap, &at, opts));
        });
    });
}

// Envelope framing + checksum around a realtime body
fn bench_frame_build(c: &mut Criterion) {
    let path = std::env::temp_dir().join("rsms_bench_cache.dat");
    let cache = SignalCache::new(path, Duration::from_secs(5));
    Simulator::new(7).step(&cache);
    let at = chrono::Local::now().naive_local();
    let unit = codec::realtime_unit(&cache.snapshot(), &at, ReportOptions::default());
    let builder = MessageBuilder::new("LSVNV2180E2012345");

    c.bench_function("frame_realtime_report", |b| {
        b.iter(|| {
            std::hint::black_box(builder.build(CommandFlag::RealtimeReport, &unit).expect("frame"));
        });
    });
}

criterion_group!(benches, bench_realtime_unit, bench_frame_build);
criterion_main!(benches);
