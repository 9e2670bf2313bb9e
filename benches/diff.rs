//! Performance benchmarks for normalization and diffing.
//!
//! Run with: `cargo bench --bench diff`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | normalize | Linear in raw count | Trim + lowercase + set insert |
//! | diff | Linear in snapshot size | Two merge walks over sorted sets |
//! | parse (JSON) | Linear in document size | `string_list_data` layout |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use follower_diff::{diff, normalize, parse, ContentFormat, Snapshot};

fn raw_handles(start: usize, count: usize) -> Vec<String> {
    (start..start + count)
        .map(|i| format!("  User_{:07} ", i))
        .collect()
}

/// Two snapshots overlapping by 90%.
fn overlapping_pair(size: usize) -> (Snapshot, Snapshot) {
    let shift = size / 10;
    (
        normalize(raw_handles(0, size)),
        normalize(raw_handles(shift, size)),
    )
}

fn export_json(count: usize) -> Vec<u8> {
    let items: Vec<String> = (0..count)
        .map(|i| {
            format!(
                r#"{{"title":"","media_list_data":[],"string_list_data":[{{"href":"https://platform.example/user_{i:07}","value":"user_{i:07}","timestamp":1700000000}}]}}"#
            )
        })
        .collect();
    format!("[{}]", items.join(",")).into_bytes()
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for size in [1_000, 10_000, 100_000] {
        let raw = raw_handles(0, size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("handles", size), &raw, |b, raw| {
            b.iter(|| normalize(black_box(raw)))
        });
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for size in [1_000, 10_000, 100_000] {
        let (previous, current) = overlapping_pair(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("snapshot", size),
            &(previous, current),
            |b, (previous, current)| {
                b.iter(|| {
                    let result = diff(black_box(previous), black_box(current));
                    assert_eq!(result.entered.len(), size / 10);
                    result
                })
            },
        );
    }

    group.finish();
}

fn bench_parse_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_json");

    for count in [1_000, 10_000] {
        let bytes = export_json(count);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("entries", count), &bytes, |b, bytes| {
            b.iter(|| parse(black_box(bytes), ContentFormat::Json))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_diff, bench_parse_json);
criterion_main!(benches);
