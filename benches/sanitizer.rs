//! Benchmarks for structured payload extraction.
//!
//! Benchmark targets:
//! - Clean object: <20us
//! - Fenced payload with prose and citations: <50us
//! - Repair pass on a 100-item array: <1ms

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

use trendvault::llm::{ExpectedShape, ResponseSanitizer};

// ============================================================================
// Inputs
// ============================================================================

const CLEAN_OBJECT: &str = r#"{"title": "Comeback tops chart", "link": "https://news.example/a", "score": 8.5}"#;

const NOISY_RESPONSE: &str = "Sure! Here are today's trends [1][2]:\n\n```json\n\
    [{\"title\": \"Comeback tops chart\", \"link\": \"https://news.example/a\", \"score\": 8.5},\n\
     {\"title\": \"Tour announced\", \"link\": \"https://news.example/b\", \"score\": 6}]\n\
    ```\n\nSources: [1] news.example [2] wire.example";

/// An array of `n` drafts with raw newlines in strings and trailing commas,
/// so the repair pass runs.
fn malformed_array(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| {
            format!(
                "{{\"title\": \"Story {i}\", \"body\": \"line one\nline two\", \"link\": \"https://news.example/{i}\", \"score\": {},}}",
                i % 10
            )
        })
        .collect();
    format!("Here you go:\n[{}]\n", items.join(",\n"))
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitizer_extract");
    group.measurement_time(Duration::from_secs(5));
    let sanitizer = ResponseSanitizer::new();

    group.bench_function("clean_object", |b| {
        b.iter(|| sanitizer.extract(black_box(CLEAN_OBJECT), ExpectedShape::Object));
    });

    group.bench_function("fenced_with_citations", |b| {
        b.iter(|| sanitizer.extract(black_box(NOISY_RESPONSE), ExpectedShape::Any));
    });

    group.bench_function("no_payload", |b| {
        b.iter(|| sanitizer.extract(black_box("I cannot help with that."), ExpectedShape::Array));
    });

    group.finish();
}

fn bench_repair_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitizer_repair");
    let sanitizer = ResponseSanitizer::new();

    for size in [10, 100, 500] {
        let raw = malformed_array(size);
        group.throughput(Throughput::Bytes(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &raw, |b, raw| {
            b.iter(|| {
                sanitizer
                    .extract(black_box(raw), ExpectedShape::Array)
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_extract, bench_repair_scaling);
criterion_main!(benches);
