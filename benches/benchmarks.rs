//! Benchmark suite for the placement predictor.
//!
//! Covers the hot paths of a prediction request:
//! - CGPA parsing and model evaluation
//! - Least squares fitting
//! - Page rendering
//! - Counter increments on the file tier
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench -- --save-baseline main
//! cargo bench -- --baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use placement_predictor::model::TRAINING_DATA;
use placement_predictor::server::page::{Notice, PageTemplate, PageView};
use placement_predictor::store::FileCounter;
use placement_predictor::{parse_cgpa, CounterState, CounterStore, FeedbackEntry, LinearModel};
use tempfile::TempDir;

// ============================================================================
// Model Benchmarks
// ============================================================================

fn bench_predict(c: &mut Criterion) {
    let model = LinearModel::hardcoded();
    let mut group = c.benchmark_group("predict");

    group.bench_function("parse_cgpa", |b| {
        b.iter(|| parse_cgpa(black_box(" 8.5 ")))
    });
    group.bench_function("predict_rounded", |b| {
        b.iter(|| model.predict_rounded(black_box(8.5)))
    });

    group.finish();
}

/// Fit time over samples of increasing size built from the bundled data.
fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");

    for repeat in [1, 10, 100] {
        let points: Vec<(f64, f64)> = TRAINING_DATA
            .iter()
            .cycle()
            .take(TRAINING_DATA.len() * repeat)
            .copied()
            .collect();

        group.throughput(Throughput::Elements(points.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(points.len()),
            &points,
            |b, points| b.iter(|| LinearModel::fit(black_box(points))),
        );
    }

    group.finish();
}

// ============================================================================
// Rendering Benchmarks
// ============================================================================

fn bench_render(c: &mut Criterion) {
    let mut view = PageView::new(CounterState::new(1_250, 8_431));
    view.cgpa_input = "8.5".to_string();
    view.prediction = Some(Notice::Success("Your predicted package is 3.85 LPA".into()));
    view.recent_feedback = (0..5)
        .map(|i| FeedbackEntry {
            visitor_id: None,
            name: format!("Student {i}"),
            email: format!("student{i}@example.com"),
            message: "Pretty close to the offer I got <3".to_string(),
            rating: 4,
            timestamp: chrono::Utc::now(),
        })
        .collect();

    c.bench_function("render_page", |b| {
        b.iter(|| PageTemplate::new(black_box(&view)).render())
    });
}

// ============================================================================
// Storage Benchmarks
// ============================================================================

fn bench_file_counter(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp = TempDir::new().unwrap();
    let store = CounterStore::new(vec![Box::new(FileCounter::new(
        temp.path().join("counter.json"),
    ))]);

    c.bench_function("file_counter_increment", |b| {
        b.iter(|| rt.block_on(store.increment(black_box(false))))
    });
}

criterion_group!(
    benches,
    bench_predict,
    bench_fit,
    bench_render,
    bench_file_counter
);
criterion_main!(benches);
