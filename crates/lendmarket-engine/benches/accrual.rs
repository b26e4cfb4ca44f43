//! Accrual benchmarks
//!
//! - Single-rate compounding over increasing period counts
//! - Full two-rate accrual across the due period

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lendmarket_engine::{calculate_outstanding_balance, AccrualInput, InterestEngine};
use std::time::Duration;

fn bench_compounding(c: &mut Criterion) {
    let mut group = c.benchmark_group("compounding");
    group.measurement_time(Duration::from_secs(5));

    for periods in [1u64, 30, 365, 3_650].iter() {
        group.bench_with_input(BenchmarkId::new("periods", periods), periods, |b, &periods| {
            b.iter(|| {
                calculate_outstanding_balance(
                    black_box(1_000_000_000),
                    black_box(periods),
                    black_box(2_724_943),
                    1_000_000_000,
                )
            });
        });
    }

    group.finish();
}

fn bench_accrue(c: &mut Criterion) {
    let engine = InterestEngine::new(1_000_000_000, 10_000);
    let input = AccrualInput {
        tracked_balance: 1_000_000_000,
        tracked_period_index: 20_000,
        current_period_index: 20_365,
        start_period_index: 20_000,
        duration_in_periods: 180,
        interest_rate_primary: 2_724_943,
        interest_rate_secondary: 5_000_000,
    };

    c.bench_function("accrue_past_due", |b| {
        b.iter(|| engine.accrue(black_box(&input)))
    });
}

criterion_group!(benches, bench_compounding, bench_accrue);
criterion_main!(benches);
