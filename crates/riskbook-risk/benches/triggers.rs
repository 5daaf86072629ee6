//! Benchmarks for trigger evaluation.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use riskbook_core::{OpenPosition, PriceTick};
use riskbook_registry::PositionRegistry;
use riskbook_risk::TriggerEvaluator;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn generate_prices(size: usize) -> Vec<Decimal> {
    (0..size)
        .map(|i| {
            let wave = ((i as f64 * 0.1).sin() * 1500.0) as i64;
            dec!(50000) + Decimal::from(wave)
        })
        .collect()
}

fn benchmark_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("TriggerEvaluator");

    for size in [1000, 10000].iter() {
        let prices = generate_prices(*size);

        group.bench_with_input(BenchmarkId::new("evaluate", size), &prices, |b, prices| {
            let evaluator = TriggerEvaluator::default();
            b.iter(|| {
                let registry = PositionRegistry::new();
                let id = registry
                    .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)))
                    .unwrap_or_else(|e| panic!("open failed: {}", e));
                for price in prices {
                    let tick = PriceTick::new("BTCUSDT", *price, Utc::now());
                    if registry.mutate(&id, |p| evaluator.evaluate(p, black_box(&tick))).is_err() {
                        break;
                    }
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_evaluate);
criterion_main!(benches);
