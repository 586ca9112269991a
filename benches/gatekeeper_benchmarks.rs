//! Benchmarks for the gatekeeper hot paths
//!
//! Run with: cargo bench

use ag_gatekeeper::*;
use chrono::{Duration, NaiveDate};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

fn main() {
    println!("=== Risk Gatekeeper Performance Benchmarks ===\n");

    benchmark_greeks_aggregation();
    benchmark_uvar();
    benchmark_gap_risk();
    benchmark_trade_evaluation();
    benchmark_forced_reduction();
}

fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 11, 20).unwrap()
}

fn book(size: usize) -> Vec<Position> {
    (0..size)
        .map(|i| {
            let side = if i % 3 == 0 { Side::Short } else { Side::Long };
            if i % 4 == 0 {
                Position::stock(&format!("STK{}", i), 10.0 + i as f64, side, 50.0)
            } else {
                let option_type = if i % 2 == 0 { OptionType::Put } else { OptionType::Call };
                let contract = OptionContract::new(option_type, 100.0 + i as f64, expiry());
                Position::option(&format!("OPT{}", i), 1.0 + (i % 5) as f64, side, 2.0, contract)
                    .with_greeks(Greeks::new(0.4, 0.02, -0.03, 0.08))
            }
        })
        .collect()
}

fn benchmark_greeks_aggregation() {
    println!("## Greeks Aggregation");

    let aggregator = GreeksAggregator::new();
    for size in [10, 100, 1000] {
        let positions = book(size);
        let iterations = 1000;

        let start = Instant::now();
        for _ in 0..iterations {
            black_box(aggregator.aggregate(black_box(&positions), None));
        }
        let elapsed = start.elapsed();
        println!("  {} positions ({} iterations): {:?}", size, iterations, elapsed);
        println!("  Average: {:?}", elapsed / iterations);
    }

    println!();
}

fn benchmark_uvar() {
    println!("## UVaR");

    let mut estimator = TailRiskEstimator::new(UvarConfig::default()).unwrap();
    let start_date = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
    for i in 0..90 {
        let pnl = (i as f64 * 0.7).sin() * 400.0 - 20.0;
        estimator
            .add_daily_pnl(pnl, Some(start_date + Duration::days(i)))
            .unwrap();
    }

    let start = Instant::now();
    for _ in 0..10_000 {
        black_box(estimator.calculate(black_box(3), Some(100_000.0)));
    }
    let elapsed = start.elapsed();
    println!("  Full window calculate (10,000 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10_000);

    let start = Instant::now();
    for _ in 0..10_000 {
        black_box(estimator.calculate_incremental(black_box(5_000.0), 100_000.0));
    }
    let elapsed = start.elapsed();
    println!("  Incremental (10,000 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10_000);

    println!();
}

fn benchmark_gap_risk() {
    println!("## Gap Risk");

    let mut monitor = EventRiskMonitor::new(GapRiskConfig::default()).unwrap();
    let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    for i in 0..500 {
        monitor
            .add_earnings_date(&format!("SYM{}", i), today + Duration::days(i % 60))
            .unwrap();
    }
    for i in 0..60 {
        monitor.add_macro_event(today + Duration::days(i), MacroEventKind::FedSpeaker, "speech");
    }
    let now = today.and_hms_opt(11, 0, 0).unwrap();

    let start = Instant::now();
    for i in 0..10_000 {
        black_box(monitor.get_gap_risk(&format!("SYM{}", i % 500), Some(now)));
    }
    let elapsed = start.elapsed();
    println!("  Lookup (10,000 iterations, 500 symbols): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10_000);

    println!();
}

fn benchmark_trade_evaluation() {
    println!("## Trade Evaluation");

    let ranks = Arc::new(InMemoryIvRanks::new());
    ranks.set("SPY", 45.0);
    let classifier =
        VolatilityRegimeClassifier::new(Box::new(ranks), RegimeThresholds::default()).unwrap();
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default())
        .unwrap()
        .enable_gap_risk()
        .unwrap()
        .enable_tail_risk()
        .unwrap()
        .with_iv_regime(classifier);

    let positions = book(50);
    let trade = ProposedTrade::option(
        "SPY",
        1.0,
        Side::Long,
        2.5,
        OptionContract::new(OptionType::Call, 450.0, expiry()),
    )
    .with_greeks(Greeks::new(0.5, 0.03, -0.05, 0.1));
    let market = MarketConditions::default().with_vix(18.0).with_quote(2.45, 2.55);

    let start = Instant::now();
    for _ in 0..10_000 {
        black_box(gatekeeper.evaluate_trade(black_box(&trade), &positions, &market));
    }
    let elapsed = start.elapsed();
    println!("  All gates, 50-position book (10,000 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 10_000);

    println!();
}

fn benchmark_forced_reduction() {
    println!("## Forced Reduction");

    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default()).unwrap();
    let positions: Vec<Position> = (0..200)
        .map(|i| Position::stock(&format!("STK{}", i), 10.0, Side::Long, 20.0))
        .collect();

    let start = Instant::now();
    for _ in 0..100 {
        black_box(gatekeeper.forced_reduction(black_box(&positions), None));
    }
    let elapsed = start.elapsed();
    println!("  200 positions (100 iterations): {:?}", elapsed);
    println!("  Average: {:?}", elapsed / 100);

    println!();
}
