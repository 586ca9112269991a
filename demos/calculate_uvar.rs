//! UVaR calculation example
//!
//! Feeds a synthetic daily P&L history into the tail-risk estimator and
//! prints the 1/3/5-day figures and the incremental impact of new positions.
//!
//! Run with: cargo run --example calculate_uvar

use ag_gatekeeper::*;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    println!("=== UVaR Calculation Example ===\n");

    // 1. Synthetic history: mostly small gains, a few bad days
    let mut rng = StdRng::seed_from_u64(7); // For reproducible results
    let normal = Normal::new(60.0, 250.0)?;
    let mut pnls: Vec<f64> = (0..85).map(|_| normal.sample(&mut rng)).collect();
    pnls.extend([-1_100.0, -850.0, -700.0, -950.0, -1_300.0]);

    let config = UvarConfig::default();
    println!("Lookback: {} days", config.lookback_days);
    println!("Confidence: {}%", config.confidence * 100.0);
    println!("Limits: 1d {:.0} / 3d {:.0}", config.max_uvar_1d, config.max_uvar_3d);
    println!();

    let mut estimator = TailRiskEstimator::new(config)?;
    let start = NaiveDate::from_ymd_opt(2026, 5, 1).ok_or("bad date")?;

    // Not enough history yet
    for (i, pnl) in pnls.iter().take(10).enumerate() {
        estimator.add_daily_pnl(*pnl, Some(start + Duration::days(i as i64)))?;
    }
    let early = estimator.calculate(1, None);
    println!(
        "After {} samples: UVaR 1d {:.2} (placeholder: {})",
        early.sample_size, early.uvar_1d, !early.sufficient_data
    );

    for (i, pnl) in pnls.iter().enumerate().skip(10) {
        estimator.add_daily_pnl(*pnl, Some(start + Duration::days(i as i64)))?;
    }

    // 2. Full window
    let portfolio_value = 100_000.0;
    let result = estimator.calculate(3, Some(portfolio_value));
    println!("\nAfter {} samples:", result.sample_size);
    println!("  UVaR 1d: {:.2}", result.uvar_1d);
    println!("  UVaR 3d: {:.2}", result.uvar_3d);
    println!("  UVaR 5d: {:.2}", result.uvar_5d);
    if let Some(pct) = result.uvar_pct {
        println!("  UVaR 1d as % of book: {:.2}%", pct);
    }
    if let Some(es) = result.expected_shortfall_1d {
        println!("  Expected shortfall 1d: {:.2}", es);
    }
    if let (Some(mean), Some(sd)) = (result.mean_pnl, result.std_dev_pnl) {
        println!("  Mean P&L: {:.2}, std dev: {:.2}", mean, sd);
    }
    println!("  Status: {:?}", result.status);

    for horizon in [1, 3] {
        let check = estimator.check_limit(horizon);
        println!("  {}d check: {} ({})", horizon, check.passed, check.reason);
    }

    // 3. Incremental impact
    println!("\nIncremental UVaR:");
    for position_value in [2_500.0, 10_000.0, 50_000.0] {
        let inc = estimator.calculate_incremental(position_value, portfolio_value);
        println!(
            "  +{:>8.0}: {:.2} -> {:.2} ({:.2}% of book)",
            position_value, inc.before, inc.after, inc.uvar_pct
        );
    }

    Ok(())
}
