//! Pre-trade evaluation example
//!
//! Builds a gatekeeper with every optional component attached, loads a
//! small book and calendar, and runs a handful of proposed trades through
//! the gates.
//!
//! Run with: RUST_LOG=debug cargo run --example evaluate_trade

use ag_gatekeeper::*;
use chrono::{Duration, NaiveDate};
use std::sync::Arc;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Risk Gatekeeper Trade Evaluation Example ===\n");

    let yaml = r#"
limits:
  max_abs_delta: 500.0
  max_theta_per_day: -200.0
account:
  starting_balance: 100000.0
max_vix: 30.0
"#;
    let config = GatekeeperConfig::from_yaml(yaml)?;

    let today = NaiveDate::from_ymd_opt(2026, 10, 19).ok_or("bad date")?;
    let expiry = today + Duration::days(4);

    // 1. Components
    let ranks = Arc::new(InMemoryIvRanks::new());
    ranks.set("SPY", 42.0);
    ranks.set("NVDA", 88.0);
    ranks.set("KO", 12.0);
    let classifier = VolatilityRegimeClassifier::new(Box::new(ranks.clone()), config.regime.clone())?;

    let gatekeeper = RiskGatekeeper::new(config)?
        .enable_gap_risk()?
        .enable_tail_risk()?
        .with_iv_regime(classifier);

    {
        let mut monitor = gatekeeper.gap_risk_monitor().ok_or("no monitor")?.write();
        monitor.add_earnings_date("NVDA", today + Duration::days(2))?;
        monitor.add_macro_event(today, MacroEventKind::Cpi, "CPI y/y");
    }

    for i in 0..45 {
        let pnl = ((i * 37) % 17) as f64 * 60.0 - 450.0;
        gatekeeper.record_daily_pnl(pnl, Some(today - Duration::days(45 - i)))?;
    }

    // 2. Current book
    let call = OptionContract::new(OptionType::Call, 580.0, expiry);
    let book = vec![
        Position::option("SPY", 6.0, Side::Long, 3.1, call.clone())
            .with_greeks(Greeks::new(0.45, 0.04, -0.12, 0.09)),
        Position::stock("SPY", 100.0, Side::Long, 578.0),
    ];

    let status = gatekeeper.check_health(&book, None);
    println!("Book health: {:?}", status.severity);
    println!(
        "  Delta {:.1} | Gamma {:.2} | Theta {:.2} | Vega {:.2}",
        status.greeks.delta, status.greeks.gamma, status.greeks.theta, status.greeks.vega
    );
    println!();

    // 3. Proposed trades
    let at_0900 = today.and_hms_opt(9, 0, 0).ok_or("bad time")?;
    let at_1130 = today.and_hms_opt(11, 30, 0).ok_or("bad time")?;
    let scenarios: Vec<(&str, ProposedTrade, MarketConditions)> = vec![
        (
            "Add 2 SPY calls during the CPI window",
            ProposedTrade::option("SPY", 2.0, Side::Long, 3.1, call.clone())
                .with_greeks(Greeks::new(0.45, 0.04, -0.12, 0.09)),
            MarketConditions::at(at_0900).with_vix(19.0),
        ),
        (
            "Same trade after the window",
            ProposedTrade::option("SPY", 2.0, Side::Long, 3.1, call.clone())
                .with_greeks(Greeks::new(0.45, 0.04, -0.12, 0.09)),
            MarketConditions::at(at_1130).with_vix(19.0).with_quote(3.05, 3.15),
        ),
        (
            "Buy NVDA calls two days before earnings",
            ProposedTrade::option("NVDA", 1.0, Side::Long, 5.0, OptionContract::new(OptionType::Call, 140.0, expiry)),
            MarketConditions::at(at_1130),
        ),
        (
            "Sell KO puts in a low-IV regime",
            ProposedTrade::option("KO", 3.0, Side::Short, 0.4, OptionContract::new(OptionType::Put, 62.0, expiry)),
            MarketConditions::at(at_1130),
        ),
        (
            "Buy 400 SPY shares",
            ProposedTrade::stock("SPY", 400.0, Side::Long, 578.0),
            MarketConditions::at(at_1130),
        ),
    ];

    for (label, trade, market) in &scenarios {
        let decision = gatekeeper.evaluate_trade(trade, &book, market);
        println!("{}", label);
        println!("  Allowed: {} ({:?})", decision.allowed, decision.severity);
        println!("  Reason: {}", decision.reason);
        for warning in &decision.warnings {
            println!("  Warning: {}", warning);
        }
        println!();
    }

    // 4. Size pipeline
    let size = gatekeeper.adjust_position_size("NVDA", 10.0, Some(at_1130));
    println!(
        "NVDA size: {:.1} x gap {:.2} x IV {:.2} = {:.2}",
        size.base_size, size.gap_multiplier, size.iv_multiplier, size.final_size
    );

    // 5. Kill switch
    gatekeeper.trigger_kill_switch("broker disconnect");
    let decision = gatekeeper.evaluate_trade(&scenarios[1].1, &book, &scenarios[1].2);
    println!("After kill switch: {} ({:?})", decision.reason, decision.severity);

    Ok(())
}
