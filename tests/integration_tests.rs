//! Integration tests for the risk gatekeeper
//!
//! End-to-end scenarios across config loading, Greeks limits, tail risk,
//! event calendars and the IV regime gates, plus property tests for the
//! aggregation and UVaR invariants.

use ag_gatekeeper::{
    EventRiskMonitor, GapRiskConfig, GapRiskSource, GatekeeperConfig, GatekeeperError, Greeks,
    GreeksAggregator, InMemoryGreeksSource, InMemoryIvRanks, MacroEventKind, MarketConditions,
    OptionContract, OptionType, Position, ProposedTrade, RegimeThresholds, RiskGatekeeper,
    RiskLevel, Severity, Side, TailRiskEstimator, UvarConfig, UvarStatus,
    VolatilityRegimeClassifier,
};
use approx::assert_relative_eq;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::fs;
use std::sync::Arc;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    today().and_hms_opt(h, m, 0).unwrap()
}

fn weekly_call() -> OptionContract {
    OptionContract::new(OptionType::Call, 450.0, today() + Duration::days(5))
}

fn delta_half() -> Greeks {
    Greeks::new(0.5, 0.01, -0.04, 0.08)
}

#[test]
fn test_load_default_profile() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/gatekeeper.yaml");
    let yaml = fs::read_to_string(path).expect("Failed to read default profile");

    let config = GatekeeperConfig::from_yaml(&yaml).expect("Failed to parse profile");
    assert_eq!(config, GatekeeperConfig::default());
}

#[test]
fn test_load_conservative_profile() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/conservative.yaml");
    let yaml = fs::read_to_string(path).expect("Failed to read conservative profile");

    let gatekeeper = RiskGatekeeper::from_yaml(&yaml).unwrap();
    let config = gatekeeper.config();
    assert_eq!(config.limits.max_abs_delta, 200.0);
    assert_eq!(config.account.starting_balance, 25_000.0);
    assert_eq!(config.reduction_target_ratio, Some(1.0));
    // Unlisted sections keep their defaults
    assert_eq!(config.uvar.lookback_days, 90);

    // 3 calls at 0.5 delta = 150, another 2 = 250 > 200
    let book = vec![Position::option("SPY", 3.0, Side::Long, 2.0, weekly_call()).with_greeks(delta_half())];
    let trade = ProposedTrade::option("SPY", 2.0, Side::Long, 2.0, weekly_call()).with_greeks(delta_half());
    let decision = gatekeeper.evaluate_trade(&trade, &book, &MarketConditions::default());
    assert!(!decision.allowed);
}

#[test]
fn test_invalid_profile_fails_fast() {
    let yaml = r#"
limits:
  max_uvar_1d: 1500.0
"#;
    let err = RiskGatekeeper::from_yaml(yaml).err().unwrap();
    assert!(matches!(err, GatekeeperError::InvalidConfig(_)));
}

#[test]
fn test_projected_delta_breach_blocks_trade() {
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default()).unwrap();
    assert_eq!(gatekeeper.account().balance(), 100_000.0);

    // 9 calls at 0.5 delta: 450 share-equivalents
    let book = vec![Position::option("SPY", 9.0, Side::Long, 2.0, weekly_call()).with_greeks(delta_half())];
    // +100 delta more on the same contract
    let trade = ProposedTrade::option("SPY", 2.0, Side::Long, 2.1, weekly_call()).with_greeks(delta_half());

    let decision = gatekeeper.evaluate_trade(&trade, &book, &MarketConditions::at(at(11, 0)));
    assert!(!decision.allowed);
    assert!(decision.reason.contains("Delta"));
    assert_relative_eq!(decision.current_greeks.delta, 450.0, epsilon = 1e-9);
    assert_relative_eq!(decision.projected_greeks.unwrap().delta, 550.0, epsilon = 1e-9);
}

#[test]
fn test_resolver_supplies_missing_greeks() {
    let mut source = InMemoryGreeksSource::new();
    source.insert("QQQ", &weekly_call(), Greeks::new(0.6, 0.02, -0.05, 0.1));
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default())
        .unwrap()
        .with_greeks_source(Box::new(source));

    let book = vec![Position::option("QQQ", 5.0, Side::Long, 3.0, weekly_call())];
    let status = gatekeeper.check_health(&book, None);
    assert_relative_eq!(status.greeks.delta, 300.0, epsilon = 1e-9);
    assert_eq!(gatekeeper.greeks_aggregator().cache_len(), 1);
}

#[test]
fn test_uvar_with_synthetic_history() {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(50.0, 200.0).unwrap();

    let mut pnls: Vec<f64> = vec![-500.0, -600.0, -700.0, -800.0, -900.0];
    pnls.extend((0..30).map(|_| normal.sample(&mut rng)));
    assert_eq!(pnls.len(), 35);

    let mut estimator = TailRiskEstimator::new(UvarConfig::default()).unwrap();
    let start = today() - Duration::days(60);
    for (i, pnl) in pnls.iter().enumerate() {
        estimator.add_daily_pnl(*pnl, Some(start + Duration::days(i as i64))).unwrap();
    }

    let result = estimator.calculate(1, Some(100_000.0));
    assert!(result.sufficient_data);
    assert_eq!(result.sample_size, 35);
    assert!(result.uvar_1d < 0.0);
    assert!(result.uvar_1d > -1500.0);
    assert_eq!(result.status, UvarStatus::WithinLimits);
    assert_relative_eq!(result.uvar_3d, result.uvar_1d * 3f64.sqrt());
    assert!(estimator.check_limit(1).passed);
}

#[test]
fn test_earnings_today_is_terminal() {
    let mut monitor = EventRiskMonitor::new(GapRiskConfig::default()).unwrap();
    monitor.add_earnings_date("AAPL", today()).unwrap();
    monitor.add_macro_event(today(), MacroEventKind::Fomc, "FOMC decision");

    let risk = monitor.get_gap_risk("AAPL", Some(at(10, 0)));
    assert_eq!(risk.level, RiskLevel::Critical);
    assert_eq!(risk.source, GapRiskSource::Earnings);
    assert_eq!(risk.size_multiplier, 0.0);
    assert!(risk.block_new_trades);
    assert!(risk.force_exit);
    assert!(!monitor.can_trade("AAPL", Some(at(10, 0))));
    assert!(monitor.should_force_exit("AAPL", Some(at(10, 0))));
}

#[test]
fn test_cpi_window_through_gatekeeper() {
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default())
        .unwrap()
        .enable_gap_risk()
        .unwrap();
    gatekeeper
        .gap_risk_monitor()
        .unwrap()
        .write()
        .add_macro_event(today(), MacroEventKind::Cpi, "CPI m/m");

    let trade = ProposedTrade::stock("SPY", 10.0, Side::Long, 450.0);

    let during = gatekeeper.evaluate_trade(&trade, &[], &MarketConditions::at(at(9, 0)));
    assert!(!during.allowed);
    assert_eq!(during.severity, Severity::Danger);

    let after = gatekeeper.evaluate_trade(&trade, &[], &MarketConditions::at(at(11, 0)));
    assert!(after.allowed);
    assert_eq!(after.severity, Severity::Warning);

    let risk = gatekeeper.gap_risk("SPY", Some(at(11, 0))).unwrap();
    assert_eq!(risk.level, RiskLevel::High);
    assert!(!risk.block_new_trades);
    assert_eq!(risk.size_multiplier, 0.5);
}

#[test]
fn test_kill_switch_outranks_every_violation() {
    let ranks = Arc::new(InMemoryIvRanks::new());
    ranks.set("SPY", 99.0);
    let classifier = VolatilityRegimeClassifier::new(Box::new(ranks), RegimeThresholds::default()).unwrap();
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default())
        .unwrap()
        .enable_gap_risk()
        .unwrap()
        .with_iv_regime(classifier);
    gatekeeper
        .gap_risk_monitor()
        .unwrap()
        .write()
        .add_earnings_date("SPY", today())
        .unwrap();
    for _ in 0..5 {
        gatekeeper.record_trade_result(-10.0);
    }
    gatekeeper.trigger_kill_switch("operator halt");

    let book = vec![Position::stock("SPY", 900.0, Side::Long, 450.0)];
    let trade = ProposedTrade::option("SPY", 10.0, Side::Long, 2.0, weekly_call()).with_greeks(delta_half());
    let market = MarketConditions::at(at(9, 0)).with_vix(60.0).with_quote(1.0, 3.0);

    let decision = gatekeeper.evaluate_trade(&trade, &book, &market);
    assert!(!decision.allowed);
    assert_eq!(decision.severity, Severity::Blocked);
    assert!(decision.reason.starts_with("Kill switch active"));
    assert!(decision.reason.contains("operator halt"));
}

#[test]
fn test_forced_reduction_clears_danger() {
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default()).unwrap();
    let contract = weekly_call();
    let book = vec![
        // 4 * 0.3 * 100 = 120
        Position::option("AAPL", 4.0, Side::Long, 1.5, contract.clone()).with_greeks(Greeks::new(0.3, 0.01, -0.02, 0.05)),
        // No Greeks and no resolver: aggregated as 8 shares, ranked at 0.5 delta (400)
        Position::option("TSLA", 8.0, Side::Long, 4.0, contract.clone()),
        // 300 shares
        Position::stock("SPY", 300.0, Side::Long, 450.0),
    ];

    // 120 + 8 + 300 = 428 delta
    let status = gatekeeper.check_health(&book, None);
    assert_eq!(status.severity, Severity::Safe);
    assert!(gatekeeper.forced_reduction(&book, None).is_empty());

    // Add a large short stock line that pushes |delta| past 1.5x
    let mut book = book;
    book.push(Position::stock("IWM", -1_300.0, Side::Short, 200.0));
    // 428 - 1300 = -872
    let status = gatekeeper.check_health(&book, None);
    assert_eq!(status.severity, Severity::Danger);

    let actions = gatekeeper.forced_reduction(&book, None);
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].symbol, "IWM");
    assert_eq!(actions[0].side, Side::Long);
    assert_eq!(actions[0].quantity, 1_300.0);
    assert_eq!(actions[0].contribution, 1_300.0);
}

#[test]
fn test_size_pipeline_order() {
    let ranks = Arc::new(InMemoryIvRanks::new());
    ranks.set("AMD", 60.0);
    let classifier = VolatilityRegimeClassifier::new(Box::new(ranks), RegimeThresholds::default()).unwrap();
    let gatekeeper = RiskGatekeeper::new(GatekeeperConfig::default())
        .unwrap()
        .enable_gap_risk()
        .unwrap()
        .with_iv_regime(classifier);
    gatekeeper
        .gap_risk_monitor()
        .unwrap()
        .write()
        .add_earnings_date("AMD", today() + Duration::days(5))
        .unwrap();

    // Low earnings tier 0.8, high regime 0.8
    let size = gatekeeper.adjust_position_size("AMD", 10.0, Some(at(12, 0)));
    assert_eq!(size.gap_multiplier, 0.8);
    assert_eq!(size.iv_multiplier, 0.8);
    assert_relative_eq!(size.final_size, 6.4, epsilon = 1e-9);
}

#[test]
fn test_gatekeeper_is_shareable_across_threads() {
    let gatekeeper = Arc::new(
        RiskGatekeeper::new(GatekeeperConfig::default())
            .unwrap()
            .enable_tail_risk()
            .unwrap(),
    );

    std::thread::scope(|s| {
        for t in 0..4 {
            let gk = Arc::clone(&gatekeeper);
            s.spawn(move || {
                let trade = ProposedTrade::stock("SPY", 1.0 + t as f64, Side::Long, 10.0);
                for _ in 0..50 {
                    let decision = gk.evaluate_trade(&trade, &[], &MarketConditions::default());
                    assert!(decision.allowed);
                }
            });
        }
    });

    for i in 0..40 {
        gatekeeper
            .record_daily_pnl(25.0 - i as f64, Some(today() - Duration::days(40 - i)))
            .unwrap();
    }
    assert!(gatekeeper.uvar(1).unwrap().sufficient_data);
}

fn position_strategy() -> impl Strategy<Value = Position> {
    let stock = (1.0f64..500.0, any::<bool>()).prop_map(|(qty, long)| {
        let side = if long { Side::Long } else { Side::Short };
        Position::stock("SPY", qty, side, 100.0)
    });
    let option = (1.0f64..20.0, any::<bool>(), -1.0f64..1.0, 0.0f64..0.1, -0.5f64..0.0, 0.0f64..0.5)
        .prop_map(|(qty, long, delta, gamma, theta, vega)| {
            let side = if long { Side::Long } else { Side::Short };
            Position::option("SPY", qty, side, 2.0, weekly_call())
                .with_greeks(Greeks::new(delta, gamma, theta, vega))
        });
    prop_oneof![stock, option]
}

proptest! {
    #[test]
    fn prop_aggregation_is_permutation_invariant(
        (original, shuffled) in prop::collection::vec(position_strategy(), 1..25)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    ) {
        let aggregator = GreeksAggregator::new();
        let a = aggregator.aggregate(&original, None);
        let b = aggregator.aggregate(&shuffled, None);

        prop_assert!((a.delta - b.delta).abs() < 1e-6);
        prop_assert!((a.gamma - b.gamma).abs() < 1e-6);
        prop_assert!((a.theta - b.theta).abs() < 1e-6);
        prop_assert!((a.vega - b.vega).abs() < 1e-6);
        prop_assert_eq!(a.positions_count, b.positions_count);
    }

    #[test]
    fn prop_stock_only_books_have_delta_only(
        lines in prop::collection::vec((1.0f64..1000.0, any::<bool>()), 1..20)
    ) {
        let book: Vec<Position> = lines
            .iter()
            .map(|(qty, long)| {
                let side = if *long { Side::Long } else { Side::Short };
                Position::stock("SPY", *qty, side, 50.0)
            })
            .collect();
        let expected: f64 = lines
            .iter()
            .map(|(qty, long)| if *long { *qty } else { -*qty })
            .sum();

        let greeks = GreeksAggregator::new().aggregate(&book, None);
        prop_assert!((greeks.delta - expected).abs() < 1e-6);
        prop_assert_eq!(greeks.gamma, 0.0);
        prop_assert_eq!(greeks.theta, 0.0);
        prop_assert_eq!(greeks.vega, 0.0);
    }

    #[test]
    fn prop_iv_gates_follow_regime(rank in 0.0f64..=100.0) {
        let ranks = Arc::new(InMemoryIvRanks::new());
        ranks.set("SPY", rank);
        let classifier = VolatilityRegimeClassifier::new(Box::new(ranks), RegimeThresholds::default()).unwrap();

        prop_assert_eq!(classifier.can_trade_long_options("SPY").allowed, rank < 80.0);
        prop_assert_eq!(classifier.can_trade_short_premium("SPY").allowed, rank >= 20.0);
    }

    #[test]
    fn prop_uvar_sample_below_minimum_worsens(
        history in prop::collection::vec(-1000.0f64..1000.0, 30..80),
        gap in 1.0f64..500.0
    ) {
        let mut estimator = estimator_from(&history);
        let before = estimator.calculate(1, None).uvar_1d;
        let minimum = history.iter().copied().fold(f64::INFINITY, f64::min);

        let next = today() + Duration::days(1);
        estimator.add_daily_pnl(minimum - gap, Some(next)).unwrap();
        prop_assert!(estimator.calculate(1, None).uvar_1d < before);
    }

    #[test]
    fn prop_uvar_benign_sample_never_worsens(
        history in prop::collection::vec(-1000.0f64..1000.0, 30..80),
        extra in 0.01f64..2000.0
    ) {
        let mut estimator = estimator_from(&history);
        let before = estimator.calculate(1, None).uvar_1d;
        let benign = before + extra;

        let next = today() + Duration::days(1);
        estimator.add_daily_pnl(benign, Some(next)).unwrap();
        prop_assert!(estimator.calculate(1, None).uvar_1d >= before);
    }
}

fn estimator_from(history: &[f64]) -> TailRiskEstimator {
    let mut estimator = TailRiskEstimator::new(UvarConfig::default()).unwrap();
    let start = today() - Duration::days(history.len() as i64);
    for (i, pnl) in history.iter().enumerate() {
        estimator
            .add_daily_pnl(*pnl, Some(start + Duration::days(i as i64)))
            .unwrap();
    }
    estimator
}
