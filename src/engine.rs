//! Risk gatekeeper
//!
//! Composes the Greeks aggregator, event monitor, IV regime classifier and
//! tail-risk estimator behind one pre-trade check. Gates run in a fixed
//! order and the first failure decides:
//!
//! 1. kill switch, then a book that fails position validation
//! 2. daily loss / max drawdown
//! 3. consecutive-loss streak
//! 4. event (gap) risk
//! 5. IV rank and regime, by trade direction (options only)
//! 6. VIX ceiling and bid/ask spread
//! 7. projected portfolio Greeks against [`RiskLimits`]
//! 8. incremental UVaR
//!
//! Optional components that were never attached always pass.

use crate::account::{AccountBreachKind, AccountState};
use crate::config::{GatekeeperConfig, RiskLimits};
use crate::error::Result;
use crate::gap_risk::{EventRiskMonitor, GapRisk, RiskLevel};
use crate::greeks::{GreekMetric, GreeksAggregator, GreeksLookup, GreeksSource, PortfolioGreeks};
use crate::iv_regime::VolatilityRegimeClassifier;
use crate::position::{merge_trade, ContractKey, Position, ProposedTrade};
use crate::reduction::{delta_contribution, plan_reduction, ReductionAction};
use crate::uvar::{TailRiskEstimator, UvarResult};
use crate::{RiskDecision, Severity};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Share of `max_uvar_pct` at which the UVaR gate starts warning
const UVAR_WARNING_FRACTION: f64 = 0.8;

/// Market snapshot supplied with each trade evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    /// Market-local evaluation time; `None` means now
    pub at: Option<NaiveDateTime>,

    /// Current VIX level
    pub vix: Option<f64>,

    /// Best bid/ask of the traded instrument
    pub bid: Option<f64>,
    pub ask: Option<f64>,

    /// Underlying spot prices, forwarded to the Greeks resolver
    #[serde(default)]
    pub spot_prices: HashMap<String, f64>,
}

impl MarketConditions {
    pub fn at(at: NaiveDateTime) -> Self {
        Self {
            at: Some(at),
            ..Self::default()
        }
    }

    pub fn with_vix(mut self, vix: f64) -> Self {
        self.vix = Some(vix);
        self
    }

    pub fn with_quote(mut self, bid: f64, ask: f64) -> Self {
        self.bid = Some(bid);
        self.ask = Some(ask);
        self
    }

    pub fn with_spot(mut self, symbol: &str, price: f64) -> Self {
        self.spot_prices.insert(symbol.to_string(), price);
        self
    }
}

/// One Greek compared against its limit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitViolation {
    pub metric: GreekMetric,
    pub value: f64,
    pub limit: f64,

    /// `|value| / limit`, or `value / limit` for theta; above 1.0 is a breach
    pub ratio: f64,
}

/// Standing health of the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskStatus {
    pub severity: Severity,
    pub greeks: PortfolioGreeks,
    pub violations: Vec<LimitViolation>,
    pub kill_switch_active: bool,
    /// Positions left out of the snapshot because they failed validation
    pub warnings: Vec<String>,
}

/// Position size after the gap-risk and IV-regime multipliers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeAdjustment {
    pub base_size: f64,
    pub gap_multiplier: f64,
    pub iv_multiplier: f64,
    pub final_size: f64,
}

/// Pre-trade risk gatekeeper
///
/// All methods take `&self`; each piece of state sits behind its own lock,
/// so one instance can be shared across threads.
pub struct RiskGatekeeper {
    config: RwLock<GatekeeperConfig>,
    greeks: GreeksAggregator,
    gap_risk: Option<RwLock<EventRiskMonitor>>,
    iv_regime: Option<VolatilityRegimeClassifier>,
    tail_risk: Option<Mutex<TailRiskEstimator>>,
    account: Mutex<AccountState>,
    kill_switch: RwLock<Option<String>>,
}

impl RiskGatekeeper {
    /// Create a gatekeeper with no optional components attached
    pub fn new(config: GatekeeperConfig) -> Result<Self> {
        config.validate()?;
        let account = AccountState::new(config.account.starting_balance);
        info!(
            max_abs_delta = config.limits.max_abs_delta,
            max_theta = config.limits.max_theta_per_day,
            starting_balance = config.account.starting_balance,
            "Risk gatekeeper created"
        );
        Ok(Self {
            config: RwLock::new(config),
            greeks: GreeksAggregator::new(),
            gap_risk: None,
            iv_regime: None,
            tail_risk: None,
            account: Mutex::new(account),
            kill_switch: RwLock::new(None),
        })
    }

    /// Load configuration from YAML
    ///
    /// # Example
    ///
    /// ```
    /// use ag_gatekeeper::RiskGatekeeper;
    ///
    /// let yaml = r#"
    /// limits:
    ///   max_abs_delta: 400.0
    /// "#;
    ///
    /// let gatekeeper = RiskGatekeeper::from_yaml(yaml).unwrap();
    /// assert_eq!(gatekeeper.limits().max_abs_delta, 400.0);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::new(GatekeeperConfig::from_yaml(yaml)?)
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(GatekeeperConfig::from_json(json)?)
    }

    pub fn with_greeks_source(mut self, source: Box<dyn GreeksSource>) -> Self {
        self.greeks = GreeksAggregator::with_source(source);
        self
    }

    pub fn with_gap_risk(mut self, monitor: EventRiskMonitor) -> Self {
        self.gap_risk = Some(RwLock::new(monitor));
        self
    }

    pub fn with_iv_regime(mut self, classifier: VolatilityRegimeClassifier) -> Self {
        self.iv_regime = Some(classifier);
        self
    }

    /// Attach a tail-risk estimator; its UVaR bounds are replaced by the
    /// configured limits
    pub fn with_tail_risk(mut self, mut estimator: TailRiskEstimator) -> Result<Self> {
        {
            let config = self.config.read();
            estimator.update_limits(config.limits.max_uvar_1d, config.limits.max_uvar_3d)?;
        }
        self.tail_risk = Some(Mutex::new(estimator));
        Ok(self)
    }

    /// Attach an event monitor built from the configured settings
    pub fn enable_gap_risk(self) -> Result<Self> {
        let monitor = EventRiskMonitor::new(self.config.read().gap_risk.clone())?;
        Ok(self.with_gap_risk(monitor))
    }

    /// Attach a tail-risk estimator built from the configured settings
    pub fn enable_tail_risk(self) -> Result<Self> {
        let estimator = TailRiskEstimator::new(self.config.read().uvar_config())?;
        self.with_tail_risk(estimator)
    }

    pub fn config(&self) -> GatekeeperConfig {
        self.config.read().clone()
    }

    pub fn limits(&self) -> RiskLimits {
        self.config.read().limits.clone()
    }

    pub fn greeks_aggregator(&self) -> &GreeksAggregator {
        &self.greeks
    }

    pub fn gap_risk_monitor(&self) -> Option<&RwLock<EventRiskMonitor>> {
        self.gap_risk.as_ref()
    }

    pub fn iv_regime(&self) -> Option<&VolatilityRegimeClassifier> {
        self.iv_regime.as_ref()
    }

    pub fn tail_risk(&self) -> Option<&Mutex<TailRiskEstimator>> {
        self.tail_risk.as_ref()
    }

    /// Snapshot of the account state
    pub fn account(&self) -> AccountState {
        self.account.lock().clone()
    }

    /// Evaluate a proposed trade against every gate.
    ///
    /// Limit breaches are reported in the returned decision, never as errors.
    pub fn evaluate_trade(
        &self,
        trade: &ProposedTrade,
        positions: &[Position],
        market: &MarketConditions,
    ) -> RiskDecision {
        let config = self.config();
        let spots = Some(&market.spot_prices);
        let current = self.greeks.aggregate(positions, spots);
        let mut warnings = Vec::new();

        debug!(
            symbol = %trade.symbol,
            quantity = trade.quantity,
            side = ?trade.side,
            option = trade.is_option(),
            "Evaluating trade"
        );

        // 1. Kill switch
        if let Some(reason) = self.kill_switch.read().clone() {
            return reject(
                Severity::Blocked,
                format!("Kill switch active: {}", reason),
                current,
                None,
                warnings,
            );
        }

        if let Err(e) = positions.iter().try_for_each(Position::validate) {
            return reject(
                Severity::Blocked,
                format!("Invalid position in book: {}", e),
                current,
                None,
                warnings,
            );
        }

        // 2-3. Account guards
        let breach = {
            let account = self.account.lock();
            account
                .check_loss_limits(&config.account)
                .or_else(|| account.check_loss_streak(&config.account))
        };
        if let Some(breach) = breach {
            if breach.kind == AccountBreachKind::Drawdown {
                self.trigger_kill_switch(&breach.reason);
            }
            return reject(Severity::Blocked, breach.reason, current, None, warnings);
        }

        // 4. Event risk
        if let Some(monitor) = &self.gap_risk {
            let gap = monitor.read().get_gap_risk(&trade.symbol, market.at);
            debug!(symbol = %trade.symbol, level = %gap.level, "Gap risk gate");
            if gap.block_new_trades {
                return reject(
                    Severity::Danger,
                    format!("Gap risk {}: {}", gap.level, gap.reason),
                    current,
                    None,
                    warnings,
                );
            }
            if gap.level > RiskLevel::None {
                warnings.push(format!(
                    "{}: gap risk {} ({}), size x{:.2}",
                    trade.symbol, gap.level, gap.reason, gap.size_multiplier
                ));
            }
        }

        // 5. IV rank and regime
        if trade.is_option() {
            if let Some(classifier) = &self.iv_regime {
                if let Some(reason) = self.check_iv(classifier, trade, &config, &mut warnings) {
                    return reject(Severity::Danger, reason, current, None, warnings);
                }
            }
        }

        // 6. Market conditions
        if let Some(reason) = check_market(market, &config, &mut warnings) {
            return reject(Severity::Danger, reason, current, None, warnings);
        }

        // 7. Projected Greeks
        let projected_book = merge_trade(positions, trade);
        let projected = self.greeks.aggregate(&projected_book, spots);
        let breaches = projected_violations(&current, &projected, &config.limits);
        if !breaches.is_empty() {
            let reason = breaches
                .iter()
                .map(|v| {
                    format!(
                        "Projected {} {:.2} exceeds limit {:.2}",
                        v.metric, v.value, v.limit
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return reject(Severity::Danger, reason, current, Some(projected), warnings);
        }

        // 8. Incremental UVaR
        if let Some(tail_risk) = &self.tail_risk {
            let balance = self.account.lock().balance();
            let incremental = tail_risk.lock().calculate_incremental(trade.notional(), balance);
            debug!(
                before = incremental.before,
                after = incremental.after,
                uvar_pct = incremental.uvar_pct,
                "UVaR gate"
            );

            if !incremental.sufficient_data {
                warnings.push("UVaR based on insufficient P&L history".to_string());
            }
            if incremental.uvar_pct > config.max_uvar_pct {
                return reject(
                    Severity::Danger,
                    format!(
                        "UVaR {:.2}% of balance after trade exceeds limit {:.2}%",
                        incremental.uvar_pct, config.max_uvar_pct
                    ),
                    current,
                    Some(projected),
                    warnings,
                );
            }
            if incremental.uvar_pct >= config.max_uvar_pct * UVAR_WARNING_FRACTION {
                warnings.push(format!(
                    "UVaR {:.2}% of balance is near limit {:.2}%",
                    incremental.uvar_pct, config.max_uvar_pct
                ));
            }
        }

        let decision = RiskDecision::allow(current, Some(projected), warnings);
        info!(
            symbol = %trade.symbol,
            severity = ?decision.severity,
            warnings = decision.warnings.len(),
            "Trade allowed"
        );
        decision
    }

    /// Compare the book's current Greeks against the limits
    pub fn check_health(
        &self,
        positions: &[Position],
        prices: Option<&HashMap<String, f64>>,
    ) -> RiskStatus {
        let config = self.config.read().clone();
        let (book, skipped) = valid_book(positions);
        let greeks = self.greeks.aggregate(&book, prices);
        let mut status = health_of(greeks, &config, self.is_kill_switch_active());
        status.warnings = skipped;

        if status.severity >= Severity::Warning {
            warn!(
                severity = ?status.severity,
                violations = status.violations.len(),
                "Portfolio health degraded"
            );
        }
        status
    }

    /// Greedy close-out plan for a book in Danger; empty otherwise.
    ///
    /// Closing stops once health leaves Danger, or once every limit ratio
    /// is at or below `reduction_target_ratio` when one is configured.
    pub fn forced_reduction(
        &self,
        positions: &[Position],
        prices: Option<&HashMap<String, f64>>,
    ) -> Vec<ReductionAction> {
        let config = self.config.read().clone();
        let kill_switch = self.is_kill_switch_active();
        let (book, _) = valid_book(positions);
        let positions: &[Position] = &book;
        let status = health_of(self.greeks.aggregate(positions, prices), &config, kill_switch);
        if status.severity != Severity::Danger {
            return Vec::new();
        }

        let contributions: Vec<f64> = positions
            .iter()
            .map(|p| {
                let resolved = match p {
                    Position::Option(opt) if opt.greeks.is_none() => {
                        let key = ContractKey::new(&opt.symbol, &opt.contract);
                        let spot = prices.and_then(|m| m.get(&opt.symbol).copied());
                        match self.greeks.resolve(&key, spot) {
                            GreeksLookup::Resolved(g) => Some(g),
                            GreeksLookup::Unavailable => None,
                        }
                    }
                    _ => None,
                };
                delta_contribution(p, resolved.as_ref())
            })
            .collect();

        let worst = status
            .violations
            .iter()
            .map(|v| v.metric.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let reason = format!("Forced reduction: {} beyond limits", worst);

        let actions = plan_reduction(positions, &contributions, &reason, |remaining| {
            let greeks = self.greeks.aggregate(remaining, prices);
            match config.reduction_target_ratio {
                Some(target) => limit_ratios(&greeks, &config.limits)
                    .iter()
                    .all(|v| v.ratio <= target),
                None => health_of(greeks, &config, kill_switch).severity < Severity::Danger,
            }
        });

        warn!(
            actions = actions.len(),
            violations = %worst,
            "Forced reduction planned"
        );
        actions
    }

    /// Base size scaled by gap risk, then by IV regime
    pub fn adjust_position_size(
        &self,
        symbol: &str,
        base_size: f64,
        at: Option<NaiveDateTime>,
    ) -> SizeAdjustment {
        let gap_multiplier = self
            .gap_risk
            .as_ref()
            .map(|m| m.read().get_size_multiplier(symbol, at))
            .unwrap_or(1.0);
        let iv_multiplier = self
            .iv_regime
            .as_ref()
            .map(|c| c.get_size_multiplier(symbol))
            .unwrap_or(1.0);

        let final_size = base_size * gap_multiplier * iv_multiplier;
        debug!(symbol, base_size, gap_multiplier, iv_multiplier, final_size, "Adjusted size");

        SizeAdjustment {
            base_size,
            gap_multiplier,
            iv_multiplier,
            final_size,
        }
    }

    /// Gap risk for a symbol; `None` when no event monitor is attached
    pub fn gap_risk(&self, symbol: &str, at: Option<NaiveDateTime>) -> Option<GapRisk> {
        self.gap_risk
            .as_ref()
            .map(|m| m.read().get_gap_risk(symbol, at))
    }

    /// UVaR at a horizon against the current balance
    pub fn uvar(&self, horizon_days: u32) -> Option<UvarResult> {
        let balance = self.account.lock().balance();
        self.tail_risk
            .as_ref()
            .map(|t| t.lock().calculate(horizon_days, Some(balance)))
    }

    /// Block all trades until reset
    pub fn trigger_kill_switch(&self, reason: &str) {
        let mut guard = self.kill_switch.write();
        if guard.is_none() {
            warn!(reason, "Kill switch triggered");
            *guard = Some(reason.to_string());
        }
    }

    pub fn reset_kill_switch(&self) {
        if self.kill_switch.write().take().is_some() {
            info!("Kill switch reset");
        }
    }

    pub fn is_kill_switch_active(&self) -> bool {
        self.kill_switch.read().is_some()
    }

    pub fn kill_switch_reason(&self) -> Option<String> {
        self.kill_switch.read().clone()
    }

    /// Validate and swap the limits; UVaR bounds reach the estimator too
    pub fn update_limits(&self, limits: RiskLimits) -> Result<()> {
        limits.validate()?;
        if let Some(tail_risk) = &self.tail_risk {
            tail_risk
                .lock()
                .update_limits(limits.max_uvar_1d, limits.max_uvar_3d)?;
        }
        info!(
            max_abs_delta = limits.max_abs_delta,
            max_theta = limits.max_theta_per_day,
            max_gamma = limits.max_gamma,
            max_vega = limits.max_vega,
            "Risk limits updated"
        );
        self.config.write().limits = limits;
        Ok(())
    }

    /// Apply a closed trade's P&L to the account
    pub fn record_trade_result(&self, pnl: f64) {
        let mut account = self.account.lock();
        account.record_trade_result(pnl);
        debug!(
            pnl,
            balance = account.balance(),
            streak = account.consecutive_losses(),
            "Trade result recorded"
        );
        self.engage_on_drawdown(&account);
    }

    pub fn update_balance(&self, balance: f64) {
        let mut account = self.account.lock();
        account.update_balance(balance);
        self.engage_on_drawdown(&account);
    }

    /// Start a new trading day
    pub fn reset_daily(&self) {
        let mut account = self.account.lock();
        account.reset_daily();
        info!(balance = account.balance(), "Daily account state reset");
    }

    /// Feed a day's P&L to the tail-risk estimator; no-op without one
    pub fn record_daily_pnl(&self, pnl: f64, date: Option<NaiveDate>) -> Result<()> {
        match &self.tail_risk {
            Some(tail_risk) => tail_risk.lock().add_daily_pnl(pnl, date),
            None => {
                debug!(pnl, "No tail-risk estimator, daily P&L ignored");
                Ok(())
            }
        }
    }

    fn engage_on_drawdown(&self, account: &AccountState) {
        let limits = self.config.read().account.clone();
        if let Some(breach) = account.check_loss_limits(&limits) {
            if breach.kind == AccountBreachKind::Drawdown {
                self.trigger_kill_switch(&breach.reason);
            }
        }
    }

    fn check_iv(
        &self,
        classifier: &VolatilityRegimeClassifier,
        trade: &ProposedTrade,
        config: &GatekeeperConfig,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let symbol = trade.symbol.as_str();
        let rank = classifier.iv_rank(symbol);

        let check = if trade.is_long_option() {
            if let Some(rank) = rank.filter(|r| *r >= config.max_iv_rank_long) {
                return Some(format!(
                    "IV rank {:.1} at or above {:.1} for long options",
                    rank, config.max_iv_rank_long
                ));
            }
            classifier.can_trade_long_options(symbol)
        } else {
            if let Some(rank) = rank.filter(|r| *r < config.min_iv_rank_short) {
                return Some(format!(
                    "IV rank {:.1} below {:.1} for short premium",
                    rank, config.min_iv_rank_short
                ));
            }
            classifier.can_trade_short_premium(symbol)
        };

        debug!(symbol, regime = %check.regime, allowed = check.allowed, "IV regime gate");
        if let Some(w) = check.warning {
            warnings.push(w);
        }
        if check.allowed {
            None
        } else {
            Some(format!("IV regime {}: {}", check.regime, check.reason))
        }
    }
}

fn reject(
    severity: Severity,
    reason: String,
    current: PortfolioGreeks,
    projected: Option<PortfolioGreeks>,
    warnings: Vec<String>,
) -> RiskDecision {
    warn!(severity = ?severity, reason = %reason, "Trade rejected");
    RiskDecision::reject(severity, reason, current, projected, warnings)
}

fn check_market(
    market: &MarketConditions,
    config: &GatekeeperConfig,
    warnings: &mut Vec<String>,
) -> Option<String> {
    if let Some(vix) = market.vix {
        if vix > config.max_vix {
            return Some(format!("VIX {:.2} above ceiling {:.2}", vix, config.max_vix));
        }
    }

    if let (Some(bid), Some(ask)) = (market.bid, market.ask) {
        if ask < bid {
            warnings.push(format!("Crossed quote: bid {:.2} > ask {:.2}", bid, ask));
        }
        let mid = (bid + ask) / 2.0;
        if mid <= 0.0 {
            return Some("No valid quote: mid price is zero".to_string());
        }
        let spread_pct = (ask - bid).abs() / mid * 100.0;
        if spread_pct > config.max_spread_pct {
            return Some(format!(
                "Bid/ask spread {:.2}% above ceiling {:.2}%",
                spread_pct, config.max_spread_pct
            ));
        }
    }

    None
}

/// Every Greek against its limit, breached or not
fn limit_ratios(greeks: &PortfolioGreeks, limits: &RiskLimits) -> Vec<LimitViolation> {
    let entry = |metric: GreekMetric, limit: f64| {
        let value = greeks.get(metric);
        let ratio = match metric {
            GreekMetric::Theta => value / limit,
            _ => value.abs() / limit,
        };
        LimitViolation {
            metric,
            value,
            limit,
            ratio,
        }
    };

    vec![
        entry(GreekMetric::Delta, limits.max_abs_delta),
        entry(GreekMetric::Gamma, limits.max_gamma),
        entry(GreekMetric::Theta, limits.max_theta_per_day),
        entry(GreekMetric::Vega, limits.max_vega),
    ]
}

fn violations(greeks: &PortfolioGreeks, limits: &RiskLimits) -> Vec<LimitViolation> {
    limit_ratios(greeks, limits)
        .into_iter()
        .filter(|v| v.ratio > 1.0)
        .collect()
}

/// Breaches in the projected book, excluding Greeks the trade improves.
///
/// Theta is bounded on the loss side only, so it improves when it rises.
/// The others improve when their magnitude shrinks.
fn projected_violations(
    current: &PortfolioGreeks,
    projected: &PortfolioGreeks,
    limits: &RiskLimits,
) -> Vec<LimitViolation> {
    violations(projected, limits)
        .into_iter()
        .filter(|v| {
            let before = current.get(v.metric);
            match v.metric {
                GreekMetric::Theta => v.value <= before,
                _ => v.value.abs() >= before.abs(),
            }
        })
        .collect()
}

/// Positions that pass validation, plus one warning per skipped position
fn valid_book(positions: &[Position]) -> (Cow<'_, [Position]>, Vec<String>) {
    if positions.iter().all(|p| p.validate().is_ok()) {
        return (Cow::Borrowed(positions), Vec::new());
    }

    let mut kept = Vec::with_capacity(positions.len());
    let mut skipped = Vec::new();
    for position in positions {
        match position.validate() {
            Ok(()) => kept.push(position.clone()),
            Err(e) => {
                warn!(symbol = position.symbol(), error = %e, "Skipping invalid position");
                skipped.push(format!("Skipped {}: {}", position.symbol(), e));
            }
        }
    }
    (Cow::Owned(kept), skipped)
}

fn health_of(greeks: PortfolioGreeks, config: &GatekeeperConfig, kill_switch_active: bool) -> RiskStatus {
    let violations = violations(&greeks, &config.limits);
    let severity = if violations.iter().any(|v| v.ratio > config.violation_threshold) {
        Severity::Danger
    } else if !violations.is_empty() {
        Severity::Warning
    } else {
        Severity::Safe
    };

    RiskStatus {
        severity,
        greeks,
        violations,
        kill_switch_active,
        warnings: Vec::new(),
    }
}
