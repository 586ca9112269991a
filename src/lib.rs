//! # ag-gatekeeper: Pre-trade risk gatekeeper for short-dated options
//!
//! Sits between signal generation and order execution and bounds four loss
//! sources on a leveraged options book: aggregate Greeks, historical tail
//! risk (UVaR), scheduled event gaps, and extreme implied volatility.
//!
//! ## Core Components
//!
//! - **GreeksAggregator**: position list to portfolio Delta/Gamma/Theta/Vega
//! - **TailRiskEstimator**: rolling daily P&L window, historical-simulation UVaR
//! - **EventRiskMonitor**: earnings and macro calendars, gap-risk tiers
//! - **VolatilityRegimeClassifier**: IV rank regimes, direction gates
//! - **RiskGatekeeper**: composes the above into one pre-trade decision
//!
//! ## Example Usage
//!
//! ```rust
//! use ag_gatekeeper::{MarketConditions, Position, ProposedTrade, RiskGatekeeper, Side};
//!
//! let yaml = r#"
//! limits:
//!   max_abs_delta: 500.0
//! account:
//!   starting_balance: 100000.0
//! "#;
//!
//! let gatekeeper = RiskGatekeeper::from_yaml(yaml).unwrap();
//!
//! let book = vec![Position::stock("SPY", 450.0, Side::Long, 450.0)];
//! let trade = ProposedTrade::stock("SPY", 100.0, Side::Long, 450.0);
//!
//! let decision = gatekeeper.evaluate_trade(&trade, &book, &MarketConditions::default());
//! assert!(!decision.allowed); // Projected delta 550 exceeds 500
//! assert!(decision.reason.contains("Delta"));
//! ```

pub mod account;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gap_risk;
pub mod greeks;
pub mod iv_regime;
pub mod position;
pub mod reduction;
pub mod uvar;

pub use account::{AccountBreach, AccountBreachKind, AccountState};
pub use config::{AccountLimits, GatekeeperConfig, RiskLimits};
pub use engine::{LimitViolation, MarketConditions, RiskGatekeeper, RiskStatus, SizeAdjustment};
pub use error::{GatekeeperError, Result};
pub use gap_risk::{
    EventRiskMonitor, GapRisk, GapRiskConfig, GapRiskSource, MacroEvent, MacroEventKind, RiskLevel,
};
pub use greeks::{
    GreekMetric, GreeksAggregator, GreeksLookup, GreeksSource, InMemoryGreeksSource,
    PortfolioGreeks,
};
pub use iv_regime::{
    InMemoryIvRanks, IvRankSource, RegimeCheck, RegimeThresholds, VolRegime,
    VolatilityRegimeClassifier,
};
pub use position::{
    merge_trade, ContractKey, Greeks, InstrumentKey, OptionContract, OptionPosition, OptionType,
    Position, ProposedTrade, Side, StockPosition,
};
pub use reduction::ReductionAction;
pub use uvar::{
    DailyPnl, IncrementalUvar, LimitCheck, TailRiskEstimator, UvarConfig, UvarResult, UvarStatus,
};

use serde::{Deserialize, Serialize};

/// Decision and health severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Within all limits
    Safe,

    /// Allowed, but something is worth surfacing
    Warning,

    /// A per-trade veto or a limit well past its bound
    Danger,

    /// Trading halted (kill switch, account guards)
    Blocked,
}

/// Result of a pre-trade evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskDecision {
    /// Whether the trade may be sent
    pub allowed: bool,

    /// Why the trade was refused, or a pass summary
    pub reason: String,

    pub severity: Severity,

    /// Greeks of the book before the trade
    pub current_greeks: PortfolioGreeks,

    /// Greeks of the book after the trade, when the evaluation got that far
    pub projected_greeks: Option<PortfolioGreeks>,

    /// Non-blocking concerns raised along the way
    pub warnings: Vec<String>,
}

impl RiskDecision {
    /// An allowed decision; `Warning` severity when any warning was raised
    pub fn allow(
        current_greeks: PortfolioGreeks,
        projected_greeks: Option<PortfolioGreeks>,
        warnings: Vec<String>,
    ) -> Self {
        let severity = if warnings.is_empty() {
            Severity::Safe
        } else {
            Severity::Warning
        };
        Self {
            allowed: true,
            reason: "All risk checks passed".to_string(),
            severity,
            current_greeks,
            projected_greeks,
            warnings,
        }
    }

    pub fn reject(
        severity: Severity,
        reason: String,
        current_greeks: PortfolioGreeks,
        projected_greeks: Option<PortfolioGreeks>,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            allowed: false,
            reason,
            severity,
            current_greeks,
            projected_greeks,
            warnings,
        }
    }
}
