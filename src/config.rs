//! Gatekeeper configuration
//!
//! A single serde document covering hard Greek limits, account guards,
//! trade-level filters and the settings of each optional component.
//! Every field has a default, so a partial document is valid:
//!
//! ```yaml
//! limits:
//!   max_abs_delta: 300.0
//! account:
//!   starting_balance: 50000.0
//! max_vix: 30.0
//! ```

use crate::error::{GatekeeperError, Result};
use crate::gap_risk::GapRiskConfig;
use crate::iv_regime::RegimeThresholds;
use crate::uvar::UvarConfig;
use serde::{Deserialize, Serialize};

/// Hard portfolio limits
///
/// `max_theta_per_day` and the UVaR bounds are losses and must be negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Max |delta| in share-equivalents
    pub max_abs_delta: f64,

    /// Max daily decay in dollars (negative)
    pub max_theta_per_day: f64,

    /// Max |gamma|
    pub max_gamma: f64,

    /// Max |vega| in dollars per vol point
    pub max_vega: f64,

    /// 1-day UVaR bound in dollars (negative)
    pub max_uvar_1d: f64,

    /// 3-day UVaR bound in dollars (negative)
    pub max_uvar_3d: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_abs_delta: 500.0,
            max_theta_per_day: -200.0,
            max_gamma: 50.0,
            max_vega: 1000.0,
            max_uvar_1d: -1500.0,
            max_uvar_3d: -2500.0,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<()> {
        positive("max_abs_delta", self.max_abs_delta)?;
        positive("max_gamma", self.max_gamma)?;
        positive("max_vega", self.max_vega)?;
        negative("max_theta_per_day", self.max_theta_per_day)?;
        negative("max_uvar_1d", self.max_uvar_1d)?;
        negative("max_uvar_3d", self.max_uvar_3d)?;
        Ok(())
    }
}

/// Account-level loss guards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountLimits {
    pub starting_balance: f64,

    /// Max loss since day start, percent of the day-start balance (3.0 = 3%)
    pub max_daily_loss_pct: f64,

    /// Max decline from peak balance, percent (10.0 = 10%)
    pub max_drawdown_pct: f64,

    /// Losing trades in a row that halt trading
    pub max_consecutive_losses: u32,
}

impl Default for AccountLimits {
    fn default() -> Self {
        Self {
            starting_balance: 100_000.0,
            max_daily_loss_pct: 3.0,
            max_drawdown_pct: 10.0,
            max_consecutive_losses: 3,
        }
    }
}

impl AccountLimits {
    pub fn validate(&self) -> Result<()> {
        positive("starting_balance", self.starting_balance)?;
        percent("max_daily_loss_pct", self.max_daily_loss_pct)?;
        percent("max_drawdown_pct", self.max_drawdown_pct)?;
        if self.max_consecutive_losses == 0 {
            return Err(GatekeeperError::InvalidConfig(
                "max_consecutive_losses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete gatekeeper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    pub limits: RiskLimits,
    pub account: AccountLimits,

    /// Long options are refused at or above this IV rank
    pub max_iv_rank_long: f64,

    /// Premium selling is refused below this IV rank
    pub min_iv_rank_short: f64,

    /// Ambient volatility ceiling
    pub max_vix: f64,

    /// Max bid/ask spread as percent of mid
    pub max_spread_pct: f64,

    /// Health is Danger once any limit ratio exceeds this
    pub violation_threshold: f64,

    /// Max 1-day UVaR after the trade, percent of balance
    pub max_uvar_pct: f64,

    /// Forced reduction keeps closing until every ratio is at or below this.
    /// When unset it stops as soon as health leaves Danger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduction_target_ratio: Option<f64>,

    pub uvar: UvarConfig,
    pub gap_risk: GapRiskConfig,
    pub regime: RegimeThresholds,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            limits: RiskLimits::default(),
            account: AccountLimits::default(),
            max_iv_rank_long: 70.0,
            min_iv_rank_short: 30.0,
            max_vix: 35.0,
            max_spread_pct: 10.0,
            violation_threshold: 1.5,
            max_uvar_pct: 3.0,
            reduction_target_ratio: None,
            uvar: UvarConfig::default(),
            gap_risk: GapRiskConfig::default(),
            regime: RegimeThresholds::default(),
        }
    }
}

impl GatekeeperConfig {
    /// Parse and validate a YAML document
    ///
    /// # Example
    ///
    /// ```
    /// use ag_gatekeeper::GatekeeperConfig;
    ///
    /// let yaml = r#"
    /// limits:
    ///   max_abs_delta: 250.0
    /// max_vix: 28.0
    /// "#;
    ///
    /// let config = GatekeeperConfig::from_yaml(yaml).unwrap();
    /// assert_eq!(config.limits.max_abs_delta, 250.0);
    /// assert_eq!(config.limits.max_gamma, 50.0);
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.account.validate()?;
        self.uvar.validate()?;
        self.gap_risk.validate()?;
        self.regime.validate()?;

        iv_rank("max_iv_rank_long", self.max_iv_rank_long)?;
        iv_rank("min_iv_rank_short", self.min_iv_rank_short)?;
        positive("max_vix", self.max_vix)?;
        percent("max_spread_pct", self.max_spread_pct)?;
        percent("max_uvar_pct", self.max_uvar_pct)?;

        if self.violation_threshold.is_nan() || self.violation_threshold < 1.0 {
            return Err(GatekeeperError::InvalidConfig(format!(
                "violation_threshold must be >= 1.0, got {}",
                self.violation_threshold
            )));
        }
        if let Some(target) = self.reduction_target_ratio {
            if !(target > 0.0 && target <= self.violation_threshold) {
                return Err(GatekeeperError::InvalidConfig(format!(
                    "reduction_target_ratio must be in (0, {}], got {}",
                    self.violation_threshold, target
                )));
            }
        }
        Ok(())
    }

    /// UVaR settings with the bounds taken from `limits`
    pub(crate) fn uvar_config(&self) -> UvarConfig {
        UvarConfig {
            max_uvar_1d: self.limits.max_uvar_1d,
            max_uvar_3d: self.limits.max_uvar_3d,
            ..self.uvar.clone()
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(GatekeeperError::InvalidConfig(format!(
            "{} must be positive, got {}",
            name, value
        )))
    }
}

fn negative(name: &str, value: f64) -> Result<()> {
    if value < 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(GatekeeperError::InvalidConfig(format!(
            "{} must be negative, got {}",
            name, value
        )))
    }
}

fn percent(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 100.0 {
        Ok(())
    } else {
        Err(GatekeeperError::InvalidConfig(format!(
            "{} must be in (0, 100], got {}",
            name, value
        )))
    }
}

fn iv_rank(name: &str, value: f64) -> Result<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(GatekeeperError::InvalidConfig(format!(
            "{} must be in [0, 100], got {}",
            name, value
        )))
    }
}
