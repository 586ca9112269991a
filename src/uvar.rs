//! Ultra-short-horizon Value at Risk (UVaR)
//!
//! Historical simulation over a rolling window of daily P&L:
//! - `uvar_1d`: the `(1 - confidence)` percentile of daily P&L (negative = loss)
//! - `uvar_3d`, `uvar_5d`: `uvar_1d * sqrt(horizon)`
//!
//! The multi-day figures use square-root-of-time scaling, which assumes
//! independent, identically distributed daily P&L. They are NOT computed from
//! resampled multi-day P&L and will understate risk when losses cluster.

use crate::clock::market_today;
use crate::error::{GatekeeperError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Percentile loss reported while the window holds too few samples.
///
/// A placeholder, not an estimate.
pub const INSUFFICIENT_DATA_LOSS: f64 = -2000.0;

/// UVaR configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UvarConfig {
    /// Window length in samples (trading days)
    pub lookback_days: usize,

    /// Confidence level (0.99 = 1st percentile of daily P&L)
    pub confidence: f64,

    /// Samples required before the estimate is trusted
    pub min_samples: usize,

    /// 1-day UVaR bound (negative dollars)
    pub max_uvar_1d: f64,

    /// 3-day UVaR bound (negative dollars)
    pub max_uvar_3d: f64,
}

impl Default for UvarConfig {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            confidence: 0.99,
            min_samples: 30,
            max_uvar_1d: -1500.0,
            max_uvar_3d: -2500.0,
        }
    }
}

impl UvarConfig {
    pub fn validate(&self) -> Result<()> {
        if self.confidence <= 0.0 || self.confidence >= 1.0 {
            return Err(GatekeeperError::InvalidConfig(format!(
                "UVaR confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }

        if self.min_samples < 2 {
            return Err(GatekeeperError::InvalidConfig(
                "UVaR min_samples must be at least 2".to_string(),
            ));
        }

        if self.lookback_days < self.min_samples {
            return Err(GatekeeperError::InvalidConfig(format!(
                "UVaR lookback ({}) shorter than min_samples ({})",
                self.lookback_days, self.min_samples
            )));
        }

        if self.max_uvar_1d >= 0.0 || self.max_uvar_3d >= 0.0 {
            return Err(GatekeeperError::InvalidConfig(
                "UVaR limits must be negative".to_string(),
            ));
        }

        Ok(())
    }
}

/// Tail-risk status against configured bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UvarStatus {
    WithinLimits,
    Warning,
    Danger,
}

/// One day of realized P&L
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPnl {
    pub date: NaiveDate,
    pub pnl: f64,
}

/// UVaR calculation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvarResult {
    /// 1-day UVaR (negative = loss)
    pub uvar_1d: f64,

    /// 3-day UVaR, `uvar_1d * sqrt(3)`
    pub uvar_3d: f64,

    /// 5-day UVaR, `uvar_1d * sqrt(5)`
    pub uvar_5d: f64,

    /// UVaR at the requested horizon
    pub horizon_uvar: f64,

    /// Requested horizon in days
    pub horizon_days: u32,

    /// Status against the 1d/3d bounds
    pub status: UvarStatus,

    /// Raw percentile of daily P&L
    pub percentile_loss: f64,

    /// Samples in the window
    pub sample_size: usize,

    /// False when the figures are the fixed placeholder
    pub sufficient_data: bool,

    /// `|uvar_1d|` as a percentage of portfolio value, when a value was supplied
    pub uvar_pct: Option<f64>,

    /// Mean of daily P&L at or below the percentile (1-day CVaR)
    pub expected_shortfall_1d: Option<f64>,

    /// Sample mean of the window
    pub mean_pnl: Option<f64>,

    /// Sample standard deviation of the window
    pub std_dev_pnl: Option<f64>,
}

/// Pass/fail for a single horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitCheck {
    pub passed: bool,
    pub reason: String,
    pub value: f64,
    pub limit: f64,
}

/// UVaR before and after adding a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementalUvar {
    /// 1-day UVaR of the current book
    pub before: f64,

    /// 1-day UVaR with the new position
    pub after: f64,

    /// `after - before` (negative = more risk)
    pub incremental: f64,

    /// `|after|` as a percentage of portfolio value
    pub uvar_pct: f64,

    /// False when `before` is the placeholder
    pub sufficient_data: bool,
}

/// Rolling-window tail-risk estimator
#[derive(Debug, Clone)]
pub struct TailRiskEstimator {
    config: UvarConfig,
    window: VecDeque<DailyPnl>,
}

impl TailRiskEstimator {
    /// Create an estimator; fails on invalid configuration
    pub fn new(config: UvarConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: VecDeque::with_capacity(config.lookback_days + 1),
            config,
        })
    }

    pub fn config(&self) -> &UvarConfig {
        &self.config
    }

    /// Replace the UVaR bounds
    pub fn update_limits(&mut self, max_uvar_1d: f64, max_uvar_3d: f64) -> Result<()> {
        let config = UvarConfig {
            max_uvar_1d,
            max_uvar_3d,
            ..self.config.clone()
        };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Append a day of P&L (`None` date = today, market time).
    ///
    /// A second sample for the newest date replaces it; older dates are
    /// rejected. The oldest sample is evicted once the window is full.
    pub fn add_daily_pnl(&mut self, pnl: f64, date: Option<NaiveDate>) -> Result<()> {
        if !pnl.is_finite() {
            return Err(GatekeeperError::InvalidParameter(format!(
                "Daily P&L must be finite, got {}",
                pnl
            )));
        }

        let date = date.unwrap_or_else(market_today);

        if let Some(newest) = self.window.back_mut() {
            if date < newest.date {
                return Err(GatekeeperError::OutOfOrderSample {
                    date,
                    newest: newest.date,
                });
            }
            if date == newest.date {
                newest.pnl = pnl;
                return Ok(());
            }
        }

        self.window.push_back(DailyPnl { date, pnl });
        while self.window.len() > self.config.lookback_days {
            self.window.pop_front();
        }

        Ok(())
    }

    pub fn sample_size(&self) -> usize {
        self.window.len()
    }

    pub fn samples(&self) -> impl Iterator<Item = &DailyPnl> {
        self.window.iter()
    }

    pub fn has_sufficient_data(&self) -> bool {
        self.window.len() >= self.config.min_samples
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Calculate UVaR at 1/3/5 days plus the requested horizon.
    ///
    /// With fewer than `min_samples` samples this returns the conservative
    /// placeholder ([`INSUFFICIENT_DATA_LOSS`], status `Warning`).
    pub fn calculate(&self, horizon_days: u32, portfolio_value: Option<f64>) -> UvarResult {
        let horizon_days = horizon_days.max(1);
        let sample_size = self.window.len();

        if !self.has_sufficient_data() {
            warn!(
                samples = sample_size,
                required = self.config.min_samples,
                "Insufficient P&L history, using placeholder UVaR"
            );
            let uvar_1d = INSUFFICIENT_DATA_LOSS;
            return UvarResult {
                uvar_1d,
                uvar_3d: scale(uvar_1d, 3),
                uvar_5d: scale(uvar_1d, 5),
                horizon_uvar: scale(uvar_1d, horizon_days),
                horizon_days,
                status: UvarStatus::Warning,
                percentile_loss: uvar_1d,
                sample_size,
                sufficient_data: false,
                uvar_pct: pct_of(uvar_1d, portfolio_value),
                expected_shortfall_1d: None,
                mean_pnl: None,
                std_dev_pnl: None,
            };
        }

        let mut sorted: Vec<f64> = self.window.iter().map(|s| s.pnl).collect();
        sorted.sort_by(f64::total_cmp);

        let percentile_loss = percentile(&sorted, 1.0 - self.config.confidence);
        let uvar_1d = percentile_loss;
        let uvar_3d = scale(uvar_1d, 3);
        let uvar_5d = scale(uvar_1d, 5);

        let tail: Vec<f64> = sorted.iter().copied().filter(|p| *p <= uvar_1d).collect();
        let expected_shortfall_1d = if tail.is_empty() { None } else { Some(tail.iter().mean()) };

        let status = self.status_for(uvar_1d, uvar_3d);

        debug!(
            uvar_1d,
            uvar_3d,
            uvar_5d,
            samples = sample_size,
            ?status,
            "Calculated UVaR"
        );

        UvarResult {
            uvar_1d,
            uvar_3d,
            uvar_5d,
            horizon_uvar: scale(uvar_1d, horizon_days),
            horizon_days,
            status,
            percentile_loss,
            sample_size,
            sufficient_data: true,
            uvar_pct: pct_of(uvar_1d, portfolio_value),
            expected_shortfall_1d,
            mean_pnl: Some(sorted.iter().mean()),
            std_dev_pnl: Some(sorted.iter().std_dev()),
        }
    }

    /// Compare one horizon against its bound.
    ///
    /// Horizons 1 and 3 use their configured bounds. Any other horizon is
    /// checked against `max_uvar_1d * sqrt(h)`. The placeholder never passes.
    pub fn check_limit(&self, horizon_days: u32) -> LimitCheck {
        let result = self.calculate(horizon_days, None);
        let (value, limit) = match result.horizon_days {
            1 => (result.uvar_1d, self.config.max_uvar_1d),
            3 => (result.uvar_3d, self.config.max_uvar_3d),
            h => (result.horizon_uvar, scale(self.config.max_uvar_1d, h)),
        };

        if !result.sufficient_data {
            return LimitCheck {
                passed: false,
                reason: format!(
                    "Insufficient P&L history ({} of {} samples)",
                    result.sample_size, self.config.min_samples
                ),
                value,
                limit,
            };
        }

        if value < limit {
            LimitCheck {
                passed: false,
                reason: format!(
                    "{}d UVaR {:.2} exceeds limit {:.2}",
                    result.horizon_days, value, limit
                ),
                value,
                limit,
            }
        } else {
            LimitCheck {
                passed: true,
                reason: format!(
                    "{}d UVaR {:.2} within limit {:.2}",
                    result.horizon_days, value, limit
                ),
                value,
                limit,
            }
        }
    }

    /// UVaR impact of adding a position worth `position_value`.
    ///
    /// The new exposure is assumed to move with the existing book, so the
    /// historical scenarios scale by `1 + position_value / portfolio_value`.
    /// A non-positive portfolio value yields an infinite percentage.
    pub fn calculate_incremental(&self, position_value: f64, portfolio_value: f64) -> IncrementalUvar {
        let current = self.calculate(1, Some(portfolio_value));
        let before = current.uvar_1d;

        if portfolio_value <= 0.0 {
            return IncrementalUvar {
                before,
                after: before,
                incremental: 0.0,
                uvar_pct: f64::INFINITY,
                sufficient_data: current.sufficient_data,
            };
        }

        let after = before * (1.0 + position_value.abs() / portfolio_value);
        let uvar_pct = loss_of(after) / portfolio_value * 100.0;

        IncrementalUvar {
            before,
            after,
            incremental: after - before,
            uvar_pct,
            sufficient_data: current.sufficient_data,
        }
    }

    fn status_for(&self, uvar_1d: f64, uvar_3d: f64) -> UvarStatus {
        let max_1d = self.config.max_uvar_1d;
        let max_3d = self.config.max_uvar_3d;

        if uvar_1d > max_1d && uvar_3d > max_3d {
            UvarStatus::WithinLimits
        } else if uvar_1d < 2.0 * max_1d || uvar_3d < 2.0 * max_3d {
            UvarStatus::Danger
        } else {
            UvarStatus::Warning
        }
    }
}

/// Square-root-of-time scaling
fn scale(uvar_1d: f64, horizon_days: u32) -> f64 {
    uvar_1d * (horizon_days as f64).sqrt()
}

/// Loss magnitude of a P&L figure; a positive percentile is no loss
fn loss_of(uvar: f64) -> f64 {
    (-uvar).max(0.0)
}

fn pct_of(uvar: f64, portfolio_value: Option<f64>) -> Option<f64> {
    portfolio_value
        .filter(|v| *v > 0.0)
        .map(|v| loss_of(uvar) / v * 100.0)
}

/// Order-statistic percentile of sorted data, `q` in [0, 1].
///
/// Picks `sorted[floor(q * (n - 1))]` without interpolating, so a new sample
/// above the current value can never pull the estimate down.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let index = (q * (sorted.len() - 1) as f64).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
