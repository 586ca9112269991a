//! Implied-volatility regime classification
//!
//! IV Rank (0-100) is bucketed into a regime that gates trade direction:
//! - Extreme: no new long options (IV crush), size x0.6
//! - High: size x0.8, favor fast exits
//! - Low: no short premium (premium too thin for the risk)
//! - Unknown: no rank data, allowed with a warning

use crate::error::{GatekeeperError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Volatility regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolRegime {
    Low,
    Normal,
    High,
    Extreme,
    Unknown,
}

impl fmt::Display for VolRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolRegime::Low => "low",
            VolRegime::Normal => "normal",
            VolRegime::High => "high",
            VolRegime::Extreme => "extreme",
            VolRegime::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// External IV Rank provider
pub trait IvRankSource: Send + Sync {
    /// IV Rank in [0, 100], `None` when unavailable
    fn iv_rank(&self, symbol: &str) -> Option<f64>;
}

impl<T: IvRankSource + ?Sized> IvRankSource for Arc<T> {
    fn iv_rank(&self, symbol: &str) -> Option<f64> {
        (**self).iv_rank(symbol)
    }
}

/// Map-backed IV Rank store, refreshed by the caller each cycle
#[derive(Debug, Default)]
pub struct InMemoryIvRanks {
    ranks: RwLock<HashMap<String, f64>>,
}

impl InMemoryIvRanks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: &str, iv_rank: f64) {
        self.ranks.write().insert(symbol.to_ascii_uppercase(), iv_rank);
    }

    pub fn remove(&self, symbol: &str) {
        self.ranks.write().remove(&symbol.to_ascii_uppercase());
    }
}

impl IvRankSource for InMemoryIvRanks {
    fn iv_rank(&self, symbol: &str) -> Option<f64> {
        self.ranks.read().get(&symbol.to_ascii_uppercase()).copied()
    }
}

/// Upper bounds (exclusive) of the Low, Normal and High regimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeThresholds {
    pub low: f64,
    pub normal: f64,
    pub high: f64,
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            low: 20.0,
            normal: 50.0,
            high: 80.0,
        }
    }
}

impl RegimeThresholds {
    pub fn validate(&self) -> Result<()> {
        let ordered = 0.0 < self.low && self.low < self.normal && self.normal < self.high;
        if !ordered || self.high > 100.0 {
            return Err(GatekeeperError::InvalidConfig(format!(
                "IV regime thresholds must satisfy 0 < low < normal < high <= 100, got {}/{}/{}",
                self.low, self.normal, self.high
            )));
        }
        Ok(())
    }
}

/// Result of a direction gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeCheck {
    pub allowed: bool,
    pub regime: VolRegime,
    pub iv_rank: Option<f64>,
    pub reason: String,

    /// Set when allowed but worth surfacing (low IV for longs, unknown regime)
    pub warning: Option<String>,
}

/// Classifies symbols into volatility regimes
pub struct VolatilityRegimeClassifier {
    source: Box<dyn IvRankSource>,
    thresholds: RegimeThresholds,
}

impl VolatilityRegimeClassifier {
    pub fn new(source: Box<dyn IvRankSource>, thresholds: RegimeThresholds) -> Result<Self> {
        thresholds.validate()?;
        Ok(Self { source, thresholds })
    }

    pub fn thresholds(&self) -> &RegimeThresholds {
        &self.thresholds
    }

    /// IV Rank for a symbol, discarding values outside [0, 100]
    pub fn iv_rank(&self, symbol: &str) -> Option<f64> {
        let rank = self.source.iv_rank(symbol)?;
        if !rank.is_finite() || !(0.0..=100.0).contains(&rank) {
            warn!(symbol, rank, "Ignoring out-of-range IV rank");
            return None;
        }
        Some(rank)
    }

    pub fn get_regime(&self, symbol: &str) -> (VolRegime, Option<f64>) {
        let Some(rank) = self.iv_rank(symbol) else {
            return (VolRegime::Unknown, None);
        };

        let regime = if rank < self.thresholds.low {
            VolRegime::Low
        } else if rank < self.thresholds.normal {
            VolRegime::Normal
        } else if rank < self.thresholds.high {
            VolRegime::High
        } else {
            VolRegime::Extreme
        };

        (regime, Some(rank))
    }

    /// Buying options: blocked only in the extreme regime
    pub fn can_trade_long_options(&self, symbol: &str) -> RegimeCheck {
        let (regime, iv_rank) = self.get_regime(symbol);
        let rank = fmt_rank(iv_rank);

        let (allowed, reason, warning) = match regime {
            VolRegime::Extreme => (
                false,
                format!("IV rank {} is extreme; long options exposed to IV crush", rank),
                None,
            ),
            VolRegime::Low => (
                true,
                format!("IV rank {} is low; options are cheap", rank),
                Some(format!("{}: low IV, long options may lack movement", symbol)),
            ),
            VolRegime::Unknown => (
                true,
                "No IV rank data".to_string(),
                Some(format!("{}: IV regime unknown", symbol)),
            ),
            _ => (true, format!("IV rank {} is {}", rank, regime), None),
        };

        if let Some(w) = &warning {
            warn!(symbol, %regime, "{}", w);
        }

        RegimeCheck {
            allowed,
            regime,
            iv_rank,
            reason,
            warning,
        }
    }

    /// Selling premium: blocked only in the low regime
    pub fn can_trade_short_premium(&self, symbol: &str) -> RegimeCheck {
        let (regime, iv_rank) = self.get_regime(symbol);
        let rank = fmt_rank(iv_rank);

        let (allowed, reason, warning) = match regime {
            VolRegime::Low => (
                false,
                format!("IV rank {} is low; premium too thin to sell", rank),
                None,
            ),
            VolRegime::High | VolRegime::Extreme => (
                true,
                format!("IV rank {} is {}; favorable for selling premium", rank, regime),
                None,
            ),
            VolRegime::Unknown => (
                true,
                "No IV rank data".to_string(),
                Some(format!("{}: IV regime unknown", symbol)),
            ),
            VolRegime::Normal => (true, format!("IV rank {} is normal", rank), None),
        };

        if let Some(w) = &warning {
            warn!(symbol, %regime, "{}", w);
        }

        RegimeCheck {
            allowed,
            regime,
            iv_rank,
            reason,
            warning,
        }
    }

    pub fn get_size_multiplier(&self, symbol: &str) -> f64 {
        match self.get_regime(symbol).0 {
            VolRegime::Extreme => 0.6,
            VolRegime::High => 0.8,
            _ => 1.0,
        }
    }

    pub fn should_favor_fast_exit(&self, symbol: &str) -> bool {
        matches!(self.get_regime(symbol).0, VolRegime::High | VolRegime::Extreme)
    }
}

fn fmt_rank(iv_rank: Option<f64>) -> String {
    iv_rank
        .map(|r| format!("{:.1}", r))
        .unwrap_or_else(|| "n/a".to_string())
}
