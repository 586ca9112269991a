//! Portfolio Greeks aggregation
//!
//! Converts a heterogeneous position list into a portfolio-level
//! Delta/Gamma/Theta/Vega snapshot:
//! - Option contributions: `greek * |qty| * direction * 100`
//! - Stock contributions: `|qty| * direction` to delta only
//!
//! Greeks are never priced here. They come either from the position itself
//! or from an injected [`GreeksSource`]. When neither can supply them, the
//! option degrades to delta-one stock handling instead of failing the cycle.

use crate::position::{ContractKey, Greeks, OptionContract, OptionPosition, Position, CONTRACT_MULTIPLIER};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of a Greeks lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GreeksLookup {
    /// Greeks found for the contract
    Resolved(Greeks),

    /// Source could not provide Greeks (unknown contract, feed down)
    Unavailable,
}

/// External Greeks resolver keyed by `(symbol, strike, expiration, type)`
pub trait GreeksSource: Send + Sync {
    /// Resolve Greeks for a contract, optionally at a given underlying spot
    fn resolve(&self, key: &ContractKey, spot: Option<f64>) -> GreeksLookup;
}

impl<T: GreeksSource + ?Sized> GreeksSource for Arc<T> {
    fn resolve(&self, key: &ContractKey, spot: Option<f64>) -> GreeksLookup {
        (**self).resolve(key, spot)
    }
}

/// Map-backed resolver for snapshots loaded ahead of the decision cycle
#[derive(Debug, Clone, Default)]
pub struct InMemoryGreeksSource {
    greeks: HashMap<ContractKey, Greeks>,
}

impl InMemoryGreeksSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, contract: &OptionContract, greeks: Greeks) {
        self.greeks.insert(ContractKey::new(symbol, contract), greeks);
    }

    pub fn len(&self) -> usize {
        self.greeks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.greeks.is_empty()
    }
}

impl GreeksSource for InMemoryGreeksSource {
    fn resolve(&self, key: &ContractKey, _spot: Option<f64>) -> GreeksLookup {
        match self.greeks.get(key) {
            Some(greeks) => GreeksLookup::Resolved(*greeks),
            None => GreeksLookup::Unavailable,
        }
    }
}

/// The four limited Greeks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GreekMetric {
    Delta,
    Gamma,
    Theta,
    Vega,
}

impl fmt::Display for GreekMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GreekMetric::Delta => write!(f, "Delta"),
            GreekMetric::Gamma => write!(f, "Gamma"),
            GreekMetric::Theta => write!(f, "Theta"),
            GreekMetric::Vega => write!(f, "Vega"),
        }
    }
}

/// Portfolio-level Greeks snapshot.
///
/// Recomputed from scratch on every call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioGreeks {
    /// When the snapshot was computed
    pub timestamp: DateTime<Utc>,

    /// Net delta in share-equivalents
    pub delta: f64,

    /// Net gamma
    pub gamma: f64,

    /// Net theta per day
    pub theta: f64,

    /// Net vega
    pub vega: f64,

    /// Number of positions that contributed
    pub positions_count: usize,
}

impl PortfolioGreeks {
    /// Snapshot of an empty book
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            delta: 0.0,
            gamma: 0.0,
            theta: 0.0,
            vega: 0.0,
            positions_count: 0,
        }
    }

    pub fn get(&self, metric: GreekMetric) -> f64 {
        match metric {
            GreekMetric::Delta => self.delta,
            GreekMetric::Gamma => self.gamma,
            GreekMetric::Theta => self.theta,
            GreekMetric::Vega => self.vega,
        }
    }
}

/// Aggregates position Greeks into a [`PortfolioGreeks`] snapshot.
///
/// Resolved lookups are cached for the aggregator's lifetime; the cache is
/// safe to clear at any time.
pub struct GreeksAggregator {
    source: Option<Box<dyn GreeksSource>>,
    cache: Mutex<HashMap<ContractKey, Greeks>>,
}

impl GreeksAggregator {
    /// Aggregator without a resolver: options lacking Greeks count as stock
    pub fn new() -> Self {
        Self {
            source: None,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Aggregator backed by an external resolver
    pub fn with_source(source: Box<dyn GreeksSource>) -> Self {
        Self {
            source: Some(source),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Aggregate Greeks across `positions`.
    ///
    /// `prices` maps underlying symbol to spot and is forwarded to the
    /// resolver. Closed positions (`|qty| < 0.01`) are skipped.
    pub fn aggregate(
        &self,
        positions: &[Position],
        prices: Option<&HashMap<String, f64>>,
    ) -> PortfolioGreeks {
        let mut snapshot = PortfolioGreeks::empty();

        for position in positions {
            if !position.is_open() {
                continue;
            }

            let qty = position.quantity().abs();
            let direction = position.side().direction();

            let option_greeks = match position {
                Position::Option(opt) => self.option_greeks(opt, prices),
                Position::Stock(_) => None,
            };

            match option_greeks {
                Some(greeks) => {
                    let scale = qty * direction * CONTRACT_MULTIPLIER;
                    snapshot.delta += greeks.delta * scale;
                    snapshot.gamma += greeks.gamma * scale;
                    snapshot.theta += greeks.theta * scale;
                    snapshot.vega += greeks.vega * scale;
                }
                None => {
                    // Stock delta is 1 per share
                    snapshot.delta += qty * direction;
                }
            }

            snapshot.positions_count += 1;
        }

        debug!(
            delta = snapshot.delta,
            gamma = snapshot.gamma,
            theta = snapshot.theta,
            vega = snapshot.vega,
            positions = snapshot.positions_count,
            "Aggregated portfolio Greeks"
        );

        snapshot
    }

    /// Greeks for an option position: supplied, cached, or resolved
    fn option_greeks(
        &self,
        opt: &OptionPosition,
        prices: Option<&HashMap<String, f64>>,
    ) -> Option<Greeks> {
        if let Some(greeks) = opt.greeks {
            return Some(greeks);
        }

        let key = ContractKey::new(&opt.symbol, &opt.contract);
        let spot = prices.and_then(|p| p.get(&opt.symbol).copied());

        match self.resolve(&key, spot) {
            GreeksLookup::Resolved(greeks) => Some(greeks),
            GreeksLookup::Unavailable => {
                warn!(
                    symbol = %opt.symbol,
                    strike = opt.contract.strike,
                    expiration = %opt.contract.expiration,
                    option_type = %opt.contract.option_type,
                    "Greeks unavailable, treating option as stock"
                );
                None
            }
        }
    }

    /// Look up Greeks through the cache, then the resolver
    pub fn resolve(&self, key: &ContractKey, spot: Option<f64>) -> GreeksLookup {
        if let Some(greeks) = self.cache.lock().get(key) {
            return GreeksLookup::Resolved(*greeks);
        }

        let Some(source) = &self.source else {
            return GreeksLookup::Unavailable;
        };

        let lookup = source.resolve(key, spot);
        if let GreeksLookup::Resolved(greeks) = lookup {
            self.cache.lock().insert(key.clone(), greeks);
        }
        lookup
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

impl Default for GreeksAggregator {
    fn default() -> Self {
        Self::new()
    }
}
