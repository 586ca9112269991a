//! Position and trade model
//!
//! Positions arrive from the broker feed as a discriminated union: a plain
//! stock holding or an option holding that always carries a complete contract
//! descriptor. A proposed trade is merged into the current book with
//! [`merge_trade`] to build the projected position set.

use crate::error::{GatekeeperError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shares of underlying per listed option contract
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Positions smaller than this are treated as closed
pub const MIN_OPEN_QUANTITY: f64 = 0.01;

/// Position side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1.0 for long, -1.0 for short
    pub fn direction(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Side implied by a signed quantity (zero counts as long)
    pub fn from_signed(quantity: f64) -> Self {
        if quantity < 0.0 {
            Side::Short
        } else {
            Side::Long
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Option type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Listed option contract descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// Call or put
    pub option_type: OptionType,

    /// Strike price
    pub strike: f64,

    /// Expiration date
    pub expiration: NaiveDate,
}

impl OptionContract {
    pub fn new(option_type: OptionType, strike: f64, expiration: NaiveDate) -> Self {
        Self {
            option_type,
            strike,
            expiration,
        }
    }

    /// Days to expiration as of `today` (negative once expired)
    pub fn dte(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }
}

/// Per-contract Greeks, expressed per share of underlying
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta: price sensitivity
    pub delta: f64,

    /// Gamma: rate of change of delta
    pub gamma: f64,

    /// Theta: time decay per day
    pub theta: f64,

    /// Vega: sensitivity to a one-point move in implied volatility
    pub vega: f64,
}

impl Greeks {
    pub fn new(delta: f64, gamma: f64, theta: f64, vega: f64) -> Self {
        Self {
            delta,
            gamma,
            theta,
            vega,
        }
    }
}

/// Hashable identity of an option contract.
///
/// The strike is stored in thousandths so the key can derive `Eq`/`Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractKey {
    pub symbol: String,
    pub strike_millis: i64,
    pub expiration: NaiveDate,
    pub option_type: OptionType,
}

impl ContractKey {
    pub fn new(symbol: &str, contract: &OptionContract) -> Self {
        Self {
            symbol: symbol.to_string(),
            strike_millis: (contract.strike * 1000.0).round() as i64,
            expiration: contract.expiration,
            option_type: contract.option_type,
        }
    }

    pub fn strike(&self) -> f64 {
        self.strike_millis as f64 / 1000.0
    }
}

/// Identity used to net a trade against an existing holding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKey {
    Stock(String),
    Option(ContractKey),
}

/// Stock holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPosition {
    pub symbol: String,

    /// Share count; either an unsigned magnitude or signed to match `side`
    pub quantity: f64,

    pub side: Side,

    /// Average entry price
    pub entry_price: f64,

    /// Last known price
    pub current_price: f64,
}

/// Option holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionPosition {
    /// Underlying symbol
    pub symbol: String,

    /// Contract count; either an unsigned magnitude or signed to match `side`
    pub quantity: f64,

    pub side: Side,

    /// Average entry premium per share
    pub entry_price: f64,

    /// Last known premium per share
    pub current_price: f64,

    pub contract: OptionContract,

    /// Greeks supplied by the broker or data feed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeks: Option<Greeks>,
}

/// A position in the book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Position {
    Stock(StockPosition),
    Option(OptionPosition),
}

impl Position {
    /// Stock position at a single price (entry == current)
    pub fn stock(symbol: &str, quantity: f64, side: Side, price: f64) -> Self {
        Position::Stock(StockPosition {
            symbol: symbol.to_string(),
            quantity,
            side,
            entry_price: price,
            current_price: price,
        })
    }

    /// Option position without known Greeks
    pub fn option(
        symbol: &str,
        quantity: f64,
        side: Side,
        price: f64,
        contract: OptionContract,
    ) -> Self {
        Position::Option(OptionPosition {
            symbol: symbol.to_string(),
            quantity,
            side,
            entry_price: price,
            current_price: price,
            contract,
            greeks: None,
        })
    }

    /// Attach known Greeks (no-op for stock)
    pub fn with_greeks(mut self, greeks: Greeks) -> Self {
        if let Position::Option(opt) = &mut self {
            opt.greeks = Some(greeks);
        }
        self
    }

    pub fn symbol(&self) -> &str {
        match self {
            Position::Stock(s) => &s.symbol,
            Position::Option(o) => &o.symbol,
        }
    }

    /// Raw quantity as supplied
    pub fn quantity(&self) -> f64 {
        match self {
            Position::Stock(s) => s.quantity,
            Position::Option(o) => o.quantity,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Position::Stock(s) => s.side,
            Position::Option(o) => o.side,
        }
    }

    /// Quantity signed by side: `|quantity| * direction`
    pub fn signed_quantity(&self) -> f64 {
        self.quantity().abs() * self.side().direction()
    }

    pub fn is_open(&self) -> bool {
        self.quantity().abs() >= MIN_OPEN_QUANTITY
    }

    pub fn contract(&self) -> Option<&OptionContract> {
        match self {
            Position::Stock(_) => None,
            Position::Option(o) => Some(&o.contract),
        }
    }

    pub fn greeks(&self) -> Option<&Greeks> {
        match self {
            Position::Stock(_) => None,
            Position::Option(o) => o.greeks.as_ref(),
        }
    }

    pub fn current_price(&self) -> f64 {
        match self {
            Position::Stock(s) => s.current_price,
            Position::Option(o) => o.current_price,
        }
    }

    pub fn instrument_key(&self) -> InstrumentKey {
        match self {
            Position::Stock(s) => InstrumentKey::Stock(s.symbol.clone()),
            Position::Option(o) => InstrumentKey::Option(ContractKey::new(&o.symbol, &o.contract)),
        }
    }

    /// Absolute market value at the last known price
    pub fn market_value(&self) -> f64 {
        match self {
            Position::Stock(s) => (s.quantity * s.current_price).abs(),
            Position::Option(o) => (o.quantity * o.current_price * CONTRACT_MULTIPLIER).abs(),
        }
    }

    /// Check the quantity/side invariant and basic field sanity.
    ///
    /// A negative quantity on a long position is inconsistent. Positive
    /// magnitudes are accepted on either side.
    pub fn validate(&self) -> Result<()> {
        if self.symbol().trim().is_empty() {
            return Err(GatekeeperError::InvalidParameter(
                "Position symbol must not be empty".to_string(),
            ));
        }

        if !self.quantity().is_finite() {
            return Err(GatekeeperError::InvalidParameter(format!(
                "Position {} has non-finite quantity",
                self.symbol()
            )));
        }

        if self.quantity() < 0.0 && self.side() == Side::Long {
            return Err(GatekeeperError::InconsistentPosition {
                symbol: self.symbol().to_string(),
                quantity: self.quantity(),
                side: self.side().to_string(),
            });
        }

        if let Some(contract) = self.contract() {
            if contract.strike <= 0.0 || !contract.strike.is_finite() {
                return Err(GatekeeperError::InvalidParameter(format!(
                    "Option {} has invalid strike {}",
                    self.symbol(),
                    contract.strike
                )));
            }
        }

        Ok(())
    }
}

/// A trade submitted for approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedTrade {
    /// Underlying symbol
    pub symbol: String,

    /// Quantity (shares or contracts); magnitude or signed to match `side`
    pub quantity: f64,

    /// Long opens/adds to a long, short sells
    pub side: Side,

    /// Share price for stock, premium per share for options
    pub price: f64,

    /// Contract descriptor for option trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<OptionContract>,

    /// Known Greeks for the traded contract
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeks: Option<Greeks>,
}

impl ProposedTrade {
    pub fn stock(symbol: &str, quantity: f64, side: Side, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            side,
            price,
            contract: None,
            greeks: None,
        }
    }

    pub fn option(
        symbol: &str,
        quantity: f64,
        side: Side,
        price: f64,
        contract: OptionContract,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity,
            side,
            price,
            contract: Some(contract),
            greeks: None,
        }
    }

    pub fn with_greeks(mut self, greeks: Greeks) -> Self {
        self.greeks = Some(greeks);
        self
    }

    pub fn is_option(&self) -> bool {
        self.contract.is_some()
    }

    /// Buying options: exposed to IV crush
    pub fn is_long_option(&self) -> bool {
        self.is_option() && self.side == Side::Long
    }

    /// Selling options: collecting premium
    pub fn is_short_premium(&self) -> bool {
        self.is_option() && self.side == Side::Short
    }

    pub fn signed_quantity(&self) -> f64 {
        self.quantity.abs() * self.side.direction()
    }

    /// Capital at stake: `|qty| * price`, times the contract multiplier for options
    pub fn notional(&self) -> f64 {
        let multiplier = if self.is_option() { CONTRACT_MULTIPLIER } else { 1.0 };
        self.quantity.abs() * self.price.abs() * multiplier
    }

    pub fn instrument_key(&self) -> InstrumentKey {
        match &self.contract {
            Some(contract) => InstrumentKey::Option(ContractKey::new(&self.symbol, contract)),
            None => InstrumentKey::Stock(self.symbol.clone()),
        }
    }

    /// The trade as a fresh position
    pub fn to_position(&self) -> Position {
        let position = match &self.contract {
            Some(contract) => Position::option(
                &self.symbol,
                self.signed_quantity(),
                self.side,
                self.price,
                contract.clone(),
            ),
            None => Position::stock(&self.symbol, self.signed_quantity(), self.side, self.price),
        };
        match self.greeks {
            Some(greeks) => position.with_greeks(greeks),
            None => position,
        }
    }
}

/// Build the projected book after `trade` fills.
///
/// A trade on an instrument already held nets against that holding; a
/// holding netted to below [`MIN_OPEN_QUANTITY`] is dropped. A trade on a new
/// instrument is appended.
pub fn merge_trade(positions: &[Position], trade: &ProposedTrade) -> Vec<Position> {
    let key = trade.instrument_key();
    let mut projected = Vec::with_capacity(positions.len() + 1);
    let mut netted = false;

    for position in positions {
        if netted || position.instrument_key() != key {
            projected.push(position.clone());
            continue;
        }
        netted = true;

        if let Some(merged) = net_position(position, trade) {
            projected.push(merged);
        }
    }

    if !netted {
        projected.push(trade.to_position());
    }

    projected
}

/// Apply a fill to a single holding; `None` when the holding is closed out.
fn net_position(position: &Position, trade: &ProposedTrade) -> Option<Position> {
    let old_size = position.signed_quantity();
    let fill = trade.signed_quantity();
    let new_size = old_size + fill;

    if new_size.abs() < MIN_OPEN_QUANTITY {
        return None;
    }

    let old_entry = match position {
        Position::Stock(s) => s.entry_price,
        Position::Option(o) => o.entry_price,
    };

    let entry_price = if old_size.abs() < MIN_OPEN_QUANTITY {
        trade.price
    } else if old_size.signum() == new_size.signum() {
        if fill.signum() == old_size.signum() {
            // Adding: size-weighted average entry
            (old_entry * old_size.abs() + trade.price * fill.abs()) / new_size.abs()
        } else {
            // Reducing keeps the original entry
            old_entry
        }
    } else {
        // Reversal opens fresh at the fill price
        trade.price
    };

    let side = Side::from_signed(new_size);
    let merged = match position {
        Position::Stock(s) => Position::Stock(StockPosition {
            symbol: s.symbol.clone(),
            quantity: new_size,
            side,
            entry_price,
            current_price: trade.price,
        }),
        Position::Option(o) => Position::Option(OptionPosition {
            symbol: o.symbol.clone(),
            quantity: new_size,
            side,
            entry_price,
            current_price: trade.price,
            contract: o.contract.clone(),
            greeks: o.greeks.or(trade.greeks),
        }),
    };

    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 11, 20).unwrap()
    }

    fn call(strike: f64) -> OptionContract {
        OptionContract::new(OptionType::Call, strike, expiry())
    }

    #[test]
    fn test_signed_quantity_uses_side() {
        let pos = Position::stock("AAPL", 100.0, Side::Short, 190.0);
        assert_eq!(pos.signed_quantity(), -100.0);

        let pos = Position::stock("AAPL", -100.0, Side::Short, 190.0);
        assert_eq!(pos.signed_quantity(), -100.0);
    }

    #[test]
    fn test_validate_rejects_negative_long() {
        let pos = Position::stock("AAPL", -10.0, Side::Long, 190.0);
        assert!(matches!(
            pos.validate(),
            Err(GatekeeperError::InconsistentPosition { .. })
        ));

        let pos = Position::stock("AAPL", 10.0, Side::Short, 190.0);
        assert!(pos.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_strike() {
        let pos = Position::option("SPY", 1.0, Side::Long, 2.0, call(0.0));
        assert!(pos.validate().is_err());
    }

    #[test]
    fn test_contract_key_distinguishes_strikes() {
        let a = ContractKey::new("SPY", &call(500.0));
        let b = ContractKey::new("SPY", &call(505.0));
        assert_ne!(a, b);
        assert_eq!(a.strike(), 500.0);
    }

    #[test]
    fn test_notional() {
        let trade = ProposedTrade::option("SPY", 2.0, Side::Long, 1.50, call(500.0));
        assert!((trade.notional() - 300.0).abs() < 1e-9);

        let trade = ProposedTrade::stock("SPY", 10.0, Side::Short, 500.0);
        assert!((trade.notional() - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_appends_new_instrument() {
        let positions = vec![Position::stock("AAPL", 100.0, Side::Long, 190.0)];
        let trade = ProposedTrade::stock("MSFT", 50.0, Side::Long, 410.0);

        let projected = merge_trade(&positions, &trade);
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[1].symbol(), "MSFT");
    }

    #[test]
    fn test_merge_nets_same_symbol() {
        let positions = vec![Position::stock("AAPL", 100.0, Side::Long, 190.0)];
        let trade = ProposedTrade::stock("AAPL", 40.0, Side::Short, 195.0);

        let projected = merge_trade(&positions, &trade);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].signed_quantity(), 60.0);
        // Reducing keeps the entry price
        match &projected[0] {
            Position::Stock(s) => assert_eq!(s.entry_price, 190.0),
            _ => panic!("Expected stock"),
        }
    }

    #[test]
    fn test_merge_averages_entry_when_adding() {
        let positions = vec![Position::stock("AAPL", 100.0, Side::Long, 100.0)];
        let trade = ProposedTrade::stock("AAPL", 100.0, Side::Long, 110.0);

        let projected = merge_trade(&positions, &trade);
        match &projected[0] {
            Position::Stock(s) => assert!((s.entry_price - 105.0).abs() < 1e-9),
            _ => panic!("Expected stock"),
        }
    }

    #[test]
    fn test_merge_closes_out() {
        let positions = vec![Position::option("SPY", 3.0, Side::Long, 2.0, call(500.0))];
        let trade = ProposedTrade::option("SPY", 3.0, Side::Short, 2.5, call(500.0));

        let projected = merge_trade(&positions, &trade);
        assert!(projected.is_empty());
    }

    #[test]
    fn test_merge_reversal_flips_side() {
        let positions = vec![Position::stock("AAPL", 50.0, Side::Long, 100.0)];
        let trade = ProposedTrade::stock("AAPL", 80.0, Side::Short, 120.0);

        let projected = merge_trade(&positions, &trade);
        assert_eq!(projected[0].side(), Side::Short);
        assert_eq!(projected[0].signed_quantity(), -30.0);
        match &projected[0] {
            Position::Stock(s) => assert_eq!(s.entry_price, 120.0),
            _ => panic!("Expected stock"),
        }
    }

    #[test]
    fn test_merge_distinguishes_contracts() {
        let positions = vec![Position::option("SPY", 1.0, Side::Long, 2.0, call(500.0))];
        let trade = ProposedTrade::option("SPY", 1.0, Side::Long, 1.0, call(510.0));

        let projected = merge_trade(&positions, &trade);
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn test_option_and_stock_on_same_symbol_do_not_net() {
        let positions = vec![Position::stock("SPY", 100.0, Side::Long, 500.0)];
        let trade = ProposedTrade::option("SPY", 1.0, Side::Short, 3.0, call(510.0));

        let projected = merge_trade(&positions, &trade);
        assert_eq!(projected.len(), 2);
    }

    #[test]
    fn test_position_serde_tagged() {
        let pos = Position::option("SPY", 1.0, Side::Long, 2.0, call(500.0))
            .with_greeks(Greeks::new(0.5, 0.05, -0.1, 0.2));
        let json = serde_json::to_string(&pos).unwrap();
        assert!(json.contains("\"kind\":\"option\""));

        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pos);
    }
}
