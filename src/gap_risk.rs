//! Event-driven gap risk
//!
//! Tracks earnings and macro calendars and turns them into a per-symbol risk
//! tier, a position-size multiplier and block/force-exit flags.
//!
//! Earnings tiers (`days_away = earnings_date - today`):
//!
//! | days | level    | size | block | force exit |
//! |------|----------|------|-------|------------|
//! | 0    | Critical | 0.0  | yes   | yes        |
//! | 1    | High     | 0.0  | yes   | no         |
//! | 2-3  | Medium   | 0.5  | no    | no         |
//! | 4-7  | Low      | 0.8  | no    | no         |
//!
//! Earnings risk is terminal: a symbol with earnings risk is not also
//! evaluated for macro risk. Macro events block new trades only on the event
//! day inside the release window (NFP/CPI 08:00-10:30, FOMC 13:30-15:30,
//! market-local time).

use crate::clock::market_now;
use crate::error::{GatekeeperError, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Gap risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::None => "NONE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        write!(f, "{}", s)
    }
}

/// Scheduled macro release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacroEventKind {
    Fomc,
    Cpi,
    Nfp,
    FedSpeaker,
    Ecb,
    Boj,
}

impl MacroEventKind {
    /// FOMC, CPI and NFP move the whole market
    pub fn is_high_impact(self) -> bool {
        matches!(self, MacroEventKind::Fomc | MacroEventKind::Cpi | MacroEventKind::Nfp)
    }

    /// Same-day window (inclusive, market-local) in which new trades are blocked
    pub fn blocking_window(self) -> Option<(NaiveTime, NaiveTime)> {
        match self {
            MacroEventKind::Nfp | MacroEventKind::Cpi => Some((hm(8, 0), hm(10, 30))),
            MacroEventKind::Fomc => Some((hm(13, 30), hm(15, 30))),
            _ => None,
        }
    }
}

impl fmt::Display for MacroEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MacroEventKind::Fomc => "FOMC",
            MacroEventKind::Cpi => "CPI",
            MacroEventKind::Nfp => "NFP",
            MacroEventKind::FedSpeaker => "FED_SPEAKER",
            MacroEventKind::Ecb => "ECB",
            MacroEventKind::Boj => "BOJ",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MacroEventKind {
    type Err = GatekeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FOMC" => Ok(MacroEventKind::Fomc),
            "CPI" => Ok(MacroEventKind::Cpi),
            "NFP" => Ok(MacroEventKind::Nfp),
            "FED_SPEAKER" => Ok(MacroEventKind::FedSpeaker),
            "ECB" => Ok(MacroEventKind::Ecb),
            "BOJ" => Ok(MacroEventKind::Boj),
            other => Err(GatekeeperError::InvalidCalendarEntry(format!(
                "Unknown macro event type: {:?}",
                other
            ))),
        }
    }
}

/// A calendar entry for a macro release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroEvent {
    pub date: NaiveDate,
    pub kind: MacroEventKind,
    pub description: String,
}

/// What drove a gap risk assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapRiskSource {
    None,
    Earnings,
    Macro,
}

/// Gap risk for one symbol at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapRisk {
    pub level: RiskLevel,
    pub reason: String,

    /// Days until the driving event, if any
    pub days_away: Option<i64>,

    /// Multiplier applied to new position size
    pub size_multiplier: f64,

    pub block_new_trades: bool,
    pub force_exit: bool,
    pub source: GapRiskSource,
}

impl GapRisk {
    fn none() -> Self {
        Self {
            level: RiskLevel::None,
            reason: "No scheduled event risk".to_string(),
            days_away: None,
            size_multiplier: 1.0,
            block_new_trades: false,
            force_exit: false,
            source: GapRiskSource::None,
        }
    }
}

/// Gap risk configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapRiskConfig {
    /// Macro events up to this many days ahead raise risk
    pub macro_warning_days: i64,
}

impl Default for GapRiskConfig {
    fn default() -> Self {
        Self { macro_warning_days: 1 }
    }
}

impl GapRiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.macro_warning_days < 0 {
            return Err(GatekeeperError::InvalidConfig(format!(
                "macro_warning_days must be non-negative, got {}",
                self.macro_warning_days
            )));
        }
        Ok(())
    }
}

/// Earnings and macro calendar monitor
#[derive(Debug, Clone, Default)]
pub struct EventRiskMonitor {
    config: GapRiskConfig,
    earnings: HashMap<String, BTreeSet<NaiveDate>>,
    macro_events: BTreeMap<(NaiveDate, MacroEventKind), MacroEvent>,
}

impl EventRiskMonitor {
    pub fn new(config: GapRiskConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            earnings: HashMap::new(),
            macro_events: BTreeMap::new(),
        })
    }

    /// Register an earnings date; duplicates are ignored
    pub fn add_earnings_date(&mut self, symbol: &str, date: NaiveDate) -> Result<()> {
        let symbol = normalize_symbol(symbol)?;
        debug!(symbol = %symbol, %date, "Added earnings date");
        self.earnings.entry(symbol).or_default().insert(date);
        Ok(())
    }

    /// Register a macro release; a second entry for the same day and kind is ignored
    pub fn add_macro_event(&mut self, date: NaiveDate, kind: MacroEventKind, description: &str) {
        self.macro_events
            .entry((date, kind))
            .or_insert_with(|| MacroEvent {
                date,
                kind,
                description: description.to_string(),
            });
        debug!(%date, %kind, "Added macro event");
    }

    /// Upcoming earnings dates for a symbol, ascending
    pub fn upcoming_earnings(&self, symbol: &str) -> Vec<NaiveDate> {
        self.earnings
            .get(&symbol.trim().to_ascii_uppercase())
            .map(|dates| dates.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All macro events, sorted by date
    pub fn macro_events(&self) -> impl Iterator<Item = &MacroEvent> {
        self.macro_events.values()
    }

    /// Drop every calendar entry dated before `date`
    pub fn prune_before(&mut self, date: NaiveDate) {
        for dates in self.earnings.values_mut() {
            dates.retain(|d| *d >= date);
        }
        self.earnings.retain(|_, dates| !dates.is_empty());
        self.macro_events.retain(|(d, _), _| *d >= date);
    }

    pub fn clear(&mut self) {
        self.earnings.clear();
        self.macro_events.clear();
    }

    /// Gap risk for `symbol` at `at` (market-local); `None` means now
    pub fn get_gap_risk(&self, symbol: &str, at: Option<NaiveDateTime>) -> GapRisk {
        let at = at.unwrap_or_else(market_now);
        let symbol = symbol.trim().to_ascii_uppercase();

        if let Some(risk) = self.earnings_risk(&symbol, at.date()) {
            return risk;
        }

        self.macro_risk(at).unwrap_or_else(GapRisk::none)
    }

    pub fn can_trade(&self, symbol: &str, at: Option<NaiveDateTime>) -> bool {
        !self.get_gap_risk(symbol, at).block_new_trades
    }

    pub fn should_force_exit(&self, symbol: &str, at: Option<NaiveDateTime>) -> bool {
        self.get_gap_risk(symbol, at).force_exit
    }

    pub fn get_size_multiplier(&self, symbol: &str, at: Option<NaiveDateTime>) -> f64 {
        self.get_gap_risk(symbol, at).size_multiplier
    }

    fn earnings_risk(&self, symbol: &str, today: NaiveDate) -> Option<GapRisk> {
        let next = self.earnings.get(symbol)?.range(today..).next()?;
        let days_away = (*next - today).num_days();

        let (level, size_multiplier, block_new_trades, force_exit) = match days_away {
            0 => (RiskLevel::Critical, 0.0, true, true),
            1 => (RiskLevel::High, 0.0, true, false),
            2..=3 => (RiskLevel::Medium, 0.5, false, false),
            4..=7 => (RiskLevel::Low, 0.8, false, false),
            _ => return None,
        };

        let reason = match days_away {
            0 => format!("{} reports earnings today", symbol),
            1 => format!("{} reports earnings tomorrow", symbol),
            d => format!("{} reports earnings in {} days", symbol, d),
        };

        if block_new_trades {
            info!(symbol, days_away, level = %level, "Earnings gap risk blocks new trades");
        }

        Some(GapRisk {
            level,
            reason,
            days_away: Some(days_away),
            size_multiplier,
            block_new_trades,
            force_exit,
            source: GapRiskSource::Earnings,
        })
    }

    fn macro_risk(&self, at: NaiveDateTime) -> Option<GapRisk> {
        let today = at.date();
        let horizon = today + chrono::Duration::days(self.config.macro_warning_days);

        let upcoming: Vec<&MacroEvent> = self
            .macro_events
            .values()
            .filter(|e| e.date >= today && e.date <= horizon)
            .collect();

        if upcoming.is_empty() {
            return None;
        }

        let high_impact = upcoming.iter().any(|e| e.kind.is_high_impact());
        let (level, size_multiplier) = if high_impact {
            (RiskLevel::High, 0.5)
        } else {
            (RiskLevel::Medium, 0.8)
        };

        let days_away = upcoming
            .iter()
            .map(|e| (e.date - today).num_days())
            .min();

        let now = at.time();
        let blocking: Vec<&MacroEvent> = upcoming
            .iter()
            .copied()
            .filter(|e| e.date == today)
            .filter(|e| {
                e.kind
                    .blocking_window()
                    .is_some_and(|(start, end)| now >= start && now <= end)
            })
            .collect();

        let kinds: Vec<String> = upcoming
            .iter()
            .map(|e| format!("{} ({})", e.kind, e.date))
            .collect();

        let reason = if blocking.is_empty() {
            format!("Macro event risk: {}", kinds.join(", "))
        } else {
            let names: Vec<String> = blocking.iter().map(|e| e.kind.to_string()).collect();
            format!("{} release window in progress", names.join(", "))
        };

        Some(GapRisk {
            level,
            reason,
            days_away,
            size_multiplier,
            block_new_trades: !blocking.is_empty(),
            force_exit: false,
            source: GapRiskSource::Macro,
        })
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Err(GatekeeperError::InvalidCalendarEntry(
            "Earnings entry has an empty symbol".to_string(),
        ));
    }
    Ok(symbol.to_ascii_uppercase())
}
