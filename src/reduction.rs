//! Forced position reduction
//!
//! Greedy planner: rank open positions by estimated absolute delta
//! contribution and propose closing the largest one at a time until the
//! caller's stop condition holds on what remains. Not globally optimal.

use crate::position::{Greeks, InstrumentKey, Position, Side, CONTRACT_MULTIPLIER};
use serde::{Deserialize, Serialize};

/// Delta assumed for an option whose Greeks cannot be resolved
pub const FALLBACK_OPTION_DELTA: f64 = 0.5;

/// One position the caller should close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionAction {
    pub symbol: String,
    pub instrument: InstrumentKey,

    /// Quantity to trade, always positive
    pub quantity: f64,

    /// Side of the closing order (opposite of the held side)
    pub side: Side,

    /// Estimated |delta| removed by the close
    pub contribution: f64,

    pub reason: String,
}

/// Estimated absolute delta of a position.
///
/// Options use `|delta * qty * 100|` with the resolved delta, or
/// [`FALLBACK_OPTION_DELTA`] when none is known. Stock is `|qty|`.
pub fn delta_contribution(position: &Position, resolved: Option<&Greeks>) -> f64 {
    match position {
        Position::Stock(stock) => stock.quantity.abs(),
        Position::Option(opt) => {
            let delta = resolved
                .or(opt.greeks.as_ref())
                .map(|g| g.delta)
                .unwrap_or(FALLBACK_OPTION_DELTA);
            (delta * opt.quantity * CONTRACT_MULTIPLIER).abs()
        }
    }
}

/// Plan closes from the largest contribution down.
///
/// `contributions[i]` belongs to `positions[i]`. `done` sees the book that
/// would remain and returns true once no further closing is needed; it is
/// checked before each close, so an already-healthy book yields no actions.
pub fn plan_reduction<F>(
    positions: &[Position],
    contributions: &[f64],
    reason: &str,
    mut done: F,
) -> Vec<ReductionAction>
where
    F: FnMut(&[Position]) -> bool,
{
    let mut ranked: Vec<(usize, f64)> = positions
        .iter()
        .zip(contributions.iter().copied())
        .enumerate()
        .filter(|(_, (p, _))| p.is_open())
        .map(|(i, (_, c))| (i, c))
        .collect();
    // Stable sort keeps input order among equal contributions
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut closed = vec![false; positions.len()];
    let mut actions = Vec::new();

    for (index, contribution) in ranked {
        let remaining: Vec<Position> = positions
            .iter()
            .zip(closed.iter())
            .filter(|(_, c)| !**c)
            .map(|(p, _)| p.clone())
            .collect();
        if done(&remaining) {
            break;
        }

        let position = &positions[index];
        closed[index] = true;
        actions.push(ReductionAction {
            symbol: position.symbol().to_string(),
            instrument: position.instrument_key(),
            quantity: position.quantity().abs(),
            side: match position.side() {
                Side::Long => Side::Short,
                Side::Short => Side::Long,
            },
            contribution,
            reason: reason.to_string(),
        });
    }

    actions
}
