//! Running account state
//!
//! Tracks balance, the day-start and peak balances and the current losing
//! streak, and reports breaches of the account-level guards.

use crate::config::AccountLimits;
use serde::{Deserialize, Serialize};

/// Which account guard tripped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountBreachKind {
    DailyLoss,
    Drawdown,
    LossStreak,
}

/// A tripped account guard with a readable reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBreach {
    pub kind: AccountBreachKind,
    pub reason: String,
}

/// Balance and streak tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    balance: f64,
    day_start_balance: f64,
    peak_balance: f64,
    consecutive_losses: u32,
    trades_today: u32,
}

impl AccountState {
    /// Start a fresh account
    ///
    /// # Example
    ///
    /// ```
    /// use ag_gatekeeper::AccountState;
    ///
    /// let mut account = AccountState::new(100_000.0);
    /// account.record_trade_result(-1_500.0);
    /// assert_eq!(account.balance(), 98_500.0);
    /// assert_eq!(account.consecutive_losses(), 1);
    /// ```
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balance: starting_balance,
            day_start_balance: starting_balance,
            peak_balance: starting_balance,
            consecutive_losses: 0,
            trades_today: 0,
        }
    }

    /// Apply a closed trade's realized P&L.
    ///
    /// A loss extends the streak; a win or scratch resets it.
    pub fn record_trade_result(&mut self, pnl: f64) {
        self.trades_today += 1;
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
        self.set_balance(self.balance + pnl);
    }

    /// Overwrite the balance (e.g. from a broker snapshot)
    pub fn update_balance(&mut self, balance: f64) {
        self.set_balance(balance);
    }

    /// Start a new trading day at the current balance
    pub fn reset_daily(&mut self) {
        self.day_start_balance = self.balance;
        self.consecutive_losses = 0;
        self.trades_today = 0;
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn day_start_balance(&self) -> f64 {
        self.day_start_balance
    }

    pub fn peak_balance(&self) -> f64 {
        self.peak_balance
    }

    pub fn consecutive_losses(&self) -> u32 {
        self.consecutive_losses
    }

    pub fn trades_today(&self) -> u32 {
        self.trades_today
    }

    /// Loss since day start as percent of the day-start balance (0 when up)
    pub fn daily_loss_pct(&self) -> f64 {
        if self.day_start_balance <= 0.0 {
            return 0.0;
        }
        ((self.day_start_balance - self.balance) / self.day_start_balance * 100.0).max(0.0)
    }

    /// Decline from peak as percent of the peak
    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_balance <= 0.0 {
            return 0.0;
        }
        ((self.peak_balance - self.balance) / self.peak_balance * 100.0).max(0.0)
    }

    /// Daily-loss or drawdown breach; drawdown is reported first
    pub fn check_loss_limits(&self, limits: &AccountLimits) -> Option<AccountBreach> {
        let drawdown = self.drawdown_pct();
        if drawdown >= limits.max_drawdown_pct {
            return Some(AccountBreach {
                kind: AccountBreachKind::Drawdown,
                reason: format!(
                    "Max drawdown breached: {:.2}% from peak {:.2} (limit {:.2}%)",
                    drawdown, self.peak_balance, limits.max_drawdown_pct
                ),
            });
        }

        let daily = self.daily_loss_pct();
        if daily >= limits.max_daily_loss_pct {
            return Some(AccountBreach {
                kind: AccountBreachKind::DailyLoss,
                reason: format!(
                    "Daily loss limit breached: {:.2}% (limit {:.2}%)",
                    daily, limits.max_daily_loss_pct
                ),
            });
        }

        None
    }

    pub fn check_loss_streak(&self, limits: &AccountLimits) -> Option<AccountBreach> {
        if self.consecutive_losses >= limits.max_consecutive_losses {
            return Some(AccountBreach {
                kind: AccountBreachKind::LossStreak,
                reason: format!(
                    "Consecutive losses: {} (max {})",
                    self.consecutive_losses, limits.max_consecutive_losses
                ),
            });
        }
        None
    }

    fn set_balance(&mut self, balance: f64) {
        self.balance = balance;
        if balance > self.peak_balance {
            self.peak_balance = balance;
        }
    }
}
