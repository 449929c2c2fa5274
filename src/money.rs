//! Money management — stake sizing, streak tracking, stop conditions.
//!
//! The stake schedule is a plain martingale: reset to the base stake after a
//! win, multiply after a loss. Affordability is checked at submission time:
//! an unaffordable progression resets to the base stake once, and if even
//! the base stake cannot be covered the manager flags a fatal stop.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::storage::StrategyProfile;
use crate::types::HideoutError;

// ---------------------------------------------------------------------------
// Stop reasons
// ---------------------------------------------------------------------------

/// Why the agent stopped placing stakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Balance reached the configured profit target.
    ProfitTarget,
    /// Balance fell to the configured loss floor.
    LossFloor,
    /// Even the base stake is unaffordable.
    InsufficientFunds,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::ProfitTarget => write!(f, "profit target reached"),
            StopReason::LossFloor => write!(f, "loss floor reached"),
            StopReason::InsufficientFunds => write!(f, "insufficient funds"),
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Stake schedule and session accounting.
#[derive(Debug, Clone)]
pub struct MoneyManager {
    base_stake: f64,
    multiplier: f64,
    current_stake: f64,

    pub win_streak: u32,
    pub lose_streak: u32,
    pub max_win_streak: u32,
    pub max_lose_streak: u32,

    starting_balance: Option<f64>,
    cumulative_profit: f64,

    profit_target: Option<f64>,
    stop_on_profit: bool,
    loss_floor: Option<f64>,
    stop_on_loss: bool,

    stopped: Option<StopReason>,
}

impl MoneyManager {
    pub fn new(base_stake: f64, multiplier: f64) -> Self {
        Self {
            base_stake,
            multiplier,
            current_stake: base_stake,
            win_streak: 0,
            lose_streak: 0,
            max_win_streak: 0,
            max_lose_streak: 0,
            starting_balance: None,
            cumulative_profit: 0.0,
            profit_target: None,
            stop_on_profit: false,
            loss_floor: None,
            stop_on_loss: false,
            stopped: None,
        }
    }

    /// Build a manager from the persisted strategy profile.
    pub fn from_profile(profile: &StrategyProfile) -> Self {
        let mut mgr = Self::new(profile.base_stake, profile.multiplier);
        mgr.profit_target = profile.profit_target;
        mgr.stop_on_profit = profile.stop_on_profit;
        mgr.loss_floor = profile.loss_floor;
        mgr.stop_on_loss = profile.stop_on_loss;
        mgr
    }

    // -- Outcome application ----------------------------------------------

    /// Apply a winning settlement: stake resets, streaks flip.
    pub fn record_win(&mut self) {
        self.current_stake = self.base_stake;
        self.win_streak += 1;
        self.lose_streak = 0;
        if self.win_streak > self.max_win_streak {
            self.max_win_streak = self.win_streak;
        }
    }

    /// Apply a losing settlement: stake multiplies, streaks flip.
    pub fn record_loss(&mut self) {
        self.current_stake *= self.multiplier;
        self.lose_streak += 1;
        self.win_streak = 0;
        if self.lose_streak > self.max_lose_streak {
            self.max_lose_streak = self.lose_streak;
        }
    }

    // -- Stake sizing ------------------------------------------------------

    /// The stake the schedule calls for next, before affordability checks.
    pub fn current_stake(&self) -> f64 {
        self.current_stake
    }

    /// Size the stake for this round against the available balance.
    ///
    /// If the martingale progression outgrew the balance, fall back to the
    /// base stake; if even that is unaffordable, flag a fatal stop and
    /// refuse. The returned amount is always > 0.
    pub fn plan_stake(&mut self, available: f64) -> Result<f64, HideoutError> {
        let mut amount = self.current_stake;
        if amount <= 0.0 {
            amount = self.base_stake;
            self.current_stake = amount;
        }

        if amount > available {
            warn!(
                needed = format!("{amount:.2}"),
                available = format!("{available:.2}"),
                "Progression unaffordable, resetting to base stake"
            );
            self.current_stake = self.base_stake;
            amount = self.base_stake;
            if amount > available {
                self.stopped = Some(StopReason::InsufficientFunds);
                return Err(HideoutError::InsufficientFunds {
                    needed: amount,
                    available,
                });
            }
        }

        Ok(amount)
    }

    // -- Balance accounting ------------------------------------------------

    /// Record a balance observation. The first one becomes the session's
    /// starting balance; cumulative profit is tracked against it.
    pub fn observe_balance(&mut self, balance: f64) {
        if self.starting_balance.is_none() {
            self.starting_balance = Some(balance);
            info!(balance = format!("{balance:.2}"), "Starting balance established");
        }
        if let Some(start) = self.starting_balance {
            self.cumulative_profit = balance - start;
        }
    }

    pub fn starting_balance(&self) -> Option<f64> {
        self.starting_balance
    }

    pub fn cumulative_profit(&self) -> f64 {
        self.cumulative_profit
    }

    // -- Stop conditions ---------------------------------------------------

    /// Evaluate the configured stop conditions against the current balance.
    /// Called after every settlement. Returns the tripped reason, if any.
    pub fn evaluate_stops(&mut self, balance: f64) -> Option<StopReason> {
        if self.stopped.is_some() {
            return self.stopped;
        }
        if self.stop_on_profit {
            if let Some(target) = self.profit_target {
                if balance >= target {
                    self.stopped = Some(StopReason::ProfitTarget);
                    return self.stopped;
                }
            }
        }
        if self.stop_on_loss {
            if let Some(floor) = self.loss_floor {
                if balance <= floor {
                    self.stopped = Some(StopReason::LossFloor);
                    return self.stopped;
                }
            }
        }
        None
    }

    pub fn stopped(&self) -> Option<StopReason> {
        self.stopped
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
