//! Risk controller — the ACTIVE/STOPPED state machine that gates all
//! wagering.
//!
//! Three thresholds trip the automatic stop after a settlement: the
//! losing-streak limit, the daily loss limit, and the minimum balance
//! floor. A manual stop or resume always wins over the thresholds.
//! Day rollover clears the daily stop and the daily loss accumulator
//! but never the running losing streak.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RiskConfig;
use crate::ledger::Ledger;
use crate::types::EngineError;

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Gate state for the current day. Serialized wholesale into the
/// persisted snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskController {
    max_losing_streak_limit: u32,
    daily_loss_limit: Decimal,
    minimum_balance_floor: Decimal,
    is_stopped_today: bool,
    stop_reason: Option<String>,
    /// Stakes lost since the last day rollover. Wins do not subtract.
    daily_loss: Decimal,
    last_reset_date: Option<NaiveDate>,
}

impl RiskController {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            max_losing_streak_limit: config.max_losing_streak_limit,
            daily_loss_limit: config.daily_loss_limit,
            minimum_balance_floor: config.minimum_balance_floor,
            is_stopped_today: false,
            stop_reason: None,
            daily_loss: Decimal::ZERO,
            last_reset_date: None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped_today
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn daily_loss(&self) -> Decimal {
        self.daily_loss
    }

    /// Gate check, consulted before every stake-sizing pass. Returns
    /// the closure reason so the run can report "no wagers placed"
    /// instead of silently doing nothing.
    ///
    /// Only the stop flag is consulted here: thresholds transition the
    /// machine at settlement time, so a manual resume or a day rollover
    /// reopens the gate even while a threshold is still breached. The
    /// next settlement re-evaluates and stops again if warranted.
    pub fn can_place_wager(&self) -> Result<(), EngineError> {
        if self.is_stopped_today {
            let reason = self
                .stop_reason
                .clone()
                .unwrap_or_else(|| "stopped for today".to_string());
            return Err(EngineError::RiskGateClosed(reason));
        }
        Ok(())
    }

    /// Accumulate a lost stake into the daily loss counter.
    pub fn record_loss(&mut self, stake_amount: Decimal) {
        self.daily_loss += stake_amount;
    }

    /// Re-evaluate the stop thresholds after a settlement. Transitions
    /// to STOPPED exactly when one of the three conditions first holds.
    /// Returns the stop reason when a transition occurred.
    pub fn evaluate_after_settlement(&mut self, ledger: &Ledger) -> Option<String> {
        if self.is_stopped_today {
            return None;
        }

        let streak = ledger.statistics().current_losing_streak;
        let reason = if streak >= self.max_losing_streak_limit {
            Some(format!("losing streak reached {streak}"))
        } else if self.daily_loss >= self.daily_loss_limit {
            Some(format!("daily loss reached ¥{}", self.daily_loss))
        } else if ledger.current_amount() < self.minimum_balance_floor {
            Some(format!(
                "bankroll ¥{} below floor ¥{}",
                ledger.current_amount(),
                self.minimum_balance_floor
            ))
        } else {
            None
        };

        if let Some(reason) = &reason {
            self.stop(reason);
        }
        reason
    }

    /// Operator override: stop all wagering for the rest of the day.
    pub fn stop_today(&mut self) {
        self.stop("manual stop");
    }

    /// Operator override: reopen the gate regardless of thresholds.
    /// The next settlement re-evaluates them.
    pub fn resume(&mut self) {
        info!("Risk gate manually resumed");
        self.is_stopped_today = false;
        self.stop_reason = None;
    }

    /// Calendar-day rollover. Clears the daily stop and the daily loss
    /// accumulator; the losing streak is a running statistic and is
    /// untouched. A repeated call with the same date is a no-op.
    pub fn roll_day(&mut self, today: NaiveDate) {
        if self.last_reset_date == Some(today) {
            return;
        }
        self.last_reset_date = Some(today);
        self.daily_loss = Decimal::ZERO;
        self.is_stopped_today = false;
        self.stop_reason = None;
        info!(%today, "Daily risk counters reset");
    }

    fn stop(&mut self, reason: &str) {
        self.is_stopped_today = true;
        self.stop_reason = Some(reason.to_string());
        warn!(reason, "Wagering stopped");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
