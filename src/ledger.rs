//! Ledger — bankroll, cumulative statistics, and invariant-preserving
//! mutators.
//!
//! All mutation of the bankroll goes through `place` and
//! `apply_settlement`. ROI is always recomputed from the current and
//! initial amounts, never stored, so it cannot drift.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::types::{EngineError, SettlementResult, Wager, WagerOutcome};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Cumulative wagering statistics. `roi_percentage` lives on the
/// ledger as a derived method, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    /// Races passed on (KEN decisions).
    pub ken_count: u64,
    pub total_wagered: Decimal,
    pub total_returned: Decimal,
    /// Consecutive losses since the last win. Resets to 0 on any win,
    /// increments by 1 on any loss, never decrements otherwise.
    pub current_losing_streak: u32,
    /// High-water mark of the losing streak.
    pub max_losing_streak: u32,
}

impl Statistics {
    /// Win rate over settled wagers, as a percentage. 0 when nothing
    /// has settled.
    pub fn win_rate(&self) -> Decimal {
        let settled = self.wins + self.losses;
        if settled == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(self.wins) / Decimal::from(settled) * dec!(100)).round_dp(2)
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Durable record of the bankroll. Created once at bootstrap and
/// persisted across runs; backtests run their own isolated instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    current_amount: Decimal,
    initial_amount: Decimal,
    statistics: Statistics,
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "¥{} (initial ¥{}) | bets={} W{}/L{} ken={} | streak={} | ROI {}%",
            self.current_amount,
            self.initial_amount,
            self.statistics.total_bets,
            self.statistics.wins,
            self.statistics.losses,
            self.statistics.ken_count,
            self.statistics.current_losing_streak,
            self.roi_percentage(),
        )
    }
}

impl Ledger {
    /// Create a fresh ledger with the given initial bankroll.
    pub fn new(initial_amount: Decimal) -> Self {
        Self {
            current_amount: initial_amount,
            initial_amount,
            statistics: Statistics::default(),
        }
    }

    /// Rebuild a ledger from persisted parts.
    pub fn restore(current_amount: Decimal, initial_amount: Decimal, statistics: Statistics) -> Self {
        Self {
            current_amount,
            initial_amount,
            statistics,
        }
    }

    pub fn current_amount(&self) -> Decimal {
        self.current_amount
    }

    pub fn initial_amount(&self) -> Decimal {
        self.initial_amount
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// ROI as a percentage: (current − initial) / initial × 100.
    /// Recomputed on every call; never cached.
    pub fn roi_percentage(&self) -> Decimal {
        if self.initial_amount == Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.current_amount - self.initial_amount) / self.initial_amount * dec!(100)).round_dp(2)
    }

    /// Deduct a stake at placement time. The caller must have sized the
    /// stake; this is the last line of defence against overdraw.
    pub fn place(&mut self, stake_amount: Decimal) -> Result<(), EngineError> {
        if stake_amount <= Decimal::ZERO {
            return Err(EngineError::InvalidCandidate(format!(
                "stake must be positive, got {stake_amount}"
            )));
        }
        if stake_amount > self.current_amount {
            return Err(EngineError::InsufficientFunds {
                needed: stake_amount,
                available: self.current_amount,
            });
        }
        self.current_amount -= stake_amount;
        self.statistics.total_wagered += stake_amount;
        debug!(stake = %stake_amount, balance = %self.current_amount, "Stake deducted");
        Ok(())
    }

    /// Settle a wager against its true result. The stake was deducted
    /// at placement, so a loss mutates only the statistics; a win
    /// credits `stake × realized_multiplier`.
    ///
    /// Idempotent per wager: settling twice returns `AlreadySettled`
    /// without touching any state.
    pub fn apply_settlement(
        &mut self,
        wager: &mut Wager,
        result: &SettlementResult,
    ) -> Result<Decimal, EngineError> {
        if wager.is_settled() {
            return Err(EngineError::AlreadySettled(wager.id.clone()));
        }

        self.statistics.total_bets += 1;

        let payout = if result.won {
            let payout = wager.stake_amount * result.realized_multiplier;
            self.current_amount += payout;
            self.statistics.total_returned += payout;
            self.statistics.wins += 1;
            self.statistics.current_losing_streak = 0;
            wager.outcome = WagerOutcome::Won;
            payout
        } else {
            self.statistics.losses += 1;
            self.statistics.current_losing_streak += 1;
            if self.statistics.current_losing_streak > self.statistics.max_losing_streak {
                self.statistics.max_losing_streak = self.statistics.current_losing_streak;
            }
            wager.outcome = WagerOutcome::Lost;
            Decimal::ZERO
        };

        wager.payout = payout;
        debug!(
            wager_id = %wager.id,
            won = result.won,
            payout = %payout,
            balance = %self.current_amount,
            streak = self.statistics.current_losing_streak,
            "Settlement applied"
        );
        Ok(payout)
    }

    /// Record a KEN (pass) decision.
    pub fn record_pass(&mut self) {
        self.statistics.ken_count += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
