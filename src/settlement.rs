//! Bet settlement — reconciles placed wagers against true results.
//!
//! Settlement is the only place the risk controller learns about
//! losses, and the only place bet history records are appended. The
//! order is fixed: ledger first, then risk accounting, then the stop
//! re-evaluation, then the audit record.

use rust_decimal::Decimal;
use tracing::info;

use crate::ledger::Ledger;
use crate::risk::RiskController;
use crate::types::{BetRecord, EngineError, SettlementResult, Wager};

/// What one settlement did to the books.
#[derive(Debug, Clone)]
pub struct SettlementOutcome {
    pub wager_id: String,
    pub won: bool,
    /// Amount credited back to the bankroll (zero on a loss).
    pub payout: Decimal,
    /// Set when this settlement tripped an automatic stop.
    pub stop_triggered: Option<String>,
}

/// Settle one wager. Idempotent: a second call for the same wager
/// returns `AlreadySettled` and mutates nothing.
pub fn settle(
    ledger: &mut Ledger,
    risk: &mut RiskController,
    wager: &mut Wager,
    result: &SettlementResult,
    history: &mut Vec<BetRecord>,
    settled_at: u64,
) -> Result<SettlementOutcome, EngineError> {
    // The idempotency guard lives in the ledger; a rejected settlement
    // must not touch the risk counters or the history either.
    let payout = ledger.apply_settlement(wager, result)?;

    if !result.won {
        risk.record_loss(wager.stake_amount);
    }
    let stop_triggered = risk.evaluate_after_settlement(ledger);

    history.push(BetRecord {
        wager_id: wager.id.clone(),
        race_id: wager.race_id.clone(),
        wager_type: wager.wager_type,
        stake_amount: wager.stake_amount,
        odds: wager.odds,
        confidence: wager.confidence,
        won: result.won,
        payout,
        settled_at,
    });

    info!(
        wager_id = %wager.id,
        race_id = %wager.race_id,
        won = result.won,
        payout = %payout,
        balance = %ledger.current_amount(),
        "Wager settled"
    );

    Ok(SettlementOutcome {
        wager_id: wager.id.clone(),
        won: result.won,
        payout,
        stop_triggered,
    })
}
