//! Decision engine — pipelines the risk gate, stake sizing, and
//! placement for one race.
//!
//! A decision cycle is all-or-nothing per candidate, never per race:
//! one rejected candidate does not abort the cycle, and a closed risk
//! gate short-circuits before any sizing work happens.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::ledger::Ledger;
use crate::risk::RiskController;
use crate::staking::{PassReason, StakeEngine};
use crate::types::{CandidateOutcome, EngineError, Wager, WagerOutcome, WagerType};

// ---------------------------------------------------------------------------
// Candidate source
// ---------------------------------------------------------------------------

/// Where candidate outcomes come from. Live runs wire this to the
/// prediction oracle's output; backtests replay recorded candidates.
#[cfg_attr(test, mockall::automock)]
pub trait CandidateSource {
    fn candidates_for(&mut self, race_id: &str) -> anyhow::Result<Vec<CandidateOutcome>>;
}

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Record of every decision made during a cycle, including candidates
/// that were passed on and why. Kept for transparency and analysis.
#[derive(Debug, Clone)]
pub enum DecisionRecord {
    Placed {
        wager_id: String,
        wager_type: WagerType,
        stake_amount: Decimal,
        expected_value: Decimal,
    },
    Passed {
        wager_type: WagerType,
        reason: String,
    },
}

/// Everything one decision cycle produced.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub race_id: String,
    /// Wagers placed, stakes already deducted from the ledger.
    pub wagers: Vec<Wager>,
    pub decisions: Vec<DecisionRecord>,
    /// Set when the risk gate was closed and the cycle never ran.
    pub gate_closed: Option<String>,
}

impl CycleOutcome {
    pub fn total_staked(&self) -> Decimal {
        self.wagers.iter().map(|w| w.stake_amount).sum()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs decision cycles. Instantiate once; the ledger and risk
/// controller are passed per call so backtests can run isolated copies
/// through the same engine.
pub struct DecisionEngine {
    staking: StakeEngine,
}

impl DecisionEngine {
    pub fn new(staking: StakeEngine) -> Self {
        Self { staking }
    }

    /// Run one decision cycle for a race.
    ///
    /// Steps:
    /// 1. Risk gate. Closed → the cycle ends before any sizing.
    /// 2. Stake sizing over the whole candidate batch.
    /// 3. Sequential placement: each stake is deducted as it is placed,
    ///    so a later failure cannot undo an earlier wager.
    ///
    /// A race where nothing was placed counts as one KEN.
    pub fn run_cycle(
        &self,
        ledger: &mut Ledger,
        risk: &mut RiskController,
        race_id: &str,
        candidates: &[CandidateOutcome],
        placed_at: u64,
        wager_id_prefix: &str,
    ) -> CycleOutcome {
        if let Err(EngineError::RiskGateClosed(reason)) = risk.can_place_wager() {
            info!(race_id, %reason, "Cycle skipped, risk gate closed");
            ledger.record_pass();
            return CycleOutcome {
                race_id: race_id.to_string(),
                wagers: Vec::new(),
                decisions: Vec::new(),
                gate_closed: Some(reason),
            };
        }

        let run = self.staking.propose(ledger.current_amount(), candidates);
        let mut decisions: Vec<DecisionRecord> = Vec::new();
        for (candidate, reason) in &run.passed {
            decisions.push(DecisionRecord::Passed {
                wager_type: candidate.wager_type,
                reason: reason.to_string(),
            });
        }

        let mut wagers: Vec<Wager> = Vec::new();
        for (seq, proposal) in run.proposed.iter().enumerate() {
            // The sizing pass caps the cycle total at the bankroll, so
            // sequential deduction cannot overdraw; a failure here is
            // still isolated to its candidate.
            match ledger.place(proposal.stake_amount) {
                Ok(()) => {
                    let wager = Wager {
                        id: format!("{wager_id_prefix}-{seq}"),
                        race_id: race_id.to_string(),
                        wager_type: proposal.candidate.wager_type,
                        stake_amount: proposal.stake_amount,
                        odds: proposal.candidate.odds,
                        confidence: proposal.candidate.confidence,
                        placed_at,
                        outcome: WagerOutcome::Pending,
                        payout: Decimal::ZERO,
                    };
                    info!(
                        race_id,
                        wager_id = %wager.id,
                        wager_type = %wager.wager_type,
                        stake = %wager.stake_amount,
                        odds = %wager.odds,
                        ev = %proposal.expected_value,
                        "Wager placed"
                    );
                    decisions.push(DecisionRecord::Placed {
                        wager_id: wager.id.clone(),
                        wager_type: wager.wager_type,
                        stake_amount: wager.stake_amount,
                        expected_value: proposal.expected_value,
                    });
                    wagers.push(wager);
                }
                Err(err) => {
                    debug!(race_id, %err, "Placement rejected");
                    decisions.push(DecisionRecord::Passed {
                        wager_type: proposal.candidate.wager_type,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if wagers.is_empty() {
            ledger.record_pass();
            info!(race_id, candidates = candidates.len(), "KEN, no wagers placed");
        }

        CycleOutcome {
            race_id: race_id.to_string(),
            wagers,
            decisions,
            gate_closed: None,
        }
    }

    /// Pull candidates from a source and run the cycle with them.
    pub fn run_cycle_from_source(
        &self,
        source: &mut dyn CandidateSource,
        ledger: &mut Ledger,
        risk: &mut RiskController,
        race_id: &str,
        placed_at: u64,
        wager_id_prefix: &str,
    ) -> anyhow::Result<CycleOutcome> {
        let candidates = source.candidates_for(race_id)?;
        Ok(self.run_cycle(ledger, risk, race_id, &candidates, placed_at, wager_id_prefix))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
