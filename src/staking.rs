//! Stake sizing engine.
//!
//! Turns the oracle's candidate outcomes into concrete stake amounts:
//! expected-value gate, risk-probability gate (KEN), a flat
//! Kelly-like fraction (confidence × multiplier), fixed cross-type
//! allocation, and a proportional scale-down so that one decision
//! cycle can never commit more than the whole bankroll.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::StakingConfig;
use crate::types::{CandidateOutcome, WagerType};

// ---------------------------------------------------------------------------
// Proposals
// ---------------------------------------------------------------------------

/// A candidate that survived every gate, with its computed stake.
#[derive(Debug, Clone)]
pub struct ProposedStake {
    pub candidate: CandidateOutcome,
    pub expected_value: Decimal,
    pub risk_probability: Decimal,
    pub stake_amount: Decimal,
}

/// Why a candidate was passed on instead of staked.
#[derive(Debug, Clone, PartialEq)]
pub enum PassReason {
    /// odds × confidence gave no positive edge.
    NoEdge { expected_value: Decimal },
    /// Risk probability at or above the hard 10% rule (KEN).
    TooRisky { risk_probability: Decimal },
    /// Sized stake fell below the minimum viable unit, or the bankroll
    /// cannot cover it.
    InsufficientFunds { stake_amount: Decimal },
    /// Malformed odds/confidence, dropped from the cycle.
    Invalid { detail: String },
}

impl std::fmt::Display for PassReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassReason::NoEdge { expected_value } => {
                write!(f, "no edge (ev={expected_value})")
            }
            PassReason::TooRisky { risk_probability } => {
                write!(f, "KEN (risk probability {risk_probability})")
            }
            PassReason::InsufficientFunds { stake_amount } => {
                write!(f, "stake ¥{stake_amount} below minimum viable unit")
            }
            PassReason::Invalid { detail } => write!(f, "invalid candidate: {detail}"),
        }
    }
}

/// Outcome of one sizing pass: proposals in input order plus every
/// pass decision with its reason.
#[derive(Debug, Clone, Default)]
pub struct StakingRun {
    pub proposed: Vec<ProposedStake>,
    pub passed: Vec<(CandidateOutcome, PassReason)>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct StakeEngine {
    config: StakingConfig,
}

impl StakeEngine {
    pub fn new(config: StakingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    /// Size stakes for one decision cycle.
    ///
    /// Steps, in order:
    /// 1. Drop malformed candidates (odds/confidence outside domain).
    /// 2. Gate on expected value: odds × confidence must exceed 1.0.
    /// 3. Gate on risk probability: ≥ 10% is an automatic KEN.
    /// 4. `raw_stake = bankroll × confidence × multiplier`.
    /// 5. When multiple wager types survive in the same cycle, weight
    ///    each raw stake by its type's fixed allocation share; a lone
    ///    type keeps its full raw stake.
    /// 6. Clamp to [0, bankroll]; scale all proportionally when the
    ///    cycle total exceeds the bankroll.
    /// 7. Drop stakes below the minimum viable unit.
    pub fn propose(&self, bankroll: Decimal, candidates: &[CandidateOutcome]) -> StakingRun {
        let mut run = StakingRun::default();
        if bankroll <= Decimal::ZERO {
            for c in candidates {
                run.passed.push((
                    c.clone(),
                    PassReason::InsufficientFunds {
                        stake_amount: Decimal::ZERO,
                    },
                ));
            }
            return run;
        }

        // Gates 1-3: collect survivors before any allocation, because
        // the cross-type weighting depends on how many distinct types
        // survive together.
        let mut survivors: Vec<&CandidateOutcome> = Vec::new();
        for candidate in candidates {
            if let Err(err) = candidate.validate() {
                debug!(candidate = %candidate, %err, "Candidate dropped");
                run.passed.push((
                    candidate.clone(),
                    PassReason::Invalid {
                        detail: err.to_string(),
                    },
                ));
                continue;
            }

            let ev = candidate.expected_value();
            if ev <= self.config.expected_value_cutoff {
                debug!(candidate = %candidate, ev = %ev, "No positive edge");
                run.passed
                    .push((candidate.clone(), PassReason::NoEdge { expected_value: ev }));
                continue;
            }

            let rp = candidate.effective_risk_probability();
            if rp >= self.config.risk_probability_cutoff {
                debug!(candidate = %candidate, rp = %rp, "KEN");
                run.passed.push((
                    candidate.clone(),
                    PassReason::TooRisky {
                        risk_probability: rp,
                    },
                ));
                continue;
            }

            survivors.push(candidate);
        }

        if survivors.is_empty() {
            return run;
        }

        // Steps 4-5: raw stake and cross-type allocation.
        let distinct_types: BTreeSet<WagerType> =
            survivors.iter().map(|c| c.wager_type).collect();
        let multi_type = distinct_types.len() > 1;

        let mut sized: Vec<(&CandidateOutcome, Decimal)> = survivors
            .iter()
            .map(|c| {
                let raw = bankroll * c.confidence * self.config.stake_fraction_multiplier;
                let allocated = if multi_type {
                    raw * self.config.allocation.weight_for(c.wager_type)
                } else {
                    raw
                };
                // Step 6a: clamp to [0, bankroll]
                let clamped = allocated.max(Decimal::ZERO).min(bankroll);
                (*c, clamped)
            })
            .collect();

        // Step 6b: never commit more than 100% of the bankroll in one
        // cycle. Each rescaled stake is floored to whole yen: the exact
        // rescaled sum equals the bankroll, so flooring every term
        // keeps the total at or under it regardless of division
        // rounding.
        let total: Decimal = sized.iter().map(|(_, s)| *s).sum();
        if total > bankroll {
            for (_, stake) in sized.iter_mut() {
                *stake = (*stake * bankroll / total)
                    .round_dp_with_strategy(0, RoundingStrategy::ToZero);
            }
            debug!(%total, %bankroll, "Cycle total scaled down to bankroll");
        }

        // Step 7: minimum viable unit.
        for (candidate, stake) in sized {
            if stake < self.config.min_stake {
                debug!(candidate = %candidate, %stake, "Stake below minimum viable unit");
                run.passed.push((
                    candidate.clone(),
                    PassReason::InsufficientFunds {
                        stake_amount: stake,
                    },
                ));
                continue;
            }
            run.proposed.push(ProposedStake {
                candidate: candidate.clone(),
                expected_value: candidate.expected_value(),
                risk_probability: candidate.effective_risk_probability(),
                stake_amount: stake,
            });
        }

        run
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
