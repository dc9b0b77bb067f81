//! Historical backtesting engine.
//!
//! Replays recorded races through the full decision pipeline — risk
//! gate, stake sizing, placement, settlement — against an isolated
//! ledger and risk controller. Every source of nondeterminism is
//! excluded: no wall clock, no generated ids, logical day indices
//! instead of calendar dates. The same input always yields a
//! byte-identical serialized report.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::config::EngineConfig;
use crate::engine::DecisionEngine;
use crate::ledger::Ledger;
use crate::risk::RiskController;
use crate::settlement::settle;
use crate::staking::StakeEngine;
use crate::types::{BetRecord, CandidateOutcome, SettlementResult, WagerType};

// ---------------------------------------------------------------------------
// Historical race data
// ---------------------------------------------------------------------------

/// A finished race with known results, used for backtesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceRecord {
    pub race_id: String,
    /// Logical day index of the race. Day boundaries drive the daily
    /// risk counter resets.
    #[serde(default)]
    pub day: u32,
    /// What the oracle proposed for this race at the time.
    pub candidates: Vec<CandidateOutcome>,
    /// Realized results per wager type. A type with no entry lost.
    #[serde(default)]
    pub results: BTreeMap<WagerType, SettlementResult>,
}

// ---------------------------------------------------------------------------
// Backtest results
// ---------------------------------------------------------------------------

/// One notable wager in the report (best or worst by net profit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotableWager {
    pub wager_id: String,
    pub race_id: String,
    pub wager_type: WagerType,
    pub stake_amount: Decimal,
    pub payout: Decimal,
    pub net: Decimal,
}

/// Complete backtest performance report. Fully serializable; two runs
/// over the same records serialize to identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub initial_bankroll: Decimal,
    pub final_bankroll: Decimal,
    pub roi_percentage: Decimal,
    pub races_processed: u64,
    pub wagers_placed: u64,
    pub wins: u64,
    pub losses: u64,
    pub ken_count: u64,
    pub win_rate: Decimal,
    pub total_wagered: Decimal,
    pub total_returned: Decimal,
    pub max_losing_streak: u32,
    pub peak_bankroll: Decimal,
    pub max_drawdown_pct: Decimal,
    /// Mean realized multiplier over winning wagers.
    pub avg_odds_won: Decimal,
    pub best_wager: Option<NotableWager>,
    pub worst_wager: Option<NotableWager>,
    /// Automatic stops tripped during the run, with their reasons.
    pub stop_events: Vec<String>,
    /// True when the run ended early on the balance floor.
    pub exhausted: bool,
}

// ---------------------------------------------------------------------------
// Backtester
// ---------------------------------------------------------------------------

pub struct Backtester {
    config: EngineConfig,
}

impl Backtester {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Replay races in order against a fresh ledger and risk controller.
    ///
    /// Records must be sorted by `day`. The run ends early only when
    /// the bankroll falls under the minimum balance floor; a daily stop
    /// just skips the remaining races of that logical day.
    pub fn run(&self, records: &[RaceRecord], initial_bankroll: Decimal) -> BacktestReport {
        let engine = DecisionEngine::new(StakeEngine::new(self.config.staking.clone()));
        let mut ledger = Ledger::new(initial_bankroll);
        let mut risk = RiskController::new(&self.config.risk);
        let mut history: Vec<BetRecord> = Vec::new();

        // Fixed epoch keeps the replay independent of the wall clock.
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid epoch");

        let mut peak = initial_bankroll;
        let mut max_drawdown_pct = Decimal::ZERO;
        let mut won_multipliers: Vec<Decimal> = Vec::new();
        let mut best: Option<NotableWager> = None;
        let mut worst: Option<NotableWager> = None;
        let mut stop_events: Vec<String> = Vec::new();
        let mut races_processed = 0u64;
        let mut sequence = 0u64;
        let mut exhausted = false;

        for record in records {
            risk.roll_day(epoch + Duration::days(i64::from(record.day)));
            races_processed += 1;

            let outcome = engine.run_cycle(
                &mut ledger,
                &mut risk,
                &record.race_id,
                &record.candidates,
                sequence,
                &record.race_id,
            );

            for mut wager in outcome.wagers {
                sequence += 1;
                let result = record
                    .results
                    .get(&wager.wager_type)
                    .cloned()
                    .unwrap_or_else(SettlementResult::lost);

                // Placement already succeeded, so the only possible
                // error is a double settlement, which cannot happen for
                // a wager created in this iteration.
                let settled = settle(
                    &mut ledger,
                    &mut risk,
                    &mut wager,
                    &result,
                    &mut history,
                    sequence,
                );
                let settled = match settled {
                    Ok(s) => s,
                    Err(_) => continue,
                };

                if let Some(reason) = settled.stop_triggered {
                    stop_events.push(format!("{}: {}", record.race_id, reason));
                }

                if result.won {
                    won_multipliers.push(result.realized_multiplier);
                }
                let net = settled.payout - wager.stake_amount;
                let notable = NotableWager {
                    wager_id: wager.id.clone(),
                    race_id: record.race_id.clone(),
                    wager_type: wager.wager_type,
                    stake_amount: wager.stake_amount,
                    payout: settled.payout,
                    net,
                };
                if best.as_ref().map_or(true, |b| net > b.net) {
                    best = Some(notable.clone());
                }
                if worst.as_ref().map_or(true, |w| net < w.net) {
                    worst = Some(notable);
                }

                let balance = ledger.current_amount();
                if balance > peak {
                    peak = balance;
                }
                if peak > Decimal::ZERO {
                    let dd = ((peak - balance) / peak * dec!(100)).round_dp(2);
                    if dd > max_drawdown_pct {
                        max_drawdown_pct = dd;
                    }
                }
            }

            if ledger.current_amount() < self.config.risk.minimum_balance_floor {
                info!(
                    race_id = %record.race_id,
                    balance = %ledger.current_amount(),
                    "Bankroll exhausted, ending replay"
                );
                exhausted = true;
                break;
            }
        }

        let stats = ledger.statistics().clone();
        let avg_odds_won = if won_multipliers.is_empty() {
            Decimal::ZERO
        } else {
            let sum: Decimal = won_multipliers.iter().sum();
            (sum / Decimal::from(won_multipliers.len() as u64)).round_dp(2)
        };

        let report = BacktestReport {
            initial_bankroll,
            final_bankroll: ledger.current_amount(),
            roi_percentage: ledger.roi_percentage(),
            races_processed,
            wagers_placed: stats.total_bets,
            wins: stats.wins,
            losses: stats.losses,
            ken_count: stats.ken_count,
            win_rate: stats.win_rate(),
            total_wagered: stats.total_wagered,
            total_returned: stats.total_returned,
            max_losing_streak: stats.max_losing_streak,
            peak_bankroll: peak,
            max_drawdown_pct,
            avg_odds_won,
            best_wager: best,
            worst_wager: worst,
            stop_events,
            exhausted,
        };

        info!(
            races = report.races_processed,
            wagers = report.wagers_placed,
            final_bankroll = %report.final_bankroll,
            roi = %report.roi_percentage,
            "Backtest complete"
        );
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
