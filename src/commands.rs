//! Operator command surface.
//!
//! Four commands cover the manual controls: stop wagering for the day,
//! resume it, run a backtest over recorded races, and report the
//! current books. Commands mutate live state in memory; the caller
//! owns persistence.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::backtest::{BacktestReport, Backtester, RaceRecord};
use crate::config::EngineConfig;
use crate::ledger::{Ledger, Statistics};
use crate::risk::RiskController;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Command {
    /// Manual override: close the risk gate for the rest of the day.
    StopToday,
    /// Manual override: reopen the risk gate.
    Resume,
    /// Replay recorded races through an isolated pipeline. `race_count`
    /// truncates the record set when given.
    RunBacktest {
        records: Vec<RaceRecord>,
        race_count: Option<usize>,
    },
    /// Current bankroll, statistics, and risk state.
    GetReport,
}

/// Point-in-time view of the books, for operators and dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub current_amount: Decimal,
    pub initial_amount: Decimal,
    pub roi_percentage: Decimal,
    pub win_rate: Decimal,
    pub statistics: Statistics,
    pub is_stopped_today: bool,
    pub stop_reason: Option<String>,
    pub daily_loss: Decimal,
}

#[derive(Debug)]
pub enum CommandOutput {
    Ack(String),
    Report(StatusReport),
    Backtest(Box<BacktestReport>),
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

pub struct CommandHandler {
    config: EngineConfig,
}

impl CommandHandler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn execute(
        &self,
        command: Command,
        ledger: &mut Ledger,
        risk: &mut RiskController,
    ) -> CommandOutput {
        match command {
            Command::StopToday => {
                risk.stop_today();
                info!("Operator stopped wagering for today");
                CommandOutput::Ack("Wagering stopped for today".to_string())
            }
            Command::Resume => {
                risk.resume();
                info!("Operator resumed wagering");
                CommandOutput::Ack("Wagering resumed".to_string())
            }
            Command::RunBacktest {
                records,
                race_count,
            } => {
                let slice = match race_count {
                    Some(n) => &records[..n.min(records.len())],
                    None => &records[..],
                };
                let backtester = Backtester::new(self.config.clone());
                let report =
                    backtester.run(slice, self.config.bankroll.initial_amount);
                CommandOutput::Backtest(Box::new(report))
            }
            Command::GetReport => CommandOutput::Report(StatusReport {
                current_amount: ledger.current_amount(),
                initial_amount: ledger.initial_amount(),
                roi_percentage: ledger.roi_percentage(),
                win_rate: ledger.statistics().win_rate(),
                statistics: ledger.statistics().clone(),
                is_stopped_today: risk.is_stopped(),
                stop_reason: risk.stop_reason().map(str::to_string),
                daily_loss: risk.daily_loss(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
