//! TEPPAN — Risk-Controlled Stake Sizing and Bankroll Engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or creates fresh), dispatches one operator
//! command, and persists the state back.

use anyhow::{Context, Result};
use tracing::info;

use teppan::commands::{Command, CommandHandler, CommandOutput};
use teppan::config::EngineConfig;
use teppan::ledger::Ledger;
use teppan::risk::RiskController;
use teppan::storage::{Snapshot, StateStore};

const BANNER: &str = r#"
 _____ _____ ____  ____   _    _   _
|_   _| ____|  _ \|  _ \ / \  | \ | |
  | | |  _| | |_) | |_) / _ \ |  \| |
  | | | |___|  __/|  __/ ___ \| |\  |
  |_| |_____|_|   |_| /_/   \_\_| \_|

  Keirin Stake Sizing & Bankroll Engine
"#;

fn main() -> Result<()> {
    let config = EngineConfig::load_or_default("config.toml")?;
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_command(&args)? {
        Some(c) => c,
        None => {
            eprintln!("{BANNER}");
            eprintln!("usage: teppan <stop|resume|report|backtest N <records.json>>");
            std::process::exit(2);
        }
    };

    // -- Restore or create state ------------------------------------------

    let store = StateStore::new(&config.bankroll.state_path);
    let previous = store.load()?;
    let (mut ledger, mut risk, history) = match previous.clone() {
        Some(snapshot) => snapshot.into_state(),
        None => {
            let ledger = Ledger::new(config.bankroll.initial_amount);
            info!(bankroll = %ledger.current_amount(), "Fresh start");
            (ledger, RiskController::new(&config.risk), Vec::new())
        }
    };
    risk.roll_day(chrono::Local::now().date_naive());

    // -- Execute ------------------------------------------------------------

    let handler = CommandHandler::new(config);
    match handler.execute(command, &mut ledger, &mut risk) {
        CommandOutput::Ack(message) => println!("{message}"),
        CommandOutput::Report(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?)
        }
        CommandOutput::Backtest(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?)
        }
    }

    // -- Persist -------------------------------------------------------------

    let snapshot = Snapshot::from_state(&ledger, &risk, &history, previous.as_ref());
    store.save(&snapshot)?;
    info!(balance = %ledger.current_amount(), "State persisted");

    Ok(())
}

fn parse_command(args: &[String]) -> Result<Option<Command>> {
    let command = match args.first().map(String::as_str) {
        Some("stop") => Some(Command::StopToday),
        Some("resume") => Some(Command::Resume),
        Some("report") => Some(Command::GetReport),
        Some("backtest") => match (args.get(1), args.get(2)) {
            (Some(count), Some(path)) => {
                let race_count = count
                    .parse::<usize>()
                    .with_context(|| format!("Invalid race count: {count}"))?;
                Some(Command::RunBacktest {
                    records: load_records(path)?,
                    race_count: Some(race_count),
                })
            }
            (Some(path), None) => Some(Command::RunBacktest {
                records: load_records(path)?,
                race_count: None,
            }),
            _ => None,
        },
        _ => None,
    };
    Ok(command)
}

fn load_records(path: &str) -> Result<Vec<teppan::backtest::RaceRecord>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read race records from {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse race records from {path}"))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("teppan=info"));

    if std::env::var("TEPPAN_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
