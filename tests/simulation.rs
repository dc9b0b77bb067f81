//! End-to-end simulation harness.
//!
//! Drives the full pipeline — decision cycles, settlement, risk stops,
//! persistence, and backtests — through realistic multi-race days with
//! no mocks between the modules.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::path::PathBuf;

use teppan::backtest::{Backtester, RaceRecord};
use teppan::commands::{Command, CommandHandler, CommandOutput};
use teppan::config::EngineConfig;
use teppan::engine::DecisionEngine;
use teppan::ledger::Ledger;
use teppan::risk::RiskController;
use teppan::settlement::settle;
use teppan::staking::StakeEngine;
use teppan::storage::{Snapshot, StateStore};
use teppan::types::{BetRecord, CandidateOutcome, SettlementResult, WagerType};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strong_candidate() -> CandidateOutcome {
    let mut c = CandidateOutcome::new(WagerType::TripleExact, dec!(5.0), dec!(0.92));
    c.risk_probability = Some(dec!(0.08));
    c
}

fn losing_race(id: &str, day: u32) -> RaceRecord {
    RaceRecord {
        race_id: id.to_string(),
        day,
        candidates: vec![strong_candidate()],
        results: BTreeMap::new(),
    }
}

fn winning_race(id: &str, day: u32, multiplier: Decimal) -> RaceRecord {
    let mut results = BTreeMap::new();
    results.insert(WagerType::TripleExact, SettlementResult::won(multiplier));
    RaceRecord {
        race_id: id.to_string(),
        day,
        candidates: vec![strong_candidate()],
        results,
    }
}

fn temp_state_path() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("teppan_sim_state_{}.json", uuid::Uuid::new_v4()));
    p
}

// ---------------------------------------------------------------------------
// Decision pipeline
// ---------------------------------------------------------------------------

#[test]
fn test_full_cycle_win_and_report() {
    let config = EngineConfig::default();
    let engine = DecisionEngine::new(StakeEngine::new(config.staking.clone()));
    let mut ledger = Ledger::new(dec!(10000));
    let mut risk = RiskController::new(&config.risk);
    let mut history: Vec<BetRecord> = Vec::new();

    // Strong single candidate: stake = 10000 × 0.92 × 0.1 = 920
    let outcome = engine.run_cycle(
        &mut ledger,
        &mut risk,
        "kokura_07",
        &[strong_candidate()],
        0,
        "w0",
    );
    assert_eq!(outcome.wagers.len(), 1);
    let mut wager = outcome.wagers.into_iter().next().unwrap();
    assert_eq!(wager.stake_amount, dec!(920));
    assert_eq!(ledger.current_amount(), dec!(9080));

    // Settlement pays the realized multiplier, not the posted odds
    let settled = settle(
        &mut ledger,
        &mut risk,
        &mut wager,
        &SettlementResult::won(dec!(4.2)),
        &mut history,
        1,
    )
    .unwrap();
    assert_eq!(settled.payout, dec!(3864));
    assert_eq!(ledger.current_amount(), dec!(12944));

    // Operator report reflects the books
    let handler = CommandHandler::new(config);
    let out = handler.execute(Command::GetReport, &mut ledger, &mut risk);
    let report = match out {
        CommandOutput::Report(r) => r,
        other => panic!("expected report, got {other:?}"),
    };
    assert_eq!(report.current_amount, dec!(12944));
    assert_eq!(report.roi_percentage, dec!(29.44));
    assert_eq!(report.statistics.wins, 1);
    assert!(!report.is_stopped_today);
}

#[test]
fn test_high_risk_candidate_is_kenned() {
    let config = EngineConfig::default();
    let engine = DecisionEngine::new(StakeEngine::new(config.staking.clone()));
    let mut ledger = Ledger::new(dec!(10000));
    let mut risk = RiskController::new(&config.risk);

    // Positive edge (ev = 1.5) but implied risk probability 0.5
    let candidate = CandidateOutcome::new(WagerType::TripleExact, dec!(3.0), dec!(0.5));
    let outcome = engine.run_cycle(&mut ledger, &mut risk, "kokura_08", &[candidate], 0, "w0");

    assert!(outcome.wagers.is_empty());
    assert_eq!(ledger.current_amount(), dec!(10000));
    assert_eq!(ledger.statistics().ken_count, 1);
}

#[test]
fn test_three_losses_stop_the_day() {
    let config = EngineConfig::default();
    let engine = DecisionEngine::new(StakeEngine::new(config.staking.clone()));
    let mut ledger = Ledger::new(dec!(10000));
    let mut risk = RiskController::new(&config.risk);
    let mut history: Vec<BetRecord> = Vec::new();

    for (i, race) in ["r1", "r2", "r3"].into_iter().enumerate() {
        let outcome = engine.run_cycle(
            &mut ledger,
            &mut risk,
            race,
            &[strong_candidate()],
            i as u64,
            race,
        );
        assert_eq!(outcome.wagers.len(), 1, "gate should be open for {race}");
        let mut wager = outcome.wagers.into_iter().next().unwrap();
        settle(
            &mut ledger,
            &mut risk,
            &mut wager,
            &SettlementResult::lost(),
            &mut history,
            i as u64,
        )
        .unwrap();
    }

    assert!(risk.is_stopped());
    assert_eq!(ledger.statistics().current_losing_streak, 3);

    // Fourth race: gate closed, candidate never sized, nothing deducted
    let balance_before = ledger.current_amount();
    let outcome = engine.run_cycle(&mut ledger, &mut risk, "r4", &[strong_candidate()], 3, "r4");
    assert!(outcome.gate_closed.is_some());
    assert!(outcome.wagers.is_empty());
    assert_eq!(ledger.current_amount(), balance_before);
}

// ---------------------------------------------------------------------------
// Backtests
// ---------------------------------------------------------------------------

#[test]
fn test_backtest_reports_are_byte_identical() {
    let records = vec![
        winning_race("r1", 0, dec!(4.2)),
        losing_race("r2", 0),
        losing_race("r3", 1),
        winning_race("r4", 1, dec!(2.8)),
        losing_race("r5", 2),
        losing_race("r6", 2),
    ];
    let bt = Backtester::new(EngineConfig::default());

    let first = serde_json::to_vec(&bt.run(&records, dec!(10000))).unwrap();
    let second = serde_json::to_vec(&bt.run(&records, dec!(10000))).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_backtest_daily_stop_reopens_next_day() {
    // Day 0: three straight losses close the gate, so the fourth race
    // that day is passed. Day 1 reopens the gate; the carried streak
    // re-stops the machine at the first loss settlement.
    let records = vec![
        losing_race("r1", 0),
        losing_race("r2", 0),
        losing_race("r3", 0),
        losing_race("r4", 0),
        losing_race("r5", 1),
    ];
    let report = Backtester::new(EngineConfig::default()).run(&records, dec!(10000));
    assert_eq!(report.losses, 4);
    assert_eq!(report.ken_count, 1);
    assert_eq!(report.stop_events.len(), 2);
    assert!(report.stop_events.iter().all(|e| e.contains("losing streak")));
}

#[test]
fn test_backtest_does_not_touch_live_state() {
    let config = EngineConfig::default();
    let handler = CommandHandler::new(config.clone());
    let mut ledger = Ledger::new(dec!(10000));
    let mut risk = RiskController::new(&config.risk);

    let out = handler.execute(
        Command::RunBacktest {
            records: vec![losing_race("r1", 0), losing_race("r2", 0)],
            race_count: None,
        },
        &mut ledger,
        &mut risk,
    );
    assert!(matches!(out, CommandOutput::Backtest(_)));
    assert_eq!(ledger.current_amount(), dec!(10000));
    assert_eq!(ledger.statistics().total_bets, 0);
    assert!(!risk.is_stopped());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn test_state_survives_restart() {
    let path = temp_state_path();
    let store = StateStore::new(&path);
    let config = EngineConfig::default();

    // Session one: place and settle a winning wager, then persist
    {
        let engine = DecisionEngine::new(StakeEngine::new(config.staking.clone()));
        let mut ledger = Ledger::new(config.bankroll.initial_amount);
        let mut risk = RiskController::new(&config.risk);
        let mut history: Vec<BetRecord> = Vec::new();

        let outcome = engine.run_cycle(
            &mut ledger,
            &mut risk,
            "kokura_07",
            &[strong_candidate()],
            0,
            "w0",
        );
        let mut wager = outcome.wagers.into_iter().next().unwrap();
        settle(
            &mut ledger,
            &mut risk,
            &mut wager,
            &SettlementResult::won(dec!(4.2)),
            &mut history,
            1,
        )
        .unwrap();

        store
            .save(&Snapshot::from_state(&ledger, &risk, &history, None))
            .unwrap();
    }

    // Session two: reload and verify the books carried over
    {
        let snapshot = store.load().unwrap().expect("state file should exist");
        let (ledger, risk, history) = snapshot.into_state();
        assert_eq!(ledger.current_amount(), dec!(12944));
        assert_eq!(ledger.initial_amount(), dec!(10000));
        assert_eq!(ledger.statistics().wins, 1);
        assert_eq!(history.len(), 1);
        assert!(history[0].won);
        assert!(!risk.is_stopped());
    }

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_concurrent_writers_conflict() {
    let path = temp_state_path();
    let store = StateStore::new(&path);
    let config = EngineConfig::default();

    let ledger = Ledger::new(config.bankroll.initial_amount);
    let risk = RiskController::new(&config.risk);
    let base = Snapshot::from_state(&ledger, &risk, &[], None);
    store.save(&base).unwrap();

    // Two readers pick up version 1; the second save must be rejected
    let first = store.load().unwrap().unwrap();
    let second = store.load().unwrap().unwrap();
    store.save(&first).unwrap();
    assert!(store.save(&second).is_err());

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_manual_stop_persists_across_restart() {
    let path = temp_state_path();
    let store = StateStore::new(&path);
    let config = EngineConfig::default();

    {
        let mut ledger = Ledger::new(config.bankroll.initial_amount);
        let mut risk = RiskController::new(&config.risk);
        let handler = CommandHandler::new(config.clone());
        handler.execute(Command::StopToday, &mut ledger, &mut risk);
        store
            .save(&Snapshot::from_state(&ledger, &risk, &[], None))
            .unwrap();
    }

    {
        let snapshot = store.load().unwrap().unwrap();
        let (_, risk, _) = snapshot.into_state();
        assert!(risk.is_stopped());
        assert_eq!(risk.stop_reason(), Some("manual stop"));
    }

    std::fs::remove_file(&path).unwrap();
}
