//! Persistence layer.
//!
//! The whole engine state is saved and loaded as a single JSON
//! snapshot. Snapshots are written wholesale, never patched in place,
//! and carry a version token: a save whose in-memory version no longer
//! matches the file on disk is rejected before anything is written.
//!
//! The snapshot also carries opaque sections owned by the learning
//! collaborators (racer database, pattern analysis, learning logs).
//! They ride along untouched so an external writer's data survives an
//! engine save.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::ledger::{Ledger, Statistics};
use crate::risk::RiskController;
use crate::types::{BetRecord, EngineError};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankrollSection {
    pub current_amount: Decimal,
    pub initial_amount: Decimal,
}

/// Statistics as persisted: the running counters plus the ROI derived
/// at save time for external readers. ROI is never read back; the live
/// ledger always recomputes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsSection {
    #[serde(flatten)]
    pub counters: Statistics,
    pub roi_percentage: Decimal,
}

/// The persisted state, one file per engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Optimistic concurrency token, incremented on every save.
    pub version: u64,
    pub bankroll: BankrollSection,
    pub statistics: StatisticsSection,
    pub risk_control: RiskController,
    pub bet_history: Vec<BetRecord>,
    /// Opaque sections, passed through verbatim.
    #[serde(default)]
    pub racer_database: serde_json::Value,
    #[serde(default)]
    pub pattern_analysis: serde_json::Value,
    #[serde(default)]
    pub learning_logs: serde_json::Value,
}

impl Snapshot {
    /// Build a snapshot from live engine state, preserving the opaque
    /// sections and version of the previous snapshot when present.
    pub fn from_state(
        ledger: &Ledger,
        risk: &RiskController,
        history: &[BetRecord],
        previous: Option<&Snapshot>,
    ) -> Self {
        let (version, racer_database, pattern_analysis, learning_logs) = match previous {
            Some(prev) => (
                prev.version,
                prev.racer_database.clone(),
                prev.pattern_analysis.clone(),
                prev.learning_logs.clone(),
            ),
            None => (
                0,
                serde_json::Value::Null,
                serde_json::Value::Null,
                serde_json::Value::Null,
            ),
        };
        Self {
            version,
            bankroll: BankrollSection {
                current_amount: ledger.current_amount(),
                initial_amount: ledger.initial_amount(),
            },
            statistics: StatisticsSection {
                counters: ledger.statistics().clone(),
                roi_percentage: ledger.roi_percentage(),
            },
            risk_control: risk.clone(),
            bet_history: history.to_vec(),
            racer_database,
            pattern_analysis,
            learning_logs,
        }
    }

    /// Rebuild the live state from this snapshot.
    pub fn into_state(self) -> (Ledger, RiskController, Vec<BetRecord>) {
        let ledger = Ledger::restore(
            self.bankroll.current_amount,
            self.bankroll.initial_amount,
            self.statistics.counters,
        );
        (ledger, self.risk_control, self.bet_history)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// File-backed snapshot store.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot from disk. Returns None when no file exists
    /// yet (fresh start).
    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No saved state found, starting fresh");
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state from {}", self.path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse state from {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            version = snapshot.version,
            balance = %snapshot.bankroll.current_amount,
            bets = snapshot.statistics.counters.total_bets,
            "State loaded from disk"
        );
        Ok(Some(snapshot))
    }

    /// Save a snapshot wholesale. The file's current version must match
    /// `snapshot.version`; a mismatch means another writer got there
    /// first and the save is rejected with `ConflictingWrite` before
    /// any byte is written. On success the stored version is
    /// incremented.
    pub fn save(&self, snapshot: &Snapshot) -> Result<u64> {
        if let Some(on_disk) = self.load()? {
            if on_disk.version != snapshot.version {
                return Err(EngineError::ConflictingWrite {
                    expected: snapshot.version,
                    found: on_disk.version,
                }
                .into());
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create state directory {}", parent.display())
                })?;
            }
        }

        let mut to_write = snapshot.clone();
        to_write.version += 1;
        let json = serde_json::to_string_pretty(&to_write)
            .context("Failed to serialise state snapshot")?;
        std::fs::write(&self.path, &json)
            .with_context(|| format!("Failed to write state to {}", self.path.display()))?;

        debug!(
            path = %self.path.display(),
            version = to_write.version,
            balance = %to_write.bankroll.current_amount,
            "State saved"
        );
        Ok(to_write.version)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::types::{SettlementResult, Wager, WagerOutcome, WagerType};
    use rust_decimal_macros::dec;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("teppan_test_state_{}.json", uuid::Uuid::new_v4()));
        p
    }

    fn sample_state() -> (Ledger, RiskController, Vec<BetRecord>) {
        let mut ledger = Ledger::new(dec!(10000));
        let risk = RiskController::new(&RiskConfig::default());
        ledger.place(dec!(920)).unwrap();
        let mut wager = Wager {
            id: "w-1".to_string(),
            race_id: "kokura_07".to_string(),
            wager_type: WagerType::TripleExact,
            stake_amount: dec!(920),
            odds: dec!(5.0),
            confidence: dec!(0.92),
            placed_at: 0,
            outcome: WagerOutcome::Pending,
            payout: Decimal::ZERO,
        };
        ledger
            .apply_settlement(&mut wager, &SettlementResult::won(dec!(4.2)))
            .unwrap();
        let history = vec![BetRecord {
            wager_id: wager.id.clone(),
            race_id: wager.race_id.clone(),
            wager_type: wager.wager_type,
            stake_amount: wager.stake_amount,
            odds: wager.odds,
            confidence: wager.confidence,
            won: true,
            payout: wager.payout,
            settled_at: 1,
        }];
        (ledger, risk, history)
    }

    #[test]
    fn test_load_nonexistent_is_fresh_start() {
        let store = StateStore::new("/tmp/teppan_nonexistent_state_12345.json");
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let path = temp_path();
        let store = StateStore::new(&path);
        let (ledger, risk, history) = sample_state();

        let snapshot = Snapshot::from_state(&ledger, &risk, &history, None);
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.bankroll.current_amount, dec!(12944));
        assert_eq!(loaded.statistics.counters.wins, 1);
        assert_eq!(loaded.statistics.roi_percentage, dec!(29.44));
        assert_eq!(loaded.bet_history.len(), 1);

        let (restored, restored_risk, restored_history) = loaded.into_state();
        assert_eq!(restored.current_amount(), dec!(12944));
        assert_eq!(restored.initial_amount(), dec!(10000));
        assert_eq!(restored.statistics().wins, 1);
        assert!(!restored_risk.is_stopped());
        assert_eq!(restored_history.len(), 1);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_version_increments_on_each_save() {
        let path = temp_path();
        let store = StateStore::new(&path);
        let (ledger, risk, history) = sample_state();

        let snapshot = Snapshot::from_state(&ledger, &risk, &history, None);
        assert_eq!(store.save(&snapshot).unwrap(), 1);

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(store.save(&loaded).unwrap(), 2);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_stale_version_rejected() {
        let path = temp_path();
        let store = StateStore::new(&path);
        let (ledger, risk, history) = sample_state();

        let snapshot = Snapshot::from_state(&ledger, &risk, &history, None);
        store.save(&snapshot).unwrap();

        // A second writer bumps the file version
        let fresh = store.load().unwrap().unwrap();
        store.save(&fresh).unwrap();

        // The first writer's stale snapshot (version 0) must be rejected
        let err = store.save(&snapshot).unwrap_err();
        let engine_err = err.downcast::<EngineError>().unwrap();
        assert!(matches!(
            engine_err,
            EngineError::ConflictingWrite { expected: 0, found: 2 }
        ));

        // The winning write is intact
        let on_disk = store.load().unwrap().unwrap();
        assert_eq!(on_disk.version, 2);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_opaque_sections_survive_roundtrip() {
        let path = temp_path();
        let store = StateStore::new(&path);
        let (ledger, risk, history) = sample_state();

        let mut snapshot = Snapshot::from_state(&ledger, &risk, &history, None);
        snapshot.racer_database = serde_json::json!({"12345": {"win_rate": 0.31}});
        snapshot.pattern_analysis = serde_json::json!({"line_patterns": [1, 2, 3]});
        store.save(&snapshot).unwrap();

        // A later save built from live state carries the sections forward
        let previous = store.load().unwrap().unwrap();
        let next = Snapshot::from_state(&ledger, &risk, &history, Some(&previous));
        store.save(&next).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.racer_database["12345"]["win_rate"], 0.31);
        assert_eq!(loaded.pattern_analysis["line_patterns"][1], 2);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("teppan_test_dir_{}", uuid::Uuid::new_v4()));
        let path = dir.join("state.json");
        let store = StateStore::new(&path);
        let (ledger, risk, history) = sample_state();

        store
            .save(&Snapshot::from_state(&ledger, &risk, &history, None))
            .unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
