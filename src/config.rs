//! Configuration loading from TOML with range validation.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every threshold has a documented default matching the production
//! rule book: 3 losses, ¥3000 daily loss, ¥100 balance floor, 0.1
//! stake multiplier, 60/20/15/5% allocation, EV cutoff 1.0, risk
//! probability cutoff 0.10.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::types::{EngineError, WagerType};

/// Top-level engine configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub bankroll: BankrollConfig,
    pub risk: RiskConfig,
    pub staking: StakingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BankrollConfig {
    /// Seed amount for a fresh ledger.
    pub initial_amount: Decimal,
    /// Path of the persisted state snapshot.
    pub state_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    /// Consecutive losses that trip the automatic stop.
    pub max_losing_streak_limit: u32,
    /// Cumulative loss within one calendar day that trips the stop.
    pub daily_loss_limit: Decimal,
    /// Bankroll below this stops all wagering.
    pub minimum_balance_floor: Decimal,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StakingConfig {
    /// Flat Kelly-like multiplier: stake_fraction = confidence × this.
    pub stake_fraction_multiplier: Decimal,
    /// Stakes below this are rejected as zero-impact micro-wagers.
    pub min_stake: Decimal,
    /// Candidates with odds × confidence at or below this are passed.
    pub expected_value_cutoff: Decimal,
    /// Candidates with risk probability at or above this are passed (KEN).
    pub risk_probability_cutoff: Decimal,
    pub allocation: AllocationWeights,
}

/// Fixed cross-type capital allocation, applied when multiple wager
/// types are proposed in a single decision cycle.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AllocationWeights {
    pub triple_exact: Decimal,
    pub triple_box: Decimal,
    pub exacta: Decimal,
    pub quinella_place: Decimal,
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            initial_amount: dec!(10000),
            state_path: "data/state.json".to_string(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_losing_streak_limit: 3,
            daily_loss_limit: dec!(3000),
            minimum_balance_floor: dec!(100),
        }
    }
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            stake_fraction_multiplier: dec!(0.1),
            min_stake: dec!(100),
            expected_value_cutoff: dec!(1.0),
            risk_probability_cutoff: dec!(0.10),
            allocation: AllocationWeights::default(),
        }
    }
}

impl Default for AllocationWeights {
    fn default() -> Self {
        Self {
            triple_exact: dec!(0.60),
            triple_box: dec!(0.20),
            exacta: dec!(0.15),
            quinella_place: dec!(0.05),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bankroll: BankrollConfig::default(),
            risk: RiskConfig::default(),
            staking: StakingConfig::default(),
        }
    }
}

impl AllocationWeights {
    /// Allocation share for a wager type.
    pub fn weight_for(&self, wager_type: WagerType) -> Decimal {
        match wager_type {
            WagerType::TripleExact => self.triple_exact,
            WagerType::TripleBox => self.triple_box,
            WagerType::Exacta => self.exacta,
            WagerType::QuinellaPlace => self.quinella_place,
        }
    }

    fn total(&self) -> Decimal {
        self.triple_exact + self.triple_box + self.exacta + self.quinella_place
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, validating ranges.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: EngineConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file when present, otherwise use defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Range checks, applied once at construction. Thresholds are fixed
    /// for the lifetime of the engine; nothing here is tunable per call.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bankroll.initial_amount <= Decimal::ZERO {
            return Err(EngineError::Config(
                "initial_amount must be positive".to_string(),
            ));
        }
        if self.risk.max_losing_streak_limit == 0 {
            return Err(EngineError::Config(
                "max_losing_streak_limit must be at least 1".to_string(),
            ));
        }
        if self.risk.daily_loss_limit <= Decimal::ZERO {
            return Err(EngineError::Config(
                "daily_loss_limit must be positive".to_string(),
            ));
        }
        if self.risk.minimum_balance_floor < Decimal::ZERO {
            return Err(EngineError::Config(
                "minimum_balance_floor must not be negative".to_string(),
            ));
        }
        if self.staking.stake_fraction_multiplier <= Decimal::ZERO
            || self.staking.stake_fraction_multiplier > Decimal::ONE
        {
            return Err(EngineError::Config(
                "stake_fraction_multiplier must be in (0, 1]".to_string(),
            ));
        }
        if self.staking.min_stake < Decimal::ZERO {
            return Err(EngineError::Config(
                "min_stake must not be negative".to_string(),
            ));
        }
        if self.staking.expected_value_cutoff < Decimal::ZERO {
            return Err(EngineError::Config(
                "expected_value_cutoff must not be negative".to_string(),
            ));
        }
        if self.staking.risk_probability_cutoff <= Decimal::ZERO
            || self.staking.risk_probability_cutoff > Decimal::ONE
        {
            return Err(EngineError::Config(
                "risk_probability_cutoff must be in (0, 1]".to_string(),
            ));
        }
        let total = self.staking.allocation.total();
        if total != Decimal::ONE {
            return Err(EngineError::Config(format!(
                "allocation weights must sum to 1.0, got {total}"
            )));
        }
        Ok(())
    }
}
