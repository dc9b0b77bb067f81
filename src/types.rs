//! Shared types for the TEPPAN engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the ledger, risk, staking,
//! and backtest modules can depend on them without circular references.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Wager types
// ---------------------------------------------------------------------------

/// Category of bet. Each type carries a fixed share of the capital
/// committed in a single decision cycle when several types are
/// proposed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum WagerType {
    /// First three finishers in exact order (sanrentan).
    TripleExact,
    /// First three finishers in any order (sanrenpuku).
    TripleBox,
    /// First two finishers in exact order (nirentan).
    Exacta,
    /// Two picks both finishing in the top three (wide).
    QuinellaPlace,
}

impl WagerType {
    /// All known wager types (useful for iteration).
    pub const ALL: &'static [WagerType] = &[
        WagerType::TripleExact,
        WagerType::TripleBox,
        WagerType::Exacta,
        WagerType::QuinellaPlace,
    ];
}

impl fmt::Display for WagerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerType::TripleExact => write!(f, "triple-exact"),
            WagerType::TripleBox => write!(f, "triple-box"),
            WagerType::Exacta => write!(f, "exacta"),
            WagerType::QuinellaPlace => write!(f, "quinella-place"),
        }
    }
}

impl std::str::FromStr for WagerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "triple-exact" | "sanrentan" => Ok(WagerType::TripleExact),
            "triple-box" | "sanrenpuku" => Ok(WagerType::TripleBox),
            "exacta" | "nirentan" => Ok(WagerType::Exacta),
            "quinella-place" | "wide" => Ok(WagerType::QuinellaPlace),
            _ => Err(anyhow::anyhow!("Unknown wager type: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate outcomes
// ---------------------------------------------------------------------------

/// One candidate outcome proposed by the prediction oracle for a race:
/// a wager type with its posted odds and the oracle's confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateOutcome {
    pub wager_type: WagerType,
    /// Decimal payout multiplier (> 0).
    pub odds: Decimal,
    /// Probability estimate in [0, 1].
    pub confidence: Decimal,
    /// Oracle-supplied catastrophic-failure probability. When absent,
    /// `1 - confidence` is used.
    #[serde(default)]
    pub risk_probability: Option<Decimal>,
    /// Opaque pass-through (rationale, combinations, etc.). Never
    /// interpreted by this engine.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl CandidateOutcome {
    pub fn new(wager_type: WagerType, odds: Decimal, confidence: Decimal) -> Self {
        Self {
            wager_type,
            odds,
            confidence,
            risk_probability: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Expected value of this candidate: odds × confidence.
    /// Must exceed 1.0 to justify a stake.
    pub fn expected_value(&self) -> Decimal {
        self.odds * self.confidence
    }

    /// Effective risk probability: the oracle's figure when supplied,
    /// otherwise `1 - confidence`.
    pub fn effective_risk_probability(&self) -> Decimal {
        self.risk_probability
            .unwrap_or_else(|| Decimal::ONE - self.confidence)
    }

    /// Domain-range validation. Malformed candidates are dropped by the
    /// stake sizing engine without aborting the decision cycle.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.odds <= Decimal::ZERO {
            return Err(EngineError::InvalidCandidate(format!(
                "odds must be positive, got {}",
                self.odds
            )));
        }
        if self.confidence < Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(EngineError::InvalidCandidate(format!(
                "confidence must be in [0, 1], got {}",
                self.confidence
            )));
        }
        if let Some(rp) = self.risk_probability {
            if rp < Decimal::ZERO || rp > Decimal::ONE {
                return Err(EngineError::InvalidCandidate(format!(
                    "risk probability must be in [0, 1], got {rp}"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for CandidateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @ {}x conf={}% ev={} rp={}%",
            self.wager_type,
            self.odds,
            (self.confidence * dec!(100)).round_dp(0),
            self.expected_value().round_dp(2),
            (self.effective_risk_probability() * dec!(100)).round_dp(0),
        )
    }
}

// ---------------------------------------------------------------------------
// Wagers
// ---------------------------------------------------------------------------

/// Resolution state of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WagerOutcome {
    Pending,
    Won,
    Lost,
}

impl fmt::Display for WagerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WagerOutcome::Pending => write!(f, "PENDING"),
            WagerOutcome::Won => write!(f, "WON"),
            WagerOutcome::Lost => write!(f, "LOST"),
        }
    }
}

/// A placed wager. The stake has already been deducted from the
/// bankroll at placement time; settlement credits the payout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wager {
    pub id: String,
    pub race_id: String,
    pub wager_type: WagerType,
    /// Stake in currency units (> 0, ≤ bankroll at placement).
    pub stake_amount: Decimal,
    /// Posted odds at placement time. Settlement uses the realized
    /// multiplier instead, which may differ.
    pub odds: Decimal,
    pub confidence: Decimal,
    /// Logical sequence index, not a wall-clock timestamp.
    pub placed_at: u64,
    pub outcome: WagerOutcome,
    /// Zero until settled.
    pub payout: Decimal,
}

impl Wager {
    pub fn is_settled(&self) -> bool {
        self.outcome != WagerOutcome::Pending
    }
}

impl fmt::Display for Wager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} stake=¥{} @ {}x ({})",
            self.race_id, self.id, self.wager_type, self.stake_amount, self.odds, self.outcome,
        )
    }
}

/// The true outcome of a wager as reported by the results feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub won: bool,
    /// Payout multiplier at settlement time. Authoritative for payout
    /// computation; posted odds are informational only.
    pub realized_multiplier: Decimal,
}

impl SettlementResult {
    pub fn lost() -> Self {
        Self {
            won: false,
            realized_multiplier: Decimal::ZERO,
        }
    }

    pub fn won(realized_multiplier: Decimal) -> Self {
        Self {
            won: true,
            realized_multiplier,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Immutable entry in the append-only bet history. Written once at
/// settlement; consumed by the racer/pattern learning collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    pub wager_id: String,
    pub race_id: String,
    pub wager_type: WagerType,
    pub stake_amount: Decimal,
    pub odds: Decimal,
    pub confidence: Decimal,
    pub won: bool,
    pub payout: Decimal,
    /// Logical sequence index of the settlement.
    pub settled_at: u64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for TEPPAN.
///
/// Per-candidate errors (`InsufficientFunds`, `InvalidCandidate`) are
/// isolated and never abort a decision cycle. State-corruption risks
/// (`AlreadySettled`, `ConflictingWrite`) are fatal for the operation
/// and abort before any write.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Insufficient funds: need ¥{needed}, have ¥{available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Wager already settled: {0}")]
    AlreadySettled(String),

    #[error("Risk gate closed: {0}")]
    RiskGateClosed(String),

    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conflicting write: snapshot version changed (expected {expected}, found {found})")]
    ConflictingWrite { expected: u64, found: u64 },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
