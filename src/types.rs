//! Shared types for the HIDEOUT agent.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that client, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// One of the fixed set of selectable rooms.
///
/// The game exposes eight rooms, numbered 1..=8 by the server. The set is
/// immutable for the lifetime of the process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoomId(pub u8);

impl RoomId {
    /// All rooms, in the server's fixed order.
    pub const ALL: [RoomId; 8] = [
        RoomId(1),
        RoomId(2),
        RoomId(3),
        RoomId(4),
        RoomId(5),
        RoomId(6),
        RoomId(7),
        RoomId(8),
    ];

    /// Display label as shown by the game client.
    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Warehouse",
            2 => "Meeting Room",
            3 => "Director's Office",
            4 => "Chat Room",
            5 => "Surveillance Room",
            6 => "Office",
            7 => "Finance Room",
            8 => "HR Room",
            _ => "Unknown Room",
        }
    }

    /// Whether this id belongs to the known room set.
    pub fn is_known(&self) -> bool {
        (1..=8).contains(&self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.0, self.label())
    }
}

impl From<u8> for RoomId {
    fn from(v: u8) -> Self {
        RoomId(v)
    }
}

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

/// Lifecycle phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    /// No round open, or waiting for the next one.
    Waiting,
    /// A round is open and the decision countdown is running.
    Analyzing,
    /// The prediction is locked and a stake was submitted or skipped.
    Predicted,
    /// The killed room is known and the outcome has been applied.
    Settled,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Waiting => write!(f, "WAITING"),
            RoundPhase::Analyzing => write!(f, "ANALYZING"),
            RoundPhase::Predicted => write!(f, "PREDICTED"),
            RoundPhase::Settled => write!(f, "SETTLED"),
        }
    }
}

/// One timed cycle of the game, identified by a server-assigned id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: u64,
    /// Advisory start time reported by the server.
    pub start_time: Option<DateTime<Utc>>,
    /// Advisory deadline reported by the server.
    pub end_time: Option<DateTime<Utc>>,
    /// Set once, at settlement.
    pub killed_room: Option<RoomId>,
}

impl Round {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            start_time: None,
            end_time: None,
            killed_room: None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.killed_room.is_some()
    }
}

// ---------------------------------------------------------------------------
// Run mode
// ---------------------------------------------------------------------------

/// Whether the agent stakes money or only surfaces predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Predict and submit stakes automatically.
    Auto,
    /// Predict only; never submit a stake.
    Observe,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Auto => write!(f, "AUTO"),
            RunMode::Observe => write!(f, "OBSERVE"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(RunMode::Auto),
            "observe" | "watch" => Ok(RunMode::Observe),
            _ => Err(anyhow::anyhow!("Unknown run mode: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Resolution state of a submitted stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetOutcome {
    Pending,
    Won,
    Lost,
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetOutcome::Pending => write!(f, "PENDING"),
            BetOutcome::Won => write!(f, "WON"),
            BetOutcome::Lost => write!(f, "LOST"),
        }
    }
}

/// A stake submitted for one round, resolved at settlement and again when
/// the deferred balance fetch reports the realized delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingBet {
    pub round_id: u64,
    pub room: RoomId,
    pub amount: f64,
    pub submitted_at: DateTime<Utc>,
    /// Strategy id that produced the prediction.
    pub strategy: String,
    pub outcome: BetOutcome,
    /// Realized balance delta; None until reconciliation completes.
    pub balance_delta: Option<f64>,
    pub win_streak_at_time: u32,
    pub lose_streak_at_time: u32,
}

impl fmt::Display for PendingBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {} | {} | {:.2} | {} | {}",
            self.round_id, self.room, self.amount, self.outcome, self.strategy,
        )
    }
}

impl PendingBet {
    pub fn is_settled(&self) -> bool {
        self.outcome != BetOutcome::Pending
    }
}

/// Outcome of a stake-submission call, as reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeAck {
    pub accepted: bool,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl fmt::Display for StakeAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.accepted {
            write!(f, "accepted")
        } else {
            write!(
                f,
                "rejected (code={:?} msg={})",
                self.code,
                self.message.as_deref().unwrap_or("-"),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Wallet snapshot. The primary currency is the one stakes are placed in;
/// the others are tracked for display only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balances {
    pub primary: Option<f64>,
    pub usdt: Option<f64>,
    pub world: Option<f64>,
}

impl Balances {
    /// Merge a fresh snapshot into this one, keeping the last known value
    /// for any currency the new snapshot did not report.
    pub fn merge(&mut self, newer: Balances) {
        if newer.primary.is_some() {
            self.primary = newer.primary;
        }
        if newer.usdt.is_some() {
            self.usdt = newer.usdt;
        }
        if newer.world.is_some() {
            self.world = newer.world;
        }
    }
}

impl fmt::Display for Balances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show(v: Option<f64>) -> String {
            v.map(|x| format!("{x:.2}")).unwrap_or_else(|| "-".to_string())
        }
        write!(
            f,
            "{} BUILD | {} USDT | {} WORLD",
            show(self.primary),
            show(self.usdt),
            show(self.world),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for HIDEOUT.
#[derive(Debug, thiserror::Error)]
pub enum HideoutError {
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error ({endpoint}): {message}")]
    Api { endpoint: String, message: String },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Balance unavailable at decision time")]
    BalanceUnavailable,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
