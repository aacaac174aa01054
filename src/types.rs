//! Shared types for the ANGLER engine.
//!
//! These types form the data model used across all modules: fishing
//! ranges, caught fish, session outcomes and the per-account context.
//! They sit below the api, session and engine modules so that none of
//! those need to depend on each other for their vocabulary.

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::config::AccountSettings;

// ---------------------------------------------------------------------------
// Fishing range
// ---------------------------------------------------------------------------

/// One of the three attempt types offered by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FishingRange {
    #[serde(rename = "short_range")]
    Short,
    #[serde(rename = "mid_range")]
    Mid,
    #[serde(rename = "long_range")]
    Long,
}

impl FishingRange {
    /// All ranges, cheapest first.
    pub const ALL: &'static [FishingRange] =
        &[FishingRange::Short, FishingRange::Mid, FishingRange::Long];

    /// Name used on the wire and in configuration.
    pub fn wire_name(&self) -> &'static str {
        match self {
            FishingRange::Short => "short_range",
            FishingRange::Mid => "mid_range",
            FishingRange::Long => "long_range",
        }
    }
}

impl fmt::Display for FishingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// Caught fish
// ---------------------------------------------------------------------------

/// A fish held in the account's in-memory inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaughtFish {
    pub id: String,
    pub name: String,
    /// Quality grade, 1 (worst) to 5 (best).
    pub quality: u8,
    /// Gold received when sold.
    pub sell_price: u64,
}

impl fmt::Display for CaughtFish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (quality {}, {} gold)",
            self.name, self.quality, self.sell_price
        )
    }
}

/// Accept an identifier sent either as a JSON string or a number.
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Session outcome
// ---------------------------------------------------------------------------

/// Post-session economic state reported by the server on `gameOver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EconomySnapshot {
    pub remaining_energy: u32,
    pub gold: u64,
    pub fish_points: u64,
}

/// Terminal result of one fishing session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The server accepted the replay and awarded a fish.
    Caught {
        fish: CaughtFish,
        economy: EconomySnapshot,
        exp: u64,
        exp_to_next_level: Option<u64>,
        exp_gain: u64,
    },
    /// The game finished but nothing was caught.
    Missed { economy: EconomySnapshot },
    /// The session never reached a `gameOver`.
    Failed { reason: FailureReason },
}

impl SessionOutcome {
    pub fn is_caught(&self) -> bool {
        matches!(self, SessionOutcome::Caught { .. })
    }
}

/// Why a session resolved to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("reconnect budget exhausted after {attempts} attempts (last error: {last_error})")]
    ReconnectsExhausted { attempts: u32, last_error: String },

    #[error("connection lost after the game had started")]
    ConnectionLost,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

// ---------------------------------------------------------------------------
// Account context
// ---------------------------------------------------------------------------

/// All mutable state of one tracked account.
///
/// Owned by exactly one scheduler for the lifetime of the process and
/// passed by reference into every session and economy call. Never
/// persisted.
#[derive(Debug)]
pub struct AccountContext {
    /// Human-readable label used in logs.
    pub label: String,
    pub token: SecretString,
    /// Global defaults with this account's overrides applied.
    pub settings: AccountSettings,

    pub energy: u32,
    /// When depleted energy is expected back. Only set while `energy == 0`.
    pub energy_refresh_at: Option<DateTime<Utc>>,
    pub gold: u64,
    pub fish_points: u64,
    pub exp: u64,

    /// Consecutive failures; reset by any successful session.
    pub retry_count: u32,

    pub fish_inventory: Vec<CaughtFish>,
    pub fish_since_last_sell: u32,
    pub total_fish_caught: u64,

    pub daily_reward_claimed: bool,
    /// UTC date of the last successful claim.
    pub daily_claimed_on: Option<NaiveDate>,
    pub last_daily_claim_check: Option<DateTime<Utc>>,
}

impl AccountContext {
    pub fn new(label: impl Into<String>, token: SecretString, settings: AccountSettings) -> Self {
        Self {
            label: label.into(),
            token,
            settings,
            energy: 0,
            energy_refresh_at: None,
            gold: 0,
            fish_points: 0,
            exp: 0,
            retry_count: 0,
            fish_inventory: Vec::new(),
            fish_since_last_sell: 0,
            total_fish_caught: 0,
            daily_reward_claimed: false,
            daily_claimed_on: None,
            last_daily_claim_check: None,
        }
    }

    /// Apply server-reported post-session state.
    pub fn apply_snapshot(&mut self, snapshot: &EconomySnapshot) {
        self.energy = snapshot.remaining_energy;
        self.gold = snapshot.gold;
        self.fish_points = snapshot.fish_points;
        if self.energy > 0 {
            self.energy_refresh_at = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ANGLER.
#[derive(Debug, thiserror::Error)]
pub enum AnglerError {
    #[error("API error on {endpoint}: HTTP {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error for account {account}: {message}")]
    Credential { account: String, message: String },
}

impl AnglerError {
    /// Whether this is an HTTP 503 from the game service.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, AnglerError::Api { status: 503, .. })
    }
}

/// Format a duration as `HH:MM:SS`; negative durations render as zero.
pub fn format_time_remaining(remaining: chrono::Duration) -> String {
    let total = remaining.num_seconds().max(0);
    let hours = total / 3600;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
