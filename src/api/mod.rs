//! Account/profile HTTP API.
//!
//! Defines the `GameApi` trait consumed by the scheduler and economy
//! code, the response shapes it returns, and the reqwest-backed
//! implementation in [`frenzy`].

pub mod frenzy;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `GET /v1/inventory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryStatus {
    #[serde(default)]
    pub energy: u32,
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub fish_point: u64,
    #[serde(default)]
    pub exp: u64,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub exp_to_next_level: Option<u64>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl InventoryStatus {
    /// Progress towards the next level in percent, when the server says.
    pub fn level_progress_pct(&self) -> Option<f64> {
        match self.exp_to_next_level {
            Some(next) if next > 0 => Some((self.exp % next) as f64 / next as f64 * 100.0),
            _ => None,
        }
    }
}

/// `GET /v1/daily-rewards/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRewardStatus {
    #[serde(default)]
    pub can_claim: bool,
    #[serde(default)]
    pub next_reset_time: Option<DateTime<Utc>>,
}

/// `POST /v1/daily-rewards/claim`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DailyClaimResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reward {
    #[serde(default)]
    pub quantity: u64,
    #[serde(default)]
    pub name: String,
    /// "Gold", "Item", ...
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Abstraction over the game's account API.
///
/// One instance per account: implementations carry that account's
/// credential. Non-2xx responses surface as errors; `success: false`
/// bodies are returned as values for the caller to interpret.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Current energy, gold, points and level.
    async fn inventory(&self) -> Result<InventoryStatus>;

    /// Whether today's reward can be claimed.
    async fn daily_reward_status(&self) -> Result<DailyRewardStatus>;

    /// Claim today's reward.
    async fn claim_daily_reward(&self) -> Result<DailyClaimResult>;

    /// Sell the given fish. Returns the server's `success` flag.
    async fn sell_fish(&self, fish_ids: &[String]) -> Result<bool>;
}
