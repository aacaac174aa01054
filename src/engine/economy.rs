//! Economy side effects of catches: daily rewards and auto-sell.
//!
//! Everything here mutates only the `AccountContext` it is given and
//! talks to the game through `GameApi`. Both API operations are safe to
//! repeat: the claim is gated by the hourly check window and the
//! claimed-today flag, and a sale only submits fish still in inventory.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::api::{GameApi, Reward};
use crate::types::{format_time_remaining, AccountContext, CaughtFish};

/// Minimum spacing between daily reward checks.
pub const DAILY_CHECK_INTERVAL_HOURS: i64 = 1;

// ---------------------------------------------------------------------------
// Catches
// ---------------------------------------------------------------------------

/// Record a successful catch.
///
/// The fish only enters the inventory when auto-sell is enabled, since
/// the inventory exists solely to decide what to sell.
pub fn record_catch(ctx: &mut AccountContext, fish: CaughtFish) {
    if ctx.settings.economy.enable_auto_sell {
        ctx.fish_inventory.push(fish);
    }
    ctx.total_fish_caught += 1;
    ctx.fish_since_last_sell += 1;
}

// ---------------------------------------------------------------------------
// Daily reward
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyClaim {
    /// Disabled, already claimed today, or checked less than an hour ago.
    Skipped,
    NotAvailable { next_reset: Option<DateTime<Utc>> },
    /// Server answered `success: false`.
    Rejected,
    Claimed { rewards: Vec<Reward> },
}

/// Whether a daily reward check should run at `now`.
pub fn daily_check_due(ctx: &AccountContext, now: DateTime<Utc>) -> bool {
    if !ctx.settings.economy.enable_daily_claim || claimed_today(ctx, now) {
        return false;
    }
    match ctx.last_daily_claim_check {
        None => true,
        Some(last) => now - last >= Duration::hours(DAILY_CHECK_INTERVAL_HOURS),
    }
}

fn claimed_today(ctx: &AccountContext, now: DateTime<Utc>) -> bool {
    ctx.daily_reward_claimed && ctx.daily_claimed_on == Some(now.date_naive())
}

/// Check the daily reward and claim it when available.
pub async fn check_daily_reward(
    api: &dyn GameApi,
    ctx: &mut AccountContext,
    now: DateTime<Utc>,
) -> Result<DailyClaim> {
    if ctx.daily_reward_claimed && !claimed_today(ctx, now) {
        debug!("New day, daily reward claimable again");
        ctx.daily_reward_claimed = false;
    }
    if !daily_check_due(ctx, now) {
        return Ok(DailyClaim::Skipped);
    }
    ctx.last_daily_claim_check = Some(now);

    info!("Checking daily reward");
    let status = api.daily_reward_status().await?;
    if !status.can_claim {
        match status.next_reset_time {
            Some(reset) => info!(
                next_in = %format_time_remaining(reset - now),
                "No daily reward available yet"
            ),
            None => info!("No daily reward available yet"),
        }
        return Ok(DailyClaim::NotAvailable {
            next_reset: status.next_reset_time,
        });
    }

    let claim = api.claim_daily_reward().await?;
    if !claim.success {
        warn!("Daily reward claim was rejected");
        return Ok(DailyClaim::Rejected);
    }

    ctx.daily_reward_claimed = true;
    ctx.daily_claimed_on = Some(now.date_naive());
    info!(rewards = claim.rewards.len(), "Daily reward claimed");
    for reward in &claim.rewards {
        info!(
            quantity = reward.quantity,
            name = %reward.name,
            kind = %reward.kind,
            "Reward received"
        );
    }
    Ok(DailyClaim::Claimed {
        rewards: claim.rewards,
    })
}

// ---------------------------------------------------------------------------
// Auto-sell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellResult {
    Disabled,
    /// Every held fish meets the quality floor.
    NothingToSell,
    /// Server answered `success: false`; inventory untouched.
    Rejected,
    Sold { count: usize, gold: u64 },
}

/// Whether enough fish were caught since the last sale.
pub fn sell_due(ctx: &AccountContext) -> bool {
    let economy = &ctx.settings.economy;
    economy.enable_auto_sell && ctx.fish_since_last_sell >= economy.sell_fish_interval
}

/// Split inventory into (keep, sell) by quality floor.
pub fn partition_for_sale(
    inventory: &[CaughtFish],
    min_quality_to_keep: u8,
) -> (Vec<CaughtFish>, Vec<CaughtFish>) {
    inventory
        .iter()
        .cloned()
        .partition(|fish| fish.quality >= min_quality_to_keep)
}

/// Sell every held fish below the account's quality floor.
pub async fn sell_low_quality(api: &dyn GameApi, ctx: &mut AccountContext) -> Result<SellResult> {
    if !ctx.settings.economy.enable_auto_sell {
        return Ok(SellResult::Disabled);
    }

    let floor = ctx.settings.economy.min_fish_quality_to_keep;
    let (keep, sell) = partition_for_sale(&ctx.fish_inventory, floor);
    if sell.is_empty() {
        info!(held = keep.len(), floor, "Nothing to sell, all fish meet the quality floor");
        return Ok(SellResult::NothingToSell);
    }

    let ids: Vec<String> = sell.iter().map(|f| f.id.clone()).collect();
    info!(count = ids.len(), floor, "Selling fish");
    if !api.sell_fish(&ids).await? {
        warn!(count = ids.len(), "Fish sale was rejected");
        return Ok(SellResult::Rejected);
    }

    let gold: u64 = sell.iter().map(|f| f.sell_price).sum();
    ctx.fish_inventory = keep;
    ctx.fish_since_last_sell = 0;
    info!(count = sell.len(), gold, kept = ctx.fish_inventory.len(), "Fish sold");
    Ok(SellResult::Sold {
        count: sell.len(),
        gold,
    })
}
