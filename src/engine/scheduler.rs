//! Account scheduler: the per-account fishing loop.
//!
//! Each iteration walks CheckingEnergy → SelectingRange → RunningSession
//! → ApplyingOutcome and returns the `Wait` that precedes the next one.
//! `run_forever` performs the waits and never returns; errors and panics
//! inside an iteration are converted into backoff waits at the loop
//! boundary.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::economy::{check_daily_reward, record_catch, sell_due, sell_low_quality};
use crate::api::{GameApi, InventoryStatus};
use crate::config::{FishingConfig, RangeCosts, RangeStrategy};
use crate::session::{SessionRunner, SessionTransport};
use crate::types::{format_time_remaining, AccountContext, AnglerError, FishingRange, SessionOutcome};

/// Pause after the energy countdown so the server has refilled.
pub const ENERGY_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// How often the energy countdown is logged.
const COUNTDOWN_TICK: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Waits and backoff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    AfterCatch,
    Backoff,
    ApiUnavailable,
    InsufficientEnergy,
    IterationError,
}

/// What the loop does before the next iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait {
    Fixed { duration: Duration, reason: WaitReason },
    UntilEnergyRefresh(DateTime<Utc>),
}

impl Wait {
    pub fn fixed(duration: Duration, reason: WaitReason) -> Self {
        Wait::Fixed { duration, reason }
    }
}

/// Two-level backoff: `base` until the failure count exceeds
/// `max_retries`, `escalated` afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub escalated: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    /// Failed or missed sessions: the retry delay, tripled when escalated.
    pub fn for_sessions(cfg: &FishingConfig) -> Self {
        let base = cfg.retry_delay();
        Self {
            base,
            escalated: base * 3,
            max_retries: cfg.max_retries,
        }
    }

    /// Errors escaping an iteration.
    pub fn for_errors(cfg: &FishingConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.error_retry_delay_ms),
            escalated: Duration::from_millis(cfg.error_escalated_delay_ms),
            max_retries: cfg.max_retries,
        }
    }

    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures > self.max_retries {
            self.escalated
        } else {
            self.base
        }
    }
}

// ---------------------------------------------------------------------------
// Range selection
// ---------------------------------------------------------------------------

/// Pick a range affordable at `energy`.
///
/// When nothing is affordable this returns the cheapest range; callers
/// must check the cost before using it.
pub fn select_range<R: Rng>(
    energy: u32,
    costs: &RangeCosts,
    strategy: RangeStrategy,
    preferred: FishingRange,
    rng: &mut R,
) -> FishingRange {
    let affordable: Vec<FishingRange> = FishingRange::ALL
        .iter()
        .copied()
        .filter(|r| costs.cost(*r) <= energy)
        .collect();

    if affordable.is_empty() {
        return costs.cheapest();
    }
    if strategy == RangeStrategy::Preferred && affordable.contains(&preferred) {
        return preferred;
    }
    affordable[rng.random_range(0..affordable.len())]
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

pub struct AccountScheduler<A, T> {
    ctx: AccountContext,
    api: A,
    runner: SessionRunner<T>,
    rng: StdRng,
    last_range: Option<FishingRange>,
}

impl<A: GameApi, T: SessionTransport> AccountScheduler<A, T> {
    pub fn new(ctx: AccountContext, api: A, transport: T) -> Self {
        Self {
            ctx,
            api,
            runner: SessionRunner::new(transport),
            rng: StdRng::from_os_rng(),
            last_range: None,
        }
    }

    /// Replace the range-selection RNG (deterministic tests).
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn context(&self) -> &AccountContext {
        &self.ctx
    }

    /// Run until the process exits.
    pub async fn run_forever(mut self) {
        info!(account = %self.ctx.label, "Account scheduler starting");
        match self.api.inventory().await {
            Ok(status) => {
                self.absorb_inventory(&status);
                log_profile(&status);
            }
            Err(e) => {
                let delay = self.ctx.settings.fishing.retry_delay();
                warn!(
                    error = %format!("{e:#}"),
                    retry_in_secs = delay.as_secs(),
                    "Initial profile check failed"
                );
                sleep(delay).await;
            }
        }

        loop {
            let wait = self.iterate().await;
            self.wait(wait).await;
        }
    }

    /// One iteration with errors and panics folded into a backoff wait.
    pub async fn iterate(&mut self) -> Wait {
        let result = AssertUnwindSafe(self.run_iteration()).catch_unwind().await;
        match result {
            Ok(Ok(wait)) => wait,
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "Fishing iteration failed");
                self.register_failure(WaitReason::IterationError)
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %msg, "Fishing iteration panicked");
                self.register_failure(WaitReason::IterationError)
            }
        }
    }

    /// CheckingEnergy → SelectingRange → RunningSession → ApplyingOutcome.
    pub async fn run_iteration(&mut self) -> Result<Wait> {
        let now = Utc::now();

        // -- CheckingEnergy ----------------------------------------------
        let status = match self.api.inventory().await {
            Ok(status) => status,
            Err(e) => match e.downcast_ref::<AnglerError>() {
                // The service answered: no progress this cycle, plain retry.
                Some(api_err @ AnglerError::Api { .. }) => {
                    if api_err.is_service_unavailable() {
                        warn!("Game service temporarily unavailable");
                    }
                    warn!(error = %api_err, "Inventory check failed");
                    return Ok(Wait::fixed(
                        self.ctx.settings.fishing.retry_delay(),
                        WaitReason::ApiUnavailable,
                    ));
                }
                _ => return Err(e.context("Inventory check failed")),
            },
        };
        self.absorb_inventory(&status);
        debug!(
            energy = status.energy,
            gold = status.gold,
            fish_points = status.fish_point,
            "Inventory refreshed"
        );

        if let Err(e) = check_daily_reward(&self.api, &mut self.ctx, now).await {
            warn!(error = %format!("{e:#}"), "Daily reward check failed");
        }

        if self.ctx.energy == 0 {
            let period = self.ctx.settings.fishing.energy_refresh_period();
            let until = *self.ctx.energy_refresh_at.get_or_insert(now + period);
            return Ok(Wait::UntilEnergyRefresh(until));
        }

        // -- SelectingRange ----------------------------------------------
        let fishing = &self.ctx.settings.fishing;
        let range = select_range(
            self.ctx.energy,
            &fishing.range_costs,
            fishing.range_strategy,
            fishing.preferred_range,
            &mut self.rng,
        );
        let cost = fishing.range_costs.cost(range);
        if cost > self.ctx.energy {
            warn!(
                energy = self.ctx.energy,
                cheapest = %range,
                cost,
                "No fishing range affordable, skipping attempt"
            );
            return Ok(Wait::fixed(fishing.retry_delay(), WaitReason::InsufficientEnergy));
        }
        if self.last_range != Some(range) {
            info!(%range, cost, "Selected fishing range");
            self.last_range = Some(range);
        }

        // -- RunningSession ----------------------------------------------
        info!(%range, cost, energy = self.ctx.energy, "Starting fishing session");
        let outcome = self.runner.run(&self.ctx, range).await;

        // -- ApplyingOutcome ---------------------------------------------
        Ok(self.apply_outcome(outcome).await)
    }

    /// Fold a session outcome into the context and pick the next wait.
    pub async fn apply_outcome(&mut self, outcome: SessionOutcome) -> Wait {
        match outcome {
            SessionOutcome::Caught {
                fish,
                economy,
                exp,
                exp_to_next_level,
                exp_gain,
            } => {
                info!(
                    fish = %fish.name,
                    quality = fish.quality,
                    sell_price = fish.sell_price,
                    exp_gain,
                    "Fish caught"
                );
                info!(
                    energy = economy.remaining_energy,
                    gold = economy.gold,
                    fish_points = economy.fish_points,
                    exp,
                    exp_to_next_level = ?exp_to_next_level,
                    "Post-session state"
                );
                self.ctx.apply_snapshot(&economy);
                self.ctx.exp = exp;
                record_catch(&mut self.ctx, fish);
                self.ctx.retry_count = 0;

                if sell_due(&self.ctx) {
                    if let Err(e) = sell_low_quality(&self.api, &mut self.ctx).await {
                        warn!(error = %format!("{e:#}"), "Auto-sell failed");
                    }
                }

                let delay = self.ctx.settings.fishing.delay_between_fishing();
                info!(
                    total_caught = self.ctx.total_fish_caught,
                    next_in_secs = delay.as_secs(),
                    "Session complete"
                );
                Wait::fixed(delay, WaitReason::AfterCatch)
            }
            SessionOutcome::Missed { economy } => {
                warn!(
                    energy = economy.remaining_energy,
                    gold = economy.gold,
                    fish_points = economy.fish_points,
                    "Nothing caught"
                );
                self.ctx.apply_snapshot(&economy);
                self.register_failure(WaitReason::Backoff)
            }
            SessionOutcome::Failed { reason } => {
                warn!(%reason, "Fishing session failed");
                self.register_failure(WaitReason::Backoff)
            }
        }
    }

    /// Count a failure and compute its backoff.
    fn register_failure(&mut self, reason: WaitReason) -> Wait {
        self.ctx.retry_count = self.ctx.retry_count.saturating_add(1);
        let fishing = &self.ctx.settings.fishing;
        let policy = match reason {
            WaitReason::IterationError => BackoffPolicy::for_errors(fishing),
            _ => BackoffPolicy::for_sessions(fishing),
        };
        let delay = policy.delay_for(self.ctx.retry_count);
        warn!(
            retry = self.ctx.retry_count,
            max_retries = policy.max_retries,
            wait_secs = delay.as_secs(),
            "Backing off"
        );
        Wait::fixed(delay, reason)
    }

    fn absorb_inventory(&mut self, status: &InventoryStatus) {
        self.ctx.energy = status.energy;
        self.ctx.gold = status.gold;
        self.ctx.fish_points = status.fish_point;
        self.ctx.exp = status.exp;
        if self.ctx.energy > 0 {
            self.ctx.energy_refresh_at = None;
        }
    }

    /// Perform a wait returned by [`iterate`](Self::iterate).
    pub async fn wait(&mut self, wait: Wait) {
        match wait {
            Wait::Fixed { duration, reason } => {
                debug!(?reason, secs = duration.as_secs(), "Waiting");
                sleep(duration).await;
            }
            Wait::UntilEnergyRefresh(until) => self.await_energy(until).await,
        }
    }

    /// Count down to the energy refresh, then clear it.
    ///
    /// The wall-clock target is converted once into a runtime deadline.
    async fn await_energy(&mut self, until: DateTime<Utc>) {
        warn!(refresh_at = %until, "Out of energy, waiting for refresh");
        let remaining = (until - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + remaining;
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let left = deadline - now;
            let shown = chrono::Duration::from_std(left).unwrap_or_else(|_| chrono::Duration::zero());
            info!(remaining = %format_time_remaining(shown), "Energy refresh countdown");
            sleep_until(deadline.min(now + COUNTDOWN_TICK)).await;
        }
        self.ctx.energy_refresh_at = None;
        info!("Energy should be refreshed now");
        sleep(ENERGY_SETTLE_DELAY).await;
    }
}

/// Log the profile summary returned by the inventory endpoint.
pub fn log_profile(status: &InventoryStatus) {
    info!(
        user_id = status.user_id.as_deref().unwrap_or("N/A"),
        gold = status.gold,
        energy = status.energy,
        fish_points = status.fish_point,
        exp = status.exp,
        level = ?status.level,
        progress_pct = status.level_progress_pct().map(|p| format!("{p:.2}")).unwrap_or_default(),
        "Profile loaded"
    );
}
