//! Account scheduler iterations against the mock service.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::time::Instant;

use angler::config::RangeStrategy;
use angler::engine::scheduler::{AccountScheduler, Wait, WaitReason, ENERGY_SETTLE_DELAY};
use angler::session::protocol::ClientCommand;
use angler::types::{AccountContext, FishingRange};

use crate::mock_service::*;

fn scheduler(
    ctx: AccountContext,
    game: &MockGame,
    transport: &ScriptedTransport,
) -> AccountScheduler<MockGame, ScriptedTransport> {
    AccountScheduler::new(ctx, game.clone(), transport.clone()).with_rng(StdRng::seed_from_u64(42))
}

fn catch_script(fish_id: &str, quality: u8, energy: u32) -> Script {
    Script::serve(full_game(game_over_caught(fish_id, quality, energy, 250)), Ending::Hang)
}

#[tokio::test(start_paused = true)]
async fn test_successful_iteration_updates_context() {
    let game = MockGame::with_energy(10);
    let transport = ScriptedTransport::new(vec![catch_script("f-1", 4, 8)]);
    let mut ctx = test_context();
    ctx.settings.fishing.range_strategy = RangeStrategy::Preferred;
    ctx.settings.fishing.preferred_range = FishingRange::Long;
    ctx.retry_count = 3;
    let mut sched = scheduler(ctx, &game, &transport);

    let wait = sched.iterate().await;

    assert_eq!(
        wait,
        Wait::fixed(Duration::from_millis(5_000), WaitReason::AfterCatch)
    );
    let ctx = sched.context();
    assert_eq!(ctx.energy, 8);
    assert_eq!(ctx.gold, 250);
    assert_eq!(ctx.fish_points, 30);
    assert_eq!(ctx.exp, 120);
    assert_eq!(ctx.retry_count, 0);
    assert_eq!(ctx.total_fish_caught, 1);
    assert_eq!(ctx.fish_inventory.len(), 1);
    assert_eq!(
        transport.sent()[0],
        ClientCommand::Prepare {
            range: FishingRange::Long,
            is_5x: false
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_random_strategy_only_picks_affordable_ranges() {
    let game = MockGame::with_energy(2);
    let transport = ScriptedTransport::default();
    for i in 0..20 {
        transport.push(catch_script(&format!("f-{i}"), 1, 2));
    }
    let mut sched = scheduler(test_context(), &game, &transport);

    for _ in 0..20 {
        sched.iterate().await;
    }

    // Default costs: short 1, mid 2, long 3.
    for command in transport.sent() {
        if let ClientCommand::Prepare { range, .. } = command {
            assert_ne!(range, FishingRange::Long);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_energy_waits_for_a_stable_refresh_time() {
    let game = MockGame::with_energy(0);
    let transport = ScriptedTransport::default();
    let mut sched = scheduler(test_context(), &game, &transport);

    let first = sched.iterate().await;
    let second = sched.iterate().await;

    let Wait::UntilEnergyRefresh(until) = first else {
        panic!("expected an energy wait, got {first:?}");
    };
    assert_eq!(second, Wait::UntilEnergyRefresh(until));
    assert_eq!(sched.context().energy_refresh_at, Some(until));
    assert_eq!(transport.connects(), 0);

    // Energy back: the refresh time is dropped.
    game.set_energy(5);
    transport.push(catch_script("f-9", 2, 3));
    sched.iterate().await;
    assert_eq!(sched.context().energy_refresh_at, None);
}

#[tokio::test(start_paused = true)]
async fn test_unaffordable_energy_skips_session() {
    let game = MockGame::with_energy(1);
    let transport = ScriptedTransport::default();
    let mut ctx = test_context();
    ctx.settings.fishing.range_costs.short_range = 2;
    let mut sched = scheduler(ctx, &game, &transport);

    let wait = sched.iterate().await;

    assert_eq!(
        wait,
        Wait::fixed(Duration::from_millis(30_000), WaitReason::InsufficientEnergy)
    );
    assert_eq!(transport.connects(), 0);
    assert_eq!(sched.context().energy_refresh_at, None);
}

#[tokio::test(start_paused = true)]
async fn test_api_unavailable_waits_retry_delay() {
    let game = MockGame::with_energy(10);
    game.fail_inventory(503);
    let transport = ScriptedTransport::default();
    let mut sched = scheduler(test_context(), &game, &transport);

    let wait = sched.iterate().await;

    assert_eq!(
        wait,
        Wait::fixed(Duration::from_millis(30_000), WaitReason::ApiUnavailable)
    );
    assert_eq!(sched.context().retry_count, 0);
    assert_eq!(transport.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_misses_escalate_backoff() {
    let game = MockGame::with_energy(10);
    let transport = ScriptedTransport::default();
    for _ in 0..3 {
        transport.push(Script::serve(
            vec![init_game(), game_over_missed(9)],
            Ending::Hang,
        ));
    }
    let mut ctx = test_context();
    ctx.settings.fishing.retry_delay_ms = 1_000;
    ctx.settings.fishing.max_retries = 2;
    let mut sched = scheduler(ctx, &game, &transport);

    let mut delays = Vec::new();
    for _ in 0..3 {
        match sched.iterate().await {
            Wait::Fixed { duration, reason } => {
                assert_eq!(reason, WaitReason::Backoff);
                delays.push(duration.as_secs());
            }
            other => panic!("unexpected wait {other:?}"),
        }
    }

    assert_eq!(delays, vec![1, 1, 3]);
    assert_eq!(sched.context().retry_count, 3);
    assert_eq!(sched.context().energy, 9);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_iteration_becomes_error_backoff() {
    let game = MockGame::with_energy(10);
    game.panic_on_inventory();
    let transport = ScriptedTransport::default();
    let mut sched = scheduler(test_context(), &game, &transport);

    let wait = sched.iterate().await;

    assert_eq!(
        wait,
        Wait::fixed(Duration::from_millis(10_000), WaitReason::IterationError)
    );
    assert_eq!(sched.context().retry_count, 1);
    assert_eq!(game.inventory_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auto_sell_runs_at_interval() {
    let game = MockGame::with_energy(10);
    let transport = ScriptedTransport::new(vec![
        catch_script("low-1", 1, 9),
        catch_script("keep-1", 5, 8),
        catch_script("low-2", 2, 7),
    ]);
    let mut ctx = test_context();
    ctx.settings.economy.sell_fish_interval = 3;
    ctx.settings.economy.min_fish_quality_to_keep = 3;
    let mut sched = scheduler(ctx, &game, &transport);

    sched.iterate().await;
    sched.iterate().await;
    assert!(game.sales().is_empty());

    sched.iterate().await;

    assert_eq!(game.sales(), vec![vec!["low-1".to_string(), "low-2".to_string()]]);
    let ctx = sched.context();
    assert_eq!(ctx.fish_since_last_sell, 0);
    assert_eq!(ctx.fish_inventory.len(), 1);
    assert_eq!(ctx.fish_inventory[0].id, "keep-1");
    assert_eq!(ctx.total_fish_caught, 3);
}

#[tokio::test(start_paused = true)]
async fn test_daily_reward_claimed_once() {
    let game = MockGame::with_energy(10);
    game.offer_daily_reward();
    let transport = ScriptedTransport::new(vec![
        catch_script("f-1", 2, 9),
        catch_script("f-2", 2, 8),
    ]);
    let mut sched = scheduler(test_context(), &game, &transport);

    sched.iterate().await;
    game.offer_daily_reward();
    sched.iterate().await;

    assert_eq!(game.claims(), 1);
    assert!(sched.context().daily_reward_claimed);
}

#[tokio::test(start_paused = true)]
async fn test_energy_wait_runs_to_refresh_then_clears() {
    let game = MockGame::with_energy(0);
    let transport = ScriptedTransport::default();
    let mut ctx = test_context();
    ctx.settings.fishing.energy_refresh_hours = 1;
    let mut sched = scheduler(ctx, &game, &transport);

    let wait = sched.iterate().await;
    assert!(matches!(wait, Wait::UntilEnergyRefresh(_)));
    assert!(sched.context().energy_refresh_at.is_some());

    let started = Instant::now();
    sched.wait(wait).await;
    let elapsed = started.elapsed();

    let period = Duration::from_secs(3600);
    assert!(elapsed > period - Duration::from_secs(1) + ENERGY_SETTLE_DELAY, "elapsed {elapsed:?}");
    assert!(elapsed <= period + ENERGY_SETTLE_DELAY, "elapsed {elapsed:?}");
    assert_eq!(sched.context().energy_refresh_at, None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_startup_probe_waits_retry_delay() {
    // Still inside the 30s retry delay: only the probe has run.
    let game = MockGame::with_energy(10);
    game.fail_inventory(503);
    let sched = scheduler(test_context(), &game, &ScriptedTransport::default());
    let _ = tokio::time::timeout(Duration::from_secs(29), sched.run_forever()).await;
    assert_eq!(game.inventory_calls(), 1);

    // Past it: the first iteration has checked the inventory again.
    let game = MockGame::with_energy(10);
    game.fail_inventory(503);
    let sched = scheduler(test_context(), &game, &ScriptedTransport::default());
    let _ = tokio::time::timeout(Duration::from_secs(31), sched.run_forever()).await;
    assert_eq!(game.inventory_calls(), 2);
}
