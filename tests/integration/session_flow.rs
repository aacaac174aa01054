//! Session runner against scripted connections, on a paused clock.

use std::time::Duration;
use tokio::time::Instant;

use angler::session::protocol::ClientCommand;
use angler::session::SessionRunner;
use angler::types::{FailureReason, FishingRange, SessionOutcome};

use crate::mock_service::*;

#[tokio::test(start_paused = true)]
async fn test_full_game_catches_and_submits_one_replay() {
    let transport = ScriptedTransport::new(vec![Script::serve(
        full_game(game_over_caught("f-1", 4, 8, 250)),
        Ending::Hang,
    )]);
    let runner = SessionRunner::new(transport.clone());
    let ctx = test_context();

    let outcome = runner.run(&ctx, FishingRange::Long).await;

    match outcome {
        SessionOutcome::Caught { fish, economy, exp, .. } => {
            assert_eq!(fish.id, "f-1");
            assert_eq!(fish.quality, 4);
            assert_eq!(economy.remaining_energy, 8);
            assert_eq!(economy.gold, 250);
            assert_eq!(exp, 120);
        }
        other => panic!("expected a catch, got {other:?}"),
    }

    let sent = transport.sent();
    assert_eq!(
        sent[0],
        ClientCommand::Prepare {
            range: FishingRange::Long,
            is_5x: false
        }
    );
    assert_eq!(sent[1], ClientCommand::Start);
    assert_eq!(end_count(&sent), 1);
    assert_eq!(sent.len(), 3);
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_replay_has_interpolated_points() {
    let transport = ScriptedTransport::new(vec![Script::serve(
        full_game(game_over_caught("f-1", 2, 5, 100)),
        Ending::Hang,
    )]);
    let runner = SessionRunner::new(transport.clone());

    runner.run(&test_context(), FishingRange::Short).await;

    let end = transport
        .sent()
        .into_iter()
        .find(|c| matches!(c, ClientCommand::End { .. }))
        .unwrap();
    let ClientCommand::End { rep, en } = end else {
        unreachable!()
    };
    assert_eq!(en, 1);
    assert_eq!(rep.fps, 20);
    // First key frame, then per gap 29 interpolated points and a key frame.
    assert_eq!(rep.frs.len(), 1 + 9 * 30);
}

#[tokio::test(start_paused = true)]
async fn test_server_failure_is_missed_not_failed() {
    let mut messages = vec![init_game(), game_state(0, 1)];
    messages.push(game_over_missed(7));
    let transport = ScriptedTransport::new(vec![Script::serve(messages, Ending::Hang)]);
    let runner = SessionRunner::new(transport.clone());

    let outcome = runner.run(&test_context(), FishingRange::Mid).await;

    match outcome {
        SessionOutcome::Missed { economy } => assert_eq!(economy.remaining_energy, 7),
        other => panic!("expected a miss, got {other:?}"),
    }
    assert_eq!(end_count(&transport.sent()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_silent_server_exhausts_reconnects() {
    let transport = ScriptedTransport::new(vec![
        Script::serve(vec![], Ending::Hang),
        Script::serve(vec![], Ending::Hang),
        Script::serve(vec![], Ending::Hang),
        Script::serve(vec![], Ending::Hang),
    ]);
    let runner = SessionRunner::new(transport.clone());
    let started = Instant::now();

    let outcome = runner.run(&test_context(), FishingRange::Mid).await;

    match outcome {
        SessionOutcome::Failed {
            reason: FailureReason::ReconnectsExhausted { attempts, .. },
        } => assert_eq!(attempts, 4),
        other => panic!("expected reconnects exhausted, got {other:?}"),
    }
    assert_eq!(transport.connects(), 4);
    assert_eq!(transport.closes(), 4);

    // Four 60s timeouts plus three 5s reconnect delays.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(255), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(256), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_close_before_start_reconnects() {
    let transport = ScriptedTransport::new(vec![
        Script::serve(vec![], Ending::Close),
        Script::serve(full_game(game_over_caught("f-2", 3, 4, 90)), Ending::Hang),
    ]);
    let runner = SessionRunner::new(transport.clone());

    let outcome = runner.run(&test_context(), FishingRange::Mid).await;

    assert!(outcome.is_caught());
    assert_eq!(transport.connects(), 2);
    // Each connection restarts the protocol from scratch.
    let prepares = transport
        .sent()
        .iter()
        .filter(|c| matches!(c, ClientCommand::Prepare { .. }))
        .count();
    assert_eq!(prepares, 2);
    assert_eq!(end_count(&transport.sent()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_refused_and_broken_connections_are_retried() {
    let transport = ScriptedTransport::new(vec![
        Script::RefuseConnect,
        Script::serve(vec![init_game()], Ending::Error),
        Script::serve(full_game(game_over_caught("f-3", 1, 2, 10)), Ending::Hang),
    ]);
    let runner = SessionRunner::new(transport.clone());

    let outcome = runner.run(&test_context(), FishingRange::Short).await;

    assert!(outcome.is_caught());
    assert_eq!(transport.connects(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_close_mid_game_is_connection_lost() {
    let messages = vec![init_game(), game_state(0, 1), game_state(1, -1), game_state(2, 1)];
    let transport = ScriptedTransport::new(vec![Script::serve(messages, Ending::Close)]);
    let runner = SessionRunner::new(transport.clone());

    let outcome = runner.run(&test_context(), FishingRange::Mid).await;

    assert_eq!(
        outcome,
        SessionOutcome::Failed {
            reason: FailureReason::ConnectionLost
        }
    );
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_unknown_messages_are_ignored() {
    let mut messages = vec![
        "not json at all".to_string(),
        r#"{"type":"chat","text":"hello"}"#.to_string(),
    ];
    messages.extend(full_game(game_over_caught("f-4", 5, 3, 60)));
    let transport = ScriptedTransport::new(vec![Script::serve(messages, Ending::Hang)]);
    let runner = SessionRunner::new(transport.clone());

    let outcome = runner.run(&test_context(), FishingRange::Long).await;

    assert!(outcome.is_caught());
    assert_eq!(end_count(&transport.sent()), 1);
}

#[tokio::test(start_paused = true)]
async fn test_extra_ticks_after_threshold_do_not_resend_end() {
    let mut messages = vec![init_game()];
    messages.extend((0..15).map(|f| game_state(f, 1)));
    messages.push(game_over_caught("f-5", 2, 1, 20));
    let transport = ScriptedTransport::new(vec![Script::serve(messages, Ending::Hang)]);
    let runner = SessionRunner::new(transport.clone());

    let outcome = runner.run(&test_context(), FishingRange::Short).await;

    assert!(outcome.is_caught());
    assert_eq!(end_count(&transport.sent()), 1);
}
