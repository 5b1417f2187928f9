//! End-to-end matchmaking: immediate human pairing and the timed fallback
//! to the computer opponent, driven through the command router against the
//! fully wired runtime.

mod support;

use game_server::flow_timer::TimeoutKind;
use game_server::identity::PlayerDirectory;
use hanafuda::game::GameStatus;
use hanafuda::ids::PlayerId;
use protocol::ErrorCode;
use protocol::events::{EntryStatus, EventBody, GameEvent, MatchType, MatchmakingEvent};
use protocol::frames::Command;
use std::time::Duration;
use support::{build_app, drain, frame};

fn join(room: &str) -> Command {
    Command::JoinMatchmaking {
        room_type: room.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn two_quick_joins_match_immediately() {
    let app = build_app();
    let alice = app.players.register_guest("alice").await;
    let bob = app.players.register_guest("bob").await;
    let mut events_a = app.outbound.subscribe(alice.id);
    let mut events_b = app.outbound.subscribe(bob.id);

    let response = app
        .session_service
        .dispatch(alice.id, frame("c-1", join("QUICK")))
        .await;
    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("SEARCHING"));

    let response = app
        .session_service
        .dispatch(bob.id, frame("c-2", join("QUICK")))
        .await;
    assert!(response.success);
    assert_eq!(response.message.as_deref(), Some("MATCHED_HUMAN"));

    // The pool is empty and the entry timers are gone.
    assert!(app.pool.is_empty());
    assert_eq!(app.registry.timer_count(), 0);

    // Both players heard about each other.
    for (rx, expected_opponent) in [(&mut events_a, bob.id), (&mut events_b, alice.id)] {
        let event = rx.try_recv().expect("match-found event expected");
        match event.body {
            EventBody::Matchmaking {
                event:
                    MatchmakingEvent::MatchFound {
                        opponent_id,
                        match_type,
                        ..
                    },
            } => {
                assert_eq!(opponent_id, expected_opponent);
                assert_eq!(match_type, MatchType::Human);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // The game-creation handler ran on its own task.
    drain().await;
    let game = app
        .store
        .find_active_for_player(alice.id)
        .expect("a game exists");
    assert_eq!(game.status, GameStatus::Starting);
    assert!(game.has_player(bob.id));
    assert_eq!(app.timers.armed_kind(game.id), Some(TimeoutKind::StartGrace));

    // After the start grace the first round is dealt to both players.
    tokio::time::advance(Duration::from_millis(600)).await;
    drain().await;
    let game = app.store.get(game.id).unwrap();
    assert_eq!(game.status, GameStatus::InProgress);
    assert!(game.current_round.is_some());
    for rx in [&mut events_a, &mut events_b] {
        let event = rx.try_recv().expect("round-dealt event expected");
        match event.body {
            EventBody::Game { event, .. } => {
                assert!(matches!(event, GameEvent::RoundDealt { .. }))
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn lonely_marathon_join_falls_back_to_the_bot() {
    let app = build_app();
    let alice = app.players.register_guest("alice").await;
    let mut events = app.outbound.subscribe(alice.id);

    let response = app
        .session_service
        .dispatch(alice.id, frame("c-1", join("MARATHON")))
        .await;
    assert!(response.success);

    // Ten seconds in: the low-availability notice.
    tokio::time::advance(Duration::from_secs(11)).await;
    drain().await;
    let event = events.try_recv().expect("status event expected");
    match event.body {
        EventBody::Matchmaking {
            event: MatchmakingEvent::MatchmakingStatus { status, .. },
        } => assert_eq!(status, EntryStatus::LowAvailability),
        other => panic!("unexpected event {other:?}"),
    }

    // Fifteen seconds in: the computer steps in and the entry is gone.
    tokio::time::advance(Duration::from_secs(5)).await;
    drain().await;
    assert!(app.pool.is_empty());
    let event = events.try_recv().expect("match-found event expected");
    match event.body {
        EventBody::Matchmaking {
            event:
                MatchmakingEvent::MatchFound {
                    opponent_id,
                    opponent_name,
                    match_type,
                    ..
                },
        } => {
            assert_eq!(match_type, MatchType::Bot);
            assert_eq!(opponent_id, PlayerId::BOT);
            assert_eq!(opponent_name, "Computer");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let game = app
        .store
        .find_active_for_player(alice.id)
        .expect("a bot game exists");
    assert!(game.players.iter().any(|p| p.is_ai));
    assert_eq!(app.ai.playing_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn a_bot_game_runs_to_completion_on_timers_alone() {
    let app = build_app();
    let alice = app.players.register_guest("alice").await;

    app.session_service
        .dispatch(alice.id, frame("c-1", join("QUICK")))
        .await;

    // Nobody joins: the computer steps in, the game starts, and from here
    // on every move is made by the action timeout (for the idle human) or
    // by the computer opponent. The idle limit guarantees termination.
    let mut finished = false;
    for _ in 0..120 {
        tokio::time::advance(Duration::from_secs(31)).await;
        drain().await;
        let stats = app.stats.get(alice.id);
        if stats.wins + stats.losses + stats.draws > 0 {
            finished = true;
            break;
        }
    }
    assert!(finished, "the bot game never reached a terminal state");
    assert_eq!(app.ai.playing_count(), 0);

    // Exactly one game outcome was recorded for the human.
    let stats = app.stats.get(alice.id);
    assert_eq!(stats.wins + stats.losses + stats.draws, 1);
}

#[tokio::test(start_paused = true)]
async fn double_join_and_unknown_room_are_rejected() {
    let app = build_app();
    let alice = app.players.register_guest("alice").await;

    let response = app
        .session_service
        .dispatch(alice.id, frame("c-1", join("TURBO")))
        .await;
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::InvalidRoomType));

    let response = app
        .session_service
        .dispatch(alice.id, frame("c-2", join("QUICK")))
        .await;
    assert!(response.success);

    let response = app
        .session_service
        .dispatch(alice.id, frame("c-3", join("STANDARD")))
        .await;
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::AlreadyInQueue));
}

#[tokio::test(start_paused = true)]
async fn cancel_withdraws_the_entry_before_the_bot_arrives() {
    let app = build_app();
    let alice = app.players.register_guest("alice").await;
    let mut events = app.outbound.subscribe(alice.id);

    app.session_service
        .dispatch(alice.id, frame("c-1", join("QUICK")))
        .await;
    let response = app
        .session_service
        .dispatch(alice.id, frame("c-2", Command::CancelMatchmaking))
        .await;
    assert!(response.success);

    assert!(app.pool.is_empty());
    assert!(matches!(
        events.try_recv().unwrap().body,
        EventBody::Matchmaking {
            event: MatchmakingEvent::MatchmakingCancelled { .. }
        }
    ));

    // Well past the fallback mark nothing further happens.
    tokio::time::advance(Duration::from_secs(30)).await;
    drain().await;
    assert!(app.store.find_active_for_player(alice.id).is_none());
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn an_unfinished_game_blocks_rejoining_the_queue() {
    let app = build_app();
    let alice = app.players.register_guest("alice").await;
    let bob = app.players.register_guest("bob").await;

    app.session_service
        .dispatch(alice.id, frame("c-1", join("QUICK")))
        .await;
    app.session_service
        .dispatch(bob.id, frame("c-2", join("QUICK")))
        .await;
    drain().await;

    let response = app
        .session_service
        .dispatch(alice.id, frame("c-3", join("QUICK")))
        .await;
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::AlreadyInGame));
}
