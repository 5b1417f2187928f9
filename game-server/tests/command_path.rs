//! Command-router behaviour that is independent of any particular game
//! state: rate limiting, validation codes and snapshot consistency under a
//! command sequence.

mod support;

use hanafuda::ids::{GameId, PlayerId};
use protocol::ErrorCode;
use protocol::frames::Command;
use std::time::Duration;
use support::{build_app, card, frame, playable_game};

#[tokio::test(start_paused = true)]
async fn ping_is_acknowledged() {
    let app = build_app();
    let player = PlayerId::random();
    let response = app
        .session_service
        .dispatch(player, frame("c-1", Command::Ping))
        .await;
    assert!(response.success);
    assert_eq!(response.command_id, "c-1");
}

#[tokio::test(start_paused = true)]
async fn the_budget_runs_out_and_returns_after_the_window() {
    let app = build_app();
    let player = PlayerId::random();

    // The default budget is ten commands per second.
    for i in 0..10 {
        let response = app
            .session_service
            .dispatch(player, frame(&format!("c-{i}"), Command::Ping))
            .await;
        assert!(response.success, "command {i} should pass");
    }

    let response = app
        .session_service
        .dispatch(player, frame("c-over", Command::Ping))
        .await;
    assert!(!response.success);
    assert_eq!(response.code, Some(ErrorCode::RateLimitExceeded));
    assert_eq!(response.retry_after, Some(1));

    tokio::time::advance(Duration::from_millis(1_100)).await;
    let response = app
        .session_service
        .dispatch(player, frame("c-fresh", Command::Ping))
        .await;
    assert!(response.success);
}

#[tokio::test(start_paused = true)]
async fn unknown_game_and_foreign_player_are_rejected() {
    let app = build_app();
    let a = PlayerId::random();
    let b = PlayerId::random();
    let game = playable_game(&app, a, b);

    let response = app
        .session_service
        .dispatch(
            a,
            frame(
                "c-1",
                Command::PlayCard {
                    game_id: GameId::random(),
                    card_id: card("0301"),
                    target_card_id: None,
                },
            ),
        )
        .await;
    assert_eq!(response.code, Some(ErrorCode::GameNotFound));

    let outsider = PlayerId::random();
    let response = app
        .session_service
        .dispatch(
            outsider,
            frame(
                "c-2",
                Command::PlayCard {
                    game_id: game.id,
                    card_id: card("0301"),
                    target_card_id: None,
                },
            ),
        )
        .await;
    assert_eq!(response.code, Some(ErrorCode::WrongPlayer));

    // The waiting player cannot act out of turn.
    let response = app
        .session_service
        .dispatch(
            b,
            frame(
                "c-3",
                Command::PlayCard {
                    game_id: game.id,
                    card_id: card("0201"),
                    target_card_id: None,
                },
            ),
        )
        .await;
    assert_eq!(response.code, Some(ErrorCode::WrongPlayer));

    // A card the caller does not hold.
    let response = app
        .session_service
        .dispatch(
            a,
            frame(
                "c-4",
                Command::PlayCard {
                    game_id: game.id,
                    card_id: card("1101"),
                    target_card_id: None,
                },
            ),
        )
        .await;
    assert_eq!(response.code, Some(ErrorCode::InvalidCard));
}

#[tokio::test(start_paused = true)]
async fn successful_commands_linearize_into_one_snapshot_history() {
    let app = build_app();
    let a = PlayerId::random();
    let b = PlayerId::random();
    let game = playable_game(&app, a, b);

    // Alice plays, then Bob plays; each snapshot reflects exactly the
    // commands acknowledged so far.
    let response = app
        .session_service
        .dispatch(
            a,
            frame(
                "c-1",
                Command::PlayCard {
                    game_id: game.id,
                    card_id: card("0702"),
                    target_card_id: None,
                },
            ),
        )
        .await;
    assert!(response.success);
    let after_first = app.store.get(game.id).unwrap();
    assert_eq!(after_first.current_round.as_ref().unwrap().active_player, b);

    let response = app
        .session_service
        .dispatch(
            b,
            frame(
                "c-2",
                Command::PlayCard {
                    game_id: game.id,
                    card_id: card("0401"),
                    target_card_id: None,
                },
            ),
        )
        .await;
    assert!(response.success);
    let after_second = app.store.get(game.id).unwrap();
    let round = after_second.current_round.as_ref().unwrap();
    assert_eq!(round.active_player, a);

    // Card conservation holds across the whole exchange.
    assert_eq!(
        round.card_total(),
        game.current_round.as_ref().unwrap().card_total()
    );

    // The game log shows both turns in order.
    let log = app.repository.log_for(game.id);
    let turn_events: Vec<_> = log
        .iter()
        .filter(|e| e.event_type == "TURN_COMPLETED")
        .collect();
    assert_eq!(turn_events.len(), 4); // two turns, two recipients each
    assert!(turn_events.windows(2).all(|w| w[0].seq < w[1].seq));
}
