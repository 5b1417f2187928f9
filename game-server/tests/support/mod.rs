//! Shared rigging for the integration suites: the fully wired in-memory
//! runtime plus deterministic game states to drive commands against.
#![allow(dead_code)]

use chrono::Utc;
use game_server::app::{self, App};
use game_server::config::Config;
use hanafuda::cards::CardId;
use hanafuda::game::{Game, GamePlayer, GameStatus};
use hanafuda::ids::{GameId, PlayerId};
use hanafuda::round::{FlowState, KoiKoiStatus, Round, Seat};
use hanafuda::ruleset::RoomType;
use protocol::frames::{Command, CommandFrame};
use std::sync::Arc;

pub fn build_app() -> Arc<App> {
    app::build(Config::default())
}

/// Lets spawned tasks (bus handlers, timer fires, forwarders) run.
pub async fn drain() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub fn frame(command_id: &str, command: Command) -> CommandFrame {
    CommandFrame {
        command_id: command_id.to_string(),
        command,
    }
}

pub fn card(code: &str) -> CardId {
    code.parse().expect("test card codes are valid")
}

/// A deterministic mid-game state: player `a` is active in
/// `AWAITING_HAND_PLAY`, no instant yaku anywhere, quiet field.
///
/// Hands: a = [0101, 0301, 0702], b = [0201, 0401].
/// Field: [0102, 0501, 0903]; deck: three paulownia chaff cards.
pub fn playable_game(app: &App, a: PlayerId, b: PlayerId) -> Arc<Game> {
    let round = Round {
        round_number: 1,
        dealer: a,
        active_player: a,
        flow_state: FlowState::AwaitingHandPlay,
        field: vec![card("0102"), card("0501"), card("0903")],
        deck: vec![card("1202"), card("1203"), card("1204")],
        seats: [
            Seat {
                player: a,
                hand: vec![card("0101"), card("0301"), card("0702")],
                depository: Vec::new(),
                koikoi: KoiKoiStatus::default(),
            },
            Seat {
                player: b,
                hand: vec![card("0201"), card("0401")],
                depository: Vec::new(),
                koikoi: KoiKoiStatus::default(),
            },
        ],
        pending_selection: None,
        pending_decision: None,
        settlement: None,
    };
    install_game(app, a, b, round)
}

/// Installs a crafted round as a running game in the store.
pub fn install_game(app: &App, a: PlayerId, b: PlayerId, round: Round) -> Arc<Game> {
    let now = Utc::now();
    let mut ruleset = RoomType::Quick.ruleset();
    ruleset.instant_end_enabled = false;
    let game = Game {
        id: GameId::random(),
        room_type: RoomType::Quick,
        ruleset,
        status: GameStatus::InProgress,
        players: vec![
            GamePlayer::new(a, "alice", false),
            GamePlayer::new(b, "bob", false),
        ],
        rounds_played: 0,
        current_round: Some(round),
        pending_continue: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    let game = Arc::new(game);
    app.store.put(game.clone());
    game
}
