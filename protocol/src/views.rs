//! Redacted per-player projections of the game state.
//!
//! Snapshots never cross the wire whole: the opponent's hand and the deck
//! shrink to counts before a view leaves the server. Where a piece of state
//! is visible to both players anyway (field, depositories, pendings,
//! settlement) the domain types are reused as-is.

use hanafuda::cards::CardId;
use hanafuda::game::{ConnectionStatus, Game, GameStatus};
use hanafuda::ids::{GameId, PlayerId};
use hanafuda::round::{
    FlowState, KoiKoiStatus, PendingDecision, Round, SelectionPhase, Settlement,
};
use hanafuda::ruleset::RoomType;
use serde::{Deserialize, Serialize};

/// The viewer's own seat, cards open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnSeatView {
    pub player_id: PlayerId,
    pub hand: Vec<CardId>,
    pub depository: Vec<CardId>,
    pub koikoi: KoiKoiStatus,
}

/// The other seat, hand reduced to a count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpponentSeatView {
    pub player_id: PlayerId,
    pub hand_count: u8,
    pub depository: Vec<CardId>,
    pub koikoi: KoiKoiStatus,
}

/// An open selection as the clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSelectionView {
    pub phase: SelectionPhase,
    pub source_card: CardId,
    pub candidates: Vec<CardId>,
}

/// One round from the given player's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundView {
    pub round_number: u8,
    pub dealer_id: PlayerId,
    pub active_player_id: PlayerId,
    pub flow_state: FlowState,
    pub field: Vec<CardId>,
    pub deck_count: u8,
    pub me: OwnSeatView,
    pub opponent: OpponentSeatView,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_selection: Option<PendingSelectionView>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_decision: Option<PendingDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

impl RoundView {
    /// Projects the round for one of its players. Panics never: an unknown
    /// viewer yields `None` so the caller can decide what to do.
    pub fn for_player(round: &Round, viewer: PlayerId) -> Option<RoundView> {
        let me = round.seat(viewer).ok()?;
        let opponent_id = round.opponent_of(viewer).ok()?;
        let opponent = round.seat(opponent_id).ok()?;
        Some(RoundView {
            round_number: round.round_number,
            dealer_id: round.dealer,
            active_player_id: round.active_player,
            flow_state: round.flow_state,
            field: round.field.clone(),
            deck_count: round.deck.len() as u8,
            me: OwnSeatView {
                player_id: me.player,
                hand: me.hand.clone(),
                depository: me.depository.clone(),
                koikoi: me.koikoi,
            },
            opponent: OpponentSeatView {
                player_id: opponent.player,
                hand_count: opponent.hand.len() as u8,
                depository: opponent.depository.clone(),
                koikoi: opponent.koikoi,
            },
            pending_selection: round.pending_selection.as_ref().map(|p| {
                PendingSelectionView {
                    phase: p.phase,
                    source_card: p.source_card,
                    candidates: p.candidates.clone(),
                }
            }),
            pending_decision: round.pending_decision.clone(),
            settlement: round.settlement.clone(),
        })
    }
}

/// One table seat in the game summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePlayerView {
    pub player_id: PlayerId,
    pub name: String,
    pub is_ai: bool,
    pub connection: ConnectionStatus,
    pub score: u32,
}

/// The whole game from one player's perspective, used for reconnect
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub game_id: GameId,
    pub room_type: RoomType,
    pub status: GameStatus,
    pub total_rounds: u8,
    pub rounds_played: u8,
    pub players: Vec<GamePlayerView>,
    pub pending_continue: Vec<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<RoundView>,
}

impl GameView {
    pub fn for_player(game: &Game, viewer: PlayerId) -> Option<GameView> {
        game.player(viewer).ok()?;
        Some(GameView {
            game_id: game.id,
            room_type: game.room_type,
            status: game.status,
            total_rounds: game.ruleset.total_rounds,
            rounds_played: game.rounds_played,
            players: game
                .players
                .iter()
                .map(|p| GamePlayerView {
                    player_id: p.id,
                    name: p.name.clone(),
                    is_ai: p.is_ai,
                    connection: p.connection,
                    score: p.score,
                })
                .collect(),
            pending_continue: game.pending_continue.clone(),
            round: game
                .current_round
                .as_ref()
                .and_then(|r| RoundView::for_player(r, viewer)),
        })
    }
}

/// Cumulative score of one player, listed on settlement events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub player_id: PlayerId,
    pub score: u32,
}

/// The score table of a game in seat order.
pub fn score_table(game: &Game) -> Vec<ScoreEntry> {
    game.players
        .iter()
        .map(|p| ScoreEntry {
            player_id: p.id,
            score: p.score,
        })
        .collect()
}
