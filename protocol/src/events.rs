//! Outbound gateway events.
//!
//! Every event leaves the server inside a [`GatewayEvent`] envelope with a
//! monotonically increasing id and an ISO-8601 timestamp. The body is tagged
//! with its domain; game events additionally carry the game id next to the
//! type tag.

use crate::error_codes::ErrorCode;
use crate::views::{GameView, RoundView, ScoreEntry};
use chrono::{DateTime, Utc};
use hanafuda::cards::CardId;
use hanafuda::ids::{GameId, PlayerId};
use hanafuda::round::{Decision, EndReason, SelectionPhase, StepReport};
use hanafuda::ruleset::RoomType;
use hanafuda::yaku::YakuScore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The envelope around every outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

/// Domain tag of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventBody {
    Matchmaking {
        #[serde(flatten)]
        event: MatchmakingEvent,
    },
    Game {
        game_id: GameId,
        #[serde(flatten)]
        event: GameEvent,
    },
}

impl EventBody {
    /// The game event inside, if this is a game-domain body.
    pub fn as_game(&self) -> Option<(&GameId, &GameEvent)> {
        match self {
            EventBody::Game { game_id, event } => Some((game_id, event)),
            EventBody::Matchmaking { .. } => None,
        }
    }
}

/// How a pairing came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    Human,
    Bot,
}

/// The lifecycle state of a matchmaking entry as shown to its player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Searching,
    LowAvailability,
    Matched,
    Cancelled,
    Expired,
}

/// Events of the matchmaking domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchmakingEvent {
    MatchmakingStatus {
        entry_id: Uuid,
        room_type: RoomType,
        status: EntryStatus,
    },
    MatchFound {
        room_type: RoomType,
        match_type: MatchType,
        opponent_id: PlayerId,
        opponent_name: String,
    },
    MatchmakingCancelled {
        entry_id: Uuid,
    },
}

/// Events of the game domain. Settlement events repeat the cumulative score
/// table so a client never needs to track it incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameEvent {
    RoundDealt {
        round_number: u8,
        view: RoundView,
    },
    TurnCompleted {
        actor_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hand_step: Option<StepReport>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draw_step: Option<StepReport>,
        next_player_id: PlayerId,
    },
    SelectionRequired {
        player_id: PlayerId,
        phase: SelectionPhase,
        source_card: CardId,
        candidates: Vec<CardId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hand_step: Option<StepReport>,
    },
    TurnProgressAfterSelection {
        actor_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hand_step: Option<StepReport>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draw_step: Option<StepReport>,
        next_player_id: PlayerId,
    },
    DecisionRequired {
        player_id: PlayerId,
        yaku: Vec<YakuScore>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hand_step: Option<StepReport>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        draw_step: Option<StepReport>,
    },
    DecisionMade {
        player_id: PlayerId,
        decision: Decision,
    },
    RoundScored {
        winner_id: PlayerId,
        yaku: Vec<YakuScore>,
        awarded_points: u32,
        scores: Vec<ScoreEntry>,
        countdown_seconds: u32,
    },
    RoundDrawn {
        reason: EndReason,
        scores: Vec<ScoreEntry>,
        countdown_seconds: u32,
    },
    RoundEndedInstantly {
        reason: EndReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_id: Option<PlayerId>,
        awarded_points: u32,
        scores: Vec<ScoreEntry>,
        countdown_seconds: u32,
    },
    GameFinished {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        winner_id: Option<PlayerId>,
        final_scores: Vec<ScoreEntry>,
    },
    TurnError {
        code: ErrorCode,
        message: String,
    },
    GameError {
        code: ErrorCode,
        message: String,
    },
    GameSnapshotRestore {
        view: GameView,
    },
}

impl GameEvent {
    /// Short name for logging and the game log table.
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::RoundDealt { .. } => "ROUND_DEALT",
            GameEvent::TurnCompleted { .. } => "TURN_COMPLETED",
            GameEvent::SelectionRequired { .. } => "SELECTION_REQUIRED",
            GameEvent::TurnProgressAfterSelection { .. } => "TURN_PROGRESS_AFTER_SELECTION",
            GameEvent::DecisionRequired { .. } => "DECISION_REQUIRED",
            GameEvent::DecisionMade { .. } => "DECISION_MADE",
            GameEvent::RoundScored { .. } => "ROUND_SCORED",
            GameEvent::RoundDrawn { .. } => "ROUND_DRAWN",
            GameEvent::RoundEndedInstantly { .. } => "ROUND_ENDED_INSTANTLY",
            GameEvent::GameFinished { .. } => "GAME_FINISHED",
            GameEvent::TurnError { .. } => "TURN_ERROR",
            GameEvent::GameError { .. } => "GAME_ERROR",
            GameEvent::GameSnapshotRestore { .. } => "GAME_SNAPSHOT_RESTORE",
        }
    }
}
