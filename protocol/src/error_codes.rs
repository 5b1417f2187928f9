//! Stable error codes returned on command responses. Clients key their
//! error handling off these, so the wire names never change.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Command budget exhausted; the response carries a retry-after.
    RateLimitExceeded,
    /// Unrecognised or malformed command frame.
    UnknownCommand,
    GameNotFound,
    /// Caller is not in the game or not the active player.
    WrongPlayer,
    /// The round is not in the flow state the command expects.
    InvalidState,
    /// Card id not in the caller's hand.
    InvalidCard,
    /// Target not in the candidate list.
    InvalidTarget,
    /// Player already has a matchmaking entry.
    AlreadyInQueue,
    /// Player already has an unfinished game.
    AlreadyInGame,
    InvalidRoomType,
    PlayerNotFound,
    /// Matchmaking failed for an unexpected reason; retrying is fine.
    MatchmakingError,
    UnknownError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
            ErrorCode::GameNotFound => "GAME_NOT_FOUND",
            ErrorCode::WrongPlayer => "WRONG_PLAYER",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidCard => "INVALID_CARD",
            ErrorCode::InvalidTarget => "INVALID_TARGET",
            ErrorCode::AlreadyInQueue => "ALREADY_IN_QUEUE",
            ErrorCode::AlreadyInGame => "ALREADY_IN_GAME",
            ErrorCode::InvalidRoomType => "INVALID_ROOM_TYPE",
            ErrorCode::PlayerNotFound => "PLAYER_NOT_FOUND",
            ErrorCode::MatchmakingError => "MATCHMAKING_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_matches_display() {
        for code in [
            ErrorCode::RateLimitExceeded,
            ErrorCode::UnknownCommand,
            ErrorCode::GameNotFound,
            ErrorCode::WrongPlayer,
            ErrorCode::InvalidState,
            ErrorCode::InvalidCard,
            ErrorCode::InvalidTarget,
            ErrorCode::AlreadyInQueue,
            ErrorCode::AlreadyInGame,
            ErrorCode::InvalidRoomType,
            ErrorCode::PlayerNotFound,
            ErrorCode::MatchmakingError,
            ErrorCode::UnknownError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{code}\""));
        }
    }
}
