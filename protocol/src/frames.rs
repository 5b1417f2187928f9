//! Inbound command frames and their responses.
//!
//! A frame is `{command_id, type, payload}`. The command id is an opaque
//! client-chosen string echoed back on the response, which is how a client
//! correlates acknowledgements with its own requests.

use crate::error_codes::ErrorCode;
use hanafuda::cards::CardId;
use hanafuda::ids::GameId;
use hanafuda::round::Decision;
use serde::{Deserialize, Serialize};

/// One inbound message from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    pub command_id: String,
    #[serde(flatten)]
    pub command: Command,
}

/// The command carried by a frame. The room type of `JOIN_MATCHMAKING`
/// stays a plain string here so an unknown value can be answered with
/// `INVALID_ROOM_TYPE` instead of failing frame parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Ping,
    JoinMatchmaking {
        room_type: String,
    },
    CancelMatchmaking,
    PlayCard {
        game_id: GameId,
        card_id: CardId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_card_id: Option<CardId>,
    },
    SelectTarget {
        game_id: GameId,
        source_card_id: CardId,
        target_card_id: CardId,
    },
    MakeDecision {
        game_id: GameId,
        decision: Decision,
    },
    ConfirmContinue {
        game_id: GameId,
        decision: ContinueDecision,
    },
    LeaveGame {
        game_id: GameId,
    },
}

impl Command {
    /// The game a command addresses, when it addresses one.
    pub fn game_id(&self) -> Option<GameId> {
        match self {
            Command::PlayCard { game_id, .. }
            | Command::SelectTarget { game_id, .. }
            | Command::MakeDecision { game_id, .. }
            | Command::ConfirmContinue { game_id, .. }
            | Command::LeaveGame { game_id } => Some(*game_id),
            _ => None,
        }
    }
}

/// Stay at the table or walk away after a settled round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContinueDecision {
    Continue,
    Leave,
}

/// Fallback parse for frames that failed to deserialize, recovering the
/// command id (and the claimed type) so the rejection can still be
/// correlated client-side.
#[derive(Debug, Deserialize)]
pub struct FrameProbe {
    #[serde(default)]
    pub command_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

/// The answer to exactly one command frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Seconds to wait before retrying, on `RATE_LIMIT_EXCEEDED` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl CommandResponse {
    pub fn ok(command_id: impl Into<String>) -> Self {
        CommandResponse {
            command_id: command_id.into(),
            success: true,
            code: None,
            message: None,
            retry_after: None,
        }
    }

    pub fn fail(
        command_id: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        CommandResponse {
            command_id: command_id.into(),
            success: false,
            code: Some(code),
            message: Some(message.into()),
            retry_after: None,
        }
    }

    pub fn rate_limited(command_id: impl Into<String>, retry_after: u64) -> Self {
        CommandResponse {
            command_id: command_id.into(),
            success: false,
            code: Some(ErrorCode::RateLimitExceeded),
            message: Some("command rate limit exceeded".to_string()),
            retry_after: Some(retry_after),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_play_card_frame() {
        let raw = r#"{
            "command_id": "c-17",
            "type": "PLAY_CARD",
            "payload": {"game_id": "7f6c2d0e-64ab-4a3c-9d3f-0a35ec1b2f11", "card_id": "0301"}
        }"#;
        let frame: CommandFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(frame.command_id, "c-17");
        match frame.command {
            Command::PlayCard {
                card_id,
                target_card_id,
                ..
            } => {
                assert_eq!(card_id.to_string(), "0301");
                assert_eq!(target_card_id, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ping_needs_no_payload() {
        let frame: CommandFrame =
            serde_json::from_str(r#"{"command_id": "c-1", "type": "PING"}"#).unwrap();
        assert_eq!(frame.command, Command::Ping);
    }

    #[test]
    fn unknown_room_type_still_parses() {
        let raw = r#"{
            "command_id": "c-2",
            "type": "JOIN_MATCHMAKING",
            "payload": {"room_type": "TURBO"}
        }"#;
        let frame: CommandFrame = serde_json::from_str(raw).unwrap();
        assert_eq!(
            frame.command,
            Command::JoinMatchmaking {
                room_type: "TURBO".to_string()
            }
        );
    }

    #[test]
    fn probe_recovers_the_command_id_from_garbage() {
        let raw = r#"{"command_id": "c-3", "type": "EXPLODE", "payload": 7}"#;
        assert!(serde_json::from_str::<CommandFrame>(raw).is_err());
        let probe: FrameProbe = serde_json::from_str(raw).unwrap();
        assert_eq!(probe.command_id.as_deref(), Some("c-3"));
        assert_eq!(probe.kind.as_deref(), Some("EXPLODE"));
    }

    #[test]
    fn responses_keep_the_wire_lean() {
        let ok = serde_json::to_value(CommandResponse::ok("c-4")).unwrap();
        assert_eq!(
            ok,
            serde_json::json!({"command_id": "c-4", "success": true})
        );

        let limited = serde_json::to_value(CommandResponse::rate_limited("c-5", 2)).unwrap();
        assert_eq!(limited["code"], "RATE_LIMIT_EXCEEDED");
        assert_eq!(limited["retry_after"], 2);
    }

    #[test]
    fn decision_uses_the_wire_names() {
        let raw = r#"{
            "command_id": "c-6",
            "type": "MAKE_DECISION",
            "payload": {"game_id": "7f6c2d0e-64ab-4a3c-9d3f-0a35ec1b2f11", "decision": "KOI_KOI"}
        }"#;
        let frame: CommandFrame = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            frame.command,
            Command::MakeDecision {
                decision: Decision::KoiKoi,
                ..
            }
        ));
    }
}
