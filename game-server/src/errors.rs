//! Mapping of internal failures onto the stable wire codes.

use hanafuda::RuleError;
use protocol::ErrorCode;
use thiserror::Error;

/// A command rejection carrying its wire code. Everything a command path
/// can fail with funnels into this before it reaches the response frame.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct CommandError {
    pub code: ErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        CommandError {
            code,
            message: message.into(),
        }
    }

    pub fn game_not_found() -> Self {
        Self::new(ErrorCode::GameNotFound, "no such game")
    }

    pub fn wrong_player() -> Self {
        Self::new(ErrorCode::WrongPlayer, "caller is not part of this game")
    }
}

impl From<RuleError> for CommandError {
    fn from(err: RuleError) -> Self {
        let code = match &err {
            RuleError::NotInGame(_) | RuleError::NotYourTurn(_) => ErrorCode::WrongPlayer,
            RuleError::UnexpectedFlowState { .. }
            | RuleError::InvalidStatus(_)
            | RuleError::NoActiveRound
            | RuleError::KoiKoiWithEmptyHand
            | RuleError::NoPendingConfirmation(_) => ErrorCode::InvalidState,
            RuleError::CardNotInHand(_) | RuleError::SelectionMismatch(_) => ErrorCode::InvalidCard,
            RuleError::InvalidTarget(_) => ErrorCode::InvalidTarget,
            RuleError::DeckExhausted | RuleError::WrongDeckSize { .. } => ErrorCode::UnknownError,
        };
        CommandError::new(code, err.to_string())
    }
}

impl From<crate::match_pool::PoolError> for CommandError {
    fn from(err: crate::match_pool::PoolError) -> Self {
        match err {
            crate::match_pool::PoolError::AlreadyInQueue => CommandError::new(
                ErrorCode::AlreadyInQueue,
                "player already has a matchmaking entry",
            ),
        }
    }
}
