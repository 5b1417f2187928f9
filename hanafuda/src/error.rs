//! The typed failures a domain operation can raise.

use crate::cards::CardId;
use crate::ids::PlayerId;
use crate::round::FlowState;
use thiserror::Error;

/// Rejections raised by the game and round operations. The server maps these
/// onto stable wire codes; nothing in here is transport-specific.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("player {0} is not part of this game")]
    NotInGame(PlayerId),
    #[error("it is not the turn of player {0}")]
    NotYourTurn(PlayerId),
    #[error("operation expects flow state {expected:?} but the round is in {actual:?}")]
    UnexpectedFlowState {
        expected: FlowState,
        actual: FlowState,
    },
    #[error("game status does not permit {0}")]
    InvalidStatus(&'static str),
    #[error("no round is active")]
    NoActiveRound,
    #[error("card {0} is not in hand")]
    CardNotInHand(CardId),
    #[error("card {0} is not the card awaiting selection")]
    SelectionMismatch(CardId),
    #[error("card {0} is not a valid capture target")]
    InvalidTarget(CardId),
    #[error("koi-koi cannot be declared with an empty hand")]
    KoiKoiWithEmptyHand,
    #[error("player {0} has no pending continue confirmation")]
    NoPendingConfirmation(PlayerId),
    #[error("the deck is exhausted")]
    DeckExhausted,
    #[error("a deal requires exactly {expected} cards, got {actual}")]
    WrongDeckSize { expected: usize, actual: usize },
}
