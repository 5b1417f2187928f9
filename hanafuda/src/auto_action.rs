//! Legal default actions for players who let their turn time out.
//!
//! The chooser is deliberately dumb: first playable hand card, first capture
//! candidate, stop the round. The timeout path and the computer opponent's
//! baseline both go through it, and whatever it picks is replayed through the
//! ordinary command pipeline.

use crate::cards::{self, CardId};
use crate::ids::PlayerId;
use crate::round::{Decision, FlowState, Round};

/// A synthesized command, mirroring the player-issued ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultAction {
    PlayCard {
        card: CardId,
        target: Option<CardId>,
    },
    SelectTarget {
        source_card: CardId,
        target: CardId,
    },
    MakeDecision {
        decision: Decision,
    },
}

/// The legal default for the given player in the current flow state, or
/// `None` when the round does not wait on that player.
pub fn choose(round: &Round, player: PlayerId) -> Option<DefaultAction> {
    if round.active_player != player {
        return None;
    }
    match round.flow_state {
        FlowState::AwaitingHandPlay => {
            let card = *round.seat(player).ok()?.hand.first()?;
            let candidates = cards::matchable_cards(card, &round.field);
            // A multi-match needs an explicit target or the play would just
            // pause for selection again.
            let target = if candidates.len() >= 2 {
                candidates.first().copied()
            } else {
                None
            };
            Some(DefaultAction::PlayCard { card, target })
        }
        FlowState::AwaitingSelection => {
            let pending = round.pending_selection.as_ref()?;
            Some(DefaultAction::SelectTarget {
                source_card: pending.source_card,
                target: *pending.candidates.first()?,
            })
        }
        FlowState::AwaitingDecision => Some(DefaultAction::MakeDecision {
            decision: Decision::EndRound,
        }),
        FlowState::RoundEnded => None,
    }
}
