//! A single round of play and its turn flow state machine.
//!
//! The flow walks `AwaitingHandPlay → (AwaitingSelection) → (AwaitingDecision)
//! → AwaitingHandPlay` until a stop decision, exhausted hands or an instant
//! yaku settles the round. Operations take `&self` and return a fresh
//! snapshot plus a [`TurnReport`] describing what happened, so the caller can
//! map the step onto outbound events without diffing snapshots.
//!
//! Two pieces of state deliberately stay where they are while a selection is
//! open: a hand card awaiting target selection remains in the hand, and a
//! drawn card awaiting selection remains on top of the deck. Card
//! conservation therefore holds after every operation, not only between
//! turns.

use crate::cards::{self, CardId};
use crate::error::RuleError;
use crate::ids::PlayerId;
use crate::ruleset::Ruleset;
use crate::yaku::{self, YakuScore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the turn currently waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    AwaitingHandPlay,
    AwaitingSelection,
    AwaitingDecision,
    RoundEnded,
}

/// Which card raised an open target selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionPhase {
    HandCard,
    DrawnCard,
}

/// Koi-koi bookkeeping per seat. The multiplier starts at one and goes up by
/// one for every continue call of that seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KoiKoiStatus {
    pub multiplier: u32,
    pub times_continued: u32,
}

impl Default for KoiKoiStatus {
    fn default() -> Self {
        KoiKoiStatus {
            multiplier: 1,
            times_continued: 0,
        }
    }
}

/// One player's cards within the round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub player: PlayerId,
    pub hand: Vec<CardId>,
    pub depository: Vec<CardId>,
    pub koikoi: KoiKoiStatus,
}

/// A resolved half-turn: one card leaving the hand or the deck, with the
/// field cards it captured. An empty capture list means the card was placed
/// on the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub source: StepSource,
    pub card: CardId,
    pub captured: Vec<CardId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepSource {
    Hand,
    Deck,
}

/// An open target selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSelection {
    pub phase: SelectionPhase,
    pub source_card: CardId,
    pub candidates: Vec<CardId>,
    /// The hand step that already resolved this turn, present when the
    /// selection belongs to the drawn card.
    pub preceding_hand_step: Option<StepReport>,
    /// Yaku active before this turn started; needed to detect newly formed
    /// yaku once the split turn completes.
    pub yaku_before: Vec<YakuScore>,
}

/// An open koi-koi decision, carrying every yaku currently active for the
/// deciding player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecision {
    pub yaku: Vec<YakuScore>,
}

/// The stop-or-continue answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    KoiKoi,
    EndRound,
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndReason {
    /// A stop decision after a yaku.
    KoiKoiStop,
    /// Both hands played out without a winning stop.
    HandsExhausted,
    /// Four cards of one month dealt into a hand.
    Teshi,
    /// A hand dealt as four month-pairs.
    Kuttsuki,
    /// Four cards of one month dealt onto the field.
    FieldKuttsuki,
}

/// Fixed once the round is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub reason: EndReason,
    pub winner: Option<PlayerId>,
    pub yaku: Vec<YakuScore>,
    pub awarded_points: u32,
    pub ended_at: DateTime<Utc>,
    /// Seconds the settlement screen is held before the runtime advances.
    pub countdown_seconds: u32,
}

/// Ambient values the runtime passes into operations that may settle the
/// round, keeping the domain free of clocks and configuration.
#[derive(Debug, Clone, Copy)]
pub struct TurnContext {
    pub now: DateTime<Utc>,
    pub settlement_countdown_seconds: u32,
}

/// What the round waits for after an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextAction {
    HandPlay {
        player: PlayerId,
    },
    Selection {
        player: PlayerId,
        phase: SelectionPhase,
        source_card: CardId,
        candidates: Vec<CardId>,
    },
    Decision {
        player: PlayerId,
        yaku: Vec<YakuScore>,
    },
    RoundOver,
}

/// Everything one operation did, for event mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub actor: PlayerId,
    pub hand_step: Option<StepReport>,
    pub draw_step: Option<StepReport>,
    pub next: NextAction,
}

/// Immutable snapshot of a round in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub round_number: u8,
    pub dealer: PlayerId,
    pub active_player: PlayerId,
    pub flow_state: FlowState,
    pub field: Vec<CardId>,
    /// Face-down cards; the top of the deck is the first element.
    pub deck: Vec<CardId>,
    pub seats: [Seat; 2],
    pub pending_selection: Option<PendingSelection>,
    pub pending_decision: Option<PendingDecision>,
    pub settlement: Option<Settlement>,
}

const HAND_CARDS: usize = 8;
const FIELD_CARDS: usize = 8;

impl Round {
    /// Deals a fresh round from a pre-shuffled deck: eight cards to each
    /// hand, eight to the field, the rest face down. The dealer plays first.
    /// Instant yaku (when enabled) settle the round before anyone moves.
    pub fn deal(
        round_number: u8,
        dealer: PlayerId,
        opponent: PlayerId,
        mut deck: Vec<CardId>,
        ruleset: &Ruleset,
        ctx: &TurnContext,
    ) -> Result<Round, RuleError> {
        let expected = ruleset.deck_size as usize;
        if deck.len() != expected {
            return Err(RuleError::WrongDeckSize {
                expected,
                actual: deck.len(),
            });
        }

        let dealer_hand: Vec<CardId> = deck.drain(..HAND_CARDS).collect();
        let opponent_hand: Vec<CardId> = deck.drain(..HAND_CARDS).collect();
        let field: Vec<CardId> = deck.drain(..FIELD_CARDS).collect();

        let mut round = Round {
            round_number,
            dealer,
            active_player: dealer,
            flow_state: FlowState::AwaitingHandPlay,
            field,
            deck,
            seats: [
                Seat {
                    player: dealer,
                    hand: dealer_hand,
                    depository: Vec::new(),
                    koikoi: KoiKoiStatus::default(),
                },
                Seat {
                    player: opponent,
                    hand: opponent_hand,
                    depository: Vec::new(),
                    koikoi: KoiKoiStatus::default(),
                },
            ],
            pending_selection: None,
            pending_decision: None,
            settlement: None,
        };

        if ruleset.instant_end_enabled {
            round.apply_instant_end(ctx);
        }
        Ok(round)
    }

    /// Checks the dealt hands and field for the instant-end yaku and settles
    /// the round if one is present. Dealer's hand is examined first.
    fn apply_instant_end(&mut self, ctx: &TurnContext) {
        for seat_index in [0, 1] {
            let seat = &self.seats[seat_index];
            if let Some(reason) = hand_instant_yaku(&seat.hand) {
                let kind = match reason {
                    EndReason::Teshi => yaku::YakuKind::Teshi,
                    _ => yaku::YakuKind::Kuttsuki,
                };
                let winner = seat.player;
                self.settle(
                    Settlement {
                        reason,
                        winner: Some(winner),
                        yaku: vec![YakuScore {
                            kind,
                            points: yaku::INSTANT_YAKU_POINTS,
                        }],
                        awarded_points: yaku::INSTANT_YAKU_POINTS,
                        ended_at: ctx.now,
                        countdown_seconds: ctx.settlement_countdown_seconds,
                    },
                );
                return;
            }
        }
        if field_has_kuttsuki(&self.field) {
            // A dead field is nobody's merit; the round is void.
            self.settle(Settlement {
                reason: EndReason::FieldKuttsuki,
                winner: None,
                yaku: Vec::new(),
                awarded_points: 0,
                ended_at: ctx.now,
                countdown_seconds: ctx.settlement_countdown_seconds,
            });
        }
    }

    pub fn seat(&self, player: PlayerId) -> Result<&Seat, RuleError> {
        self.seats
            .iter()
            .find(|s| s.player == player)
            .ok_or(RuleError::NotInGame(player))
    }

    fn seat_mut(&mut self, player: PlayerId) -> Result<&mut Seat, RuleError> {
        self.seats
            .iter_mut()
            .find(|s| s.player == player)
            .ok_or(RuleError::NotInGame(player))
    }

    pub fn opponent_of(&self, player: PlayerId) -> Result<PlayerId, RuleError> {
        self.seat(player)?;
        Ok(self
            .seats
            .iter()
            .map(|s| s.player)
            .find(|p| *p != player)
            .expect("a round always has two seats"))
    }

    /// Total number of cards across field, deck, hands and depositories.
    /// Must equal the deck size after every operation.
    pub fn card_total(&self) -> usize {
        self.field.len()
            + self.deck.len()
            + self
                .seats
                .iter()
                .map(|s| s.hand.len() + s.depository.len())
                .sum::<usize>()
    }

    fn expect_flow(&self, expected: FlowState) -> Result<(), RuleError> {
        if self.flow_state != expected {
            return Err(RuleError::UnexpectedFlowState {
                expected,
                actual: self.flow_state,
            });
        }
        Ok(())
    }

    fn expect_active(&self, player: PlayerId) -> Result<(), RuleError> {
        self.seat(player)?;
        if self.active_player != player {
            return Err(RuleError::NotYourTurn(player));
        }
        Ok(())
    }

    /// Plays a card from the active player's hand.
    ///
    /// With zero field matches the card is placed on the field, with one it
    /// captures, and with two or more the turn pauses for target selection
    /// unless a valid `target` came with the command. When the hand step
    /// resolves in-place the draw step runs in the same operation.
    pub fn play_hand_card(
        &self,
        player: PlayerId,
        card: CardId,
        target: Option<CardId>,
        ruleset: &Ruleset,
        ctx: &TurnContext,
    ) -> Result<(Round, TurnReport), RuleError> {
        self.expect_flow(FlowState::AwaitingHandPlay)?;
        self.expect_active(player)?;

        let mut next = self.clone();
        let yaku_before = yaku::recognize(&self.seat(player)?.depository, ruleset);

        if !next.seat(player)?.hand.contains(&card) {
            return Err(RuleError::CardNotInHand(card));
        }

        let candidates = cards::matchable_cards(card, &next.field);
        let hand_step = match candidates.len() {
            0 => {
                let seat = next.seat_mut(player)?;
                seat.hand.retain(|c| *c != card);
                next.field.push(card);
                StepReport {
                    source: StepSource::Hand,
                    card,
                    captured: Vec::new(),
                }
            }
            1 => next.capture_from_hand(player, card, candidates[0])?,
            _ => match target {
                Some(chosen) => {
                    if !candidates.contains(&chosen) {
                        return Err(RuleError::InvalidTarget(chosen));
                    }
                    next.capture_from_hand(player, card, chosen)?
                }
                None => {
                    // The card stays in the hand until the selection lands.
                    next.flow_state = FlowState::AwaitingSelection;
                    next.pending_selection = Some(PendingSelection {
                        phase: SelectionPhase::HandCard,
                        source_card: card,
                        candidates: candidates.clone(),
                        preceding_hand_step: None,
                        yaku_before,
                    });
                    let report = TurnReport {
                        actor: player,
                        hand_step: None,
                        draw_step: None,
                        next: NextAction::Selection {
                            player,
                            phase: SelectionPhase::HandCard,
                            source_card: card,
                            candidates,
                        },
                    };
                    return Ok((next, report));
                }
            },
        };

        next.run_draw_step(player, Some(hand_step), yaku_before, ruleset, ctx)
    }

    /// Resolves an open target selection.
    pub fn select_target(
        &self,
        player: PlayerId,
        source_card: CardId,
        target: CardId,
        ruleset: &Ruleset,
        ctx: &TurnContext,
    ) -> Result<(Round, TurnReport), RuleError> {
        self.expect_flow(FlowState::AwaitingSelection)?;
        self.expect_active(player)?;

        let pending = self
            .pending_selection
            .clone()
            .expect("AwaitingSelection always carries a pending selection");
        if pending.source_card != source_card {
            return Err(RuleError::SelectionMismatch(source_card));
        }
        if !pending.candidates.contains(&target) {
            return Err(RuleError::InvalidTarget(target));
        }

        let mut next = self.clone();
        next.pending_selection = None;
        next.flow_state = FlowState::AwaitingHandPlay;

        match pending.phase {
            SelectionPhase::HandCard => {
                let hand_step = next.capture_from_hand(player, source_card, target)?;
                next.run_draw_step(player, Some(hand_step), pending.yaku_before, ruleset, ctx)
            }
            SelectionPhase::DrawnCard => {
                let drawn = next.pop_deck()?;
                debug_assert_eq!(drawn, source_card);
                let draw_step = next.capture_onto(player, drawn, target)?;
                next.finish_turn(
                    player,
                    pending.preceding_hand_step,
                    Some(draw_step),
                    pending.yaku_before,
                    ruleset,
                    ctx,
                )
            }
        }
    }

    /// Answers an open koi-koi decision.
    pub fn make_decision(
        &self,
        player: PlayerId,
        decision: Decision,
        ruleset: &Ruleset,
        ctx: &TurnContext,
    ) -> Result<(Round, TurnReport), RuleError> {
        self.expect_flow(FlowState::AwaitingDecision)?;
        self.expect_active(player)?;

        let pending = self
            .pending_decision
            .clone()
            .expect("AwaitingDecision always carries a pending decision");

        let mut next = self.clone();
        next.pending_decision = None;

        match decision {
            Decision::KoiKoi => {
                if next.seat(player)?.hand.is_empty() {
                    return Err(RuleError::KoiKoiWithEmptyHand);
                }
                let seat = next.seat_mut(player)?;
                seat.koikoi.times_continued += 1;
                seat.koikoi.multiplier += 1;
                // The turn stays with the caller.
                next.flow_state = FlowState::AwaitingHandPlay;
                let report = TurnReport {
                    actor: player,
                    hand_step: None,
                    draw_step: None,
                    next: NextAction::HandPlay { player },
                };
                Ok((next, report))
            }
            Decision::EndRound => {
                let winner_status = next.seat(player)?.koikoi;
                let opponent = next.opponent_of(player)?;
                let opponent_continued = next.seat(opponent)?.koikoi.times_continued > 0;
                let base = yaku::base_points(&pending.yaku);
                let mut awarded = base * winner_status.multiplier;
                if opponent_continued {
                    awarded *= 2;
                }
                next.settle(Settlement {
                    reason: EndReason::KoiKoiStop,
                    winner: Some(player),
                    yaku: pending.yaku,
                    awarded_points: awarded,
                    ended_at: ctx.now,
                    countdown_seconds: ctx.settlement_countdown_seconds,
                });
                let report = TurnReport {
                    actor: player,
                    hand_step: None,
                    draw_step: None,
                    next: NextAction::RoundOver,
                };
                Ok((next, report))
            }
        }
    }

    /// Moves `card` from the hand and `target` from the field into the
    /// player's depository.
    fn capture_from_hand(
        &mut self,
        player: PlayerId,
        card: CardId,
        target: CardId,
    ) -> Result<StepReport, RuleError> {
        let seat = self.seat_mut(player)?;
        seat.hand.retain(|c| *c != card);
        self.field.retain(|c| *c != target);
        let seat = self.seat_mut(player)?;
        seat.depository.push(card);
        seat.depository.push(target);
        Ok(StepReport {
            source: StepSource::Hand,
            card,
            captured: vec![target],
        })
    }

    /// Moves an already drawn card plus `target` from the field into the
    /// player's depository.
    fn capture_onto(
        &mut self,
        player: PlayerId,
        drawn: CardId,
        target: CardId,
    ) -> Result<StepReport, RuleError> {
        self.field.retain(|c| *c != target);
        let seat = self.seat_mut(player)?;
        seat.depository.push(drawn);
        seat.depository.push(target);
        Ok(StepReport {
            source: StepSource::Deck,
            card: drawn,
            captured: vec![target],
        })
    }

    fn pop_deck(&mut self) -> Result<CardId, RuleError> {
        if self.deck.is_empty() {
            return Err(RuleError::DeckExhausted);
        }
        Ok(self.deck.remove(0))
    }

    /// Draws the top deck card and resolves it, possibly raising a second
    /// selection; otherwise finishes the turn.
    fn run_draw_step(
        mut self,
        player: PlayerId,
        hand_step: Option<StepReport>,
        yaku_before: Vec<YakuScore>,
        ruleset: &Ruleset,
        ctx: &TurnContext,
    ) -> Result<(Round, TurnReport), RuleError> {
        let Some(&drawn) = self.deck.first() else {
            return Err(RuleError::DeckExhausted);
        };

        let candidates = cards::matchable_cards(drawn, &self.field);
        let draw_step = match candidates.len() {
            0 => {
                let card = self.pop_deck()?;
                self.field.push(card);
                StepReport {
                    source: StepSource::Deck,
                    card,
                    captured: Vec::new(),
                }
            }
            1 => {
                let card = self.pop_deck()?;
                self.capture_onto(player, card, candidates[0])?
            }
            _ => {
                // The drawn card stays on top of the deck until the
                // selection lands.
                self.flow_state = FlowState::AwaitingSelection;
                self.pending_selection = Some(PendingSelection {
                    phase: SelectionPhase::DrawnCard,
                    source_card: drawn,
                    candidates: candidates.clone(),
                    preceding_hand_step: hand_step.clone(),
                    yaku_before,
                });
                let report = TurnReport {
                    actor: player,
                    hand_step,
                    draw_step: None,
                    next: NextAction::Selection {
                        player,
                        phase: SelectionPhase::DrawnCard,
                        source_card: drawn,
                        candidates,
                    },
                };
                return Ok((self, report));
            }
        };

        self.finish_turn(player, hand_step, Some(draw_step), yaku_before, ruleset, ctx)
    }

    /// Ends the acting player's turn: either a koi-koi decision opens, the
    /// round settles because both hands ran dry, or play passes over.
    fn finish_turn(
        mut self,
        player: PlayerId,
        hand_step: Option<StepReport>,
        draw_step: Option<StepReport>,
        yaku_before: Vec<YakuScore>,
        ruleset: &Ruleset,
        ctx: &TurnContext,
    ) -> Result<(Round, TurnReport), RuleError> {
        let yaku_after = yaku::recognize(&self.seat(player)?.depository, ruleset);
        let fresh = yaku::newly_formed(&yaku_before, &yaku_after);

        if !fresh.is_empty() {
            self.flow_state = FlowState::AwaitingDecision;
            self.pending_decision = Some(PendingDecision {
                yaku: yaku_after.clone(),
            });
            let report = TurnReport {
                actor: player,
                hand_step,
                draw_step,
                next: NextAction::Decision {
                    player,
                    yaku: yaku_after,
                },
            };
            return Ok((self, report));
        }

        if self.seats.iter().all(|s| s.hand.is_empty()) {
            self.settle(Settlement {
                reason: EndReason::HandsExhausted,
                winner: None,
                yaku: Vec::new(),
                awarded_points: 0,
                ended_at: ctx.now,
                countdown_seconds: ctx.settlement_countdown_seconds,
            });
            let report = TurnReport {
                actor: player,
                hand_step,
                draw_step,
                next: NextAction::RoundOver,
            };
            return Ok((self, report));
        }

        let opponent = self.opponent_of(player)?;
        self.active_player = opponent;
        self.flow_state = FlowState::AwaitingHandPlay;
        let report = TurnReport {
            actor: player,
            hand_step,
            draw_step,
            next: NextAction::HandPlay { player: opponent },
        };
        Ok((self, report))
    }

    fn settle(&mut self, settlement: Settlement) {
        self.flow_state = FlowState::RoundEnded;
        self.pending_selection = None;
        self.pending_decision = None;
        self.settlement = Some(settlement);
    }

    /// The flow-state coherence invariant: the auxiliary field for a state
    /// is present exactly when the round is in that state.
    pub fn coherent(&self) -> bool {
        (self.pending_selection.is_some() == (self.flow_state == FlowState::AwaitingSelection))
            && (self.pending_decision.is_some() == (self.flow_state == FlowState::AwaitingDecision))
            && (self.settlement.is_some() == (self.flow_state == FlowState::RoundEnded))
    }
}

/// Teshi or kuttsuki in a dealt hand.
fn hand_instant_yaku(hand: &[CardId]) -> Option<EndReason> {
    let mut month_counts = [0u8; 13];
    for card in hand {
        month_counts[card.month() as usize] += 1;
    }
    if month_counts.iter().any(|&c| c == 4) {
        return Some(EndReason::Teshi);
    }
    if hand.len() == 8 && month_counts.iter().all(|&c| c == 0 || c == 2) {
        return Some(EndReason::Kuttsuki);
    }
    None
}

/// Four of one month dealt onto the field.
fn field_has_kuttsuki(field: &[CardId]) -> bool {
    let mut month_counts = [0u8; 13];
    for card in field {
        month_counts[card.month() as usize] += 1;
    }
    month_counts.iter().any(|&c| c == 4)
}
