//! Builds outbound gateway events from domain results.
//!
//! Most events are identical for both players and are simply broadcast; the
//! two carrying full state (`RoundDealt`, `GameSnapshotRestore`) are built
//! per player from the redacted views.

use hanafuda::game::Game;
use hanafuda::ids::PlayerId;
use hanafuda::round::{Decision, EndReason, NextAction, TurnReport};
use protocol::events::GameEvent;
use protocol::views::{GameView, RoundView, score_table};

/// Which command produced a turn report; decides between the completed-turn
/// and the after-selection progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnCommandKind {
    Play,
    Select,
    Decide(Decision),
}

fn broadcast(game: &Game, event: GameEvent) -> Vec<(PlayerId, GameEvent)> {
    game.players
        .iter()
        .map(|p| (p.id, event.clone()))
        .collect()
}

/// Per-player deal announcements for the current round.
pub fn round_dealt(game: &Game) -> Vec<(PlayerId, GameEvent)> {
    let Some(round) = game.current_round.as_ref() else {
        return Vec::new();
    };
    game.players
        .iter()
        .filter_map(|p| {
            RoundView::for_player(round, p.id).map(|view| {
                (
                    p.id,
                    GameEvent::RoundDealt {
                        round_number: round.round_number,
                        view,
                    },
                )
            })
        })
        .collect()
}

/// Everything one successful turn command should put on the wire, including
/// the settlement events when the command ended the round. `GameFinished`
/// stays with the caller, which also owns the internal publication.
pub fn turn_events(
    game: &Game,
    report: &TurnReport,
    kind: TurnCommandKind,
) -> Vec<(PlayerId, GameEvent)> {
    let mut events = Vec::new();

    if let TurnCommandKind::Decide(decision) = kind {
        events.extend(broadcast(
            game,
            GameEvent::DecisionMade {
                player_id: report.actor,
                decision,
            },
        ));
    }

    match &report.next {
        NextAction::Selection {
            player,
            phase,
            source_card,
            candidates,
        } => {
            events.extend(broadcast(
                game,
                GameEvent::SelectionRequired {
                    player_id: *player,
                    phase: *phase,
                    source_card: *source_card,
                    candidates: candidates.clone(),
                    hand_step: report.hand_step.clone(),
                },
            ));
        }
        NextAction::Decision { player, yaku } => {
            events.extend(broadcast(
                game,
                GameEvent::DecisionRequired {
                    player_id: *player,
                    yaku: yaku.clone(),
                    hand_step: report.hand_step.clone(),
                    draw_step: report.draw_step.clone(),
                },
            ));
        }
        NextAction::HandPlay { player } => match kind {
            TurnCommandKind::Play => {
                events.extend(broadcast(
                    game,
                    GameEvent::TurnCompleted {
                        actor_id: report.actor,
                        hand_step: report.hand_step.clone(),
                        draw_step: report.draw_step.clone(),
                        next_player_id: *player,
                    },
                ));
            }
            TurnCommandKind::Select => {
                events.extend(broadcast(
                    game,
                    GameEvent::TurnProgressAfterSelection {
                        actor_id: report.actor,
                        hand_step: report.hand_step.clone(),
                        draw_step: report.draw_step.clone(),
                        next_player_id: *player,
                    },
                ));
            }
            // A koi-koi continue: the decision event above already tells the
            // clients the turn stays put.
            TurnCommandKind::Decide(_) => {}
        },
        NextAction::RoundOver => {
            events.extend(settlement_events(game));
        }
    }

    events
}

/// The settlement announcement matching the round's end reason.
pub fn settlement_events(game: &Game) -> Vec<(PlayerId, GameEvent)> {
    let Some(settlement) = game
        .current_round
        .as_ref()
        .and_then(|r| r.settlement.as_ref())
    else {
        return Vec::new();
    };
    let scores = score_table(game);
    let event = match (settlement.reason, settlement.winner) {
        (EndReason::KoiKoiStop, Some(winner_id)) => GameEvent::RoundScored {
            winner_id,
            yaku: settlement.yaku.clone(),
            awarded_points: settlement.awarded_points,
            scores,
            countdown_seconds: settlement.countdown_seconds,
        },
        (EndReason::KoiKoiStop, None) | (EndReason::HandsExhausted, _) => GameEvent::RoundDrawn {
            reason: settlement.reason,
            scores,
            countdown_seconds: settlement.countdown_seconds,
        },
        (reason, winner_id) => GameEvent::RoundEndedInstantly {
            reason,
            winner_id,
            awarded_points: settlement.awarded_points,
            scores,
            countdown_seconds: settlement.countdown_seconds,
        },
    };
    broadcast(game, event)
}

/// The terminal announcement. The winner is passed in because a forced
/// finish names the remaining player rather than the score leader.
pub fn game_finished_events(
    game: &Game,
    winner: Option<PlayerId>,
) -> Vec<(PlayerId, GameEvent)> {
    broadcast(
        game,
        GameEvent::GameFinished {
            winner_id: winner,
            final_scores: score_table(game),
        },
    )
}

/// Full-state resync for one reconnecting player.
pub fn snapshot_restore(game: &Game, viewer: PlayerId) -> Option<GameEvent> {
    GameView::for_player(game, viewer).map(|view| GameEvent::GameSnapshotRestore { view })
}
