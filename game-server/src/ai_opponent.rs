//! The computer opponent.
//!
//! From the runtime's point of view the computer is just another command
//! source: it subscribes to the bot player's outbound stream, and whatever
//! it decides goes through the ordinary game command path with its locks and
//! validation. No special cases exist inside the runtime for it.
//!
//! Every game event addressed to the bot schedules a look at the current
//! snapshot after a short think pause. Acting from the snapshot makes the
//! loop self-correcting: duplicate wake-ups simply find nothing to do.

use crate::event_bus::InternalBus;
use crate::event_bus::OutboundBus;
use crate::game_store::GameStore;
use crate::session_service::SessionService;
use hanafuda::auto_action::{self, DefaultAction};
use hanafuda::ids::{GameId, PlayerId};
use hanafuda::round::FlowState;
use protocol::frames::{Command, ContinueDecision};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct AiOpponent {
    store: Arc<GameStore>,
    session: Arc<SessionService>,
    active: Mutex<HashSet<GameId>>,
    think: Duration,
}

impl AiOpponent {
    /// Wires the opponent into the buses and starts its event loop.
    pub fn spawn(
        store: Arc<GameStore>,
        outbound: &OutboundBus,
        internal: &InternalBus,
        session: Arc<SessionService>,
        think: Duration,
    ) -> Arc<Self> {
        let ai = Arc::new(AiOpponent {
            store,
            session,
            active: Mutex::new(HashSet::new()),
            think,
        });

        let subscriber = ai.clone();
        internal.ai_opponent_needed.subscribe(move |needed| {
            tracing::info!(game = %needed.game_id, "computer opponent seated");
            subscriber
                .active
                .lock()
                .expect("ai game set poisoned")
                .insert(needed.game_id);
            subscriber.schedule(needed.game_id);
        });

        let subscriber = ai.clone();
        internal.game_finished.subscribe(move |finished| {
            subscriber
                .active
                .lock()
                .expect("ai game set poisoned")
                .remove(&finished.game_id);
        });

        let looper = ai.clone();
        let mut events = outbound.subscribe(PlayerId::BOT);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Some((game_id, _)) = event.body.as_game() {
                    if looper.is_playing(*game_id) {
                        looper.schedule(*game_id);
                    }
                }
            }
        });

        ai
    }

    fn is_playing(&self, game_id: GameId) -> bool {
        self.active
            .lock()
            .expect("ai game set poisoned")
            .contains(&game_id)
    }

    /// Queues one look at the game after the think pause.
    fn schedule(self: &Arc<Self>, game_id: GameId) {
        let ai = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ai.think).await;
            ai.act(game_id).await;
        });
    }

    /// Inspects the snapshot and issues at most one command.
    async fn act(&self, game_id: GameId) {
        if !self.is_playing(game_id) {
            return;
        }
        let Some(game) = self.store.get(game_id) else {
            return;
        };
        if !game.is_active() {
            return;
        }

        let command = if game.pending_continue.contains(&PlayerId::BOT) {
            Some(Command::ConfirmContinue {
                game_id,
                decision: ContinueDecision::Continue,
            })
        } else {
            game.current_round
                .as_ref()
                .filter(|round| round.flow_state != FlowState::RoundEnded)
                .and_then(|round| auto_action::choose(round, PlayerId::BOT))
                .map(|action| match action {
                    DefaultAction::PlayCard { card, target } => Command::PlayCard {
                        game_id,
                        card_id: card,
                        target_card_id: target,
                    },
                    DefaultAction::SelectTarget {
                        source_card,
                        target,
                    } => Command::SelectTarget {
                        game_id,
                        source_card_id: source_card,
                        target_card_id: target,
                    },
                    DefaultAction::MakeDecision { decision } => Command::MakeDecision {
                        game_id,
                        decision,
                    },
                })
        };

        let Some(command) = command else {
            return;
        };
        tracing::debug!(game = %game_id, ?command, "computer acts");
        if let Err(err) = self
            .session
            .execute_game_command(PlayerId::BOT, &command, false)
            .await
        {
            // A duplicate wake-up raced a state change; nothing to do.
            tracing::debug!(?err, game = %game_id, "computer command rejected");
        }
    }

    pub fn playing_count(&self) -> usize {
        self.active.lock().expect("ai game set poisoned").len()
    }
}
