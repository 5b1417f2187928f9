//! The matchmaking use cases: entering the queue, cancelling, and the bot
//! fallback when nobody shows up.

use crate::errors::CommandError;
use crate::event_bus::{InternalBus, MatchFound, OutboundBus};
use crate::game_store::GameStore;
use crate::match_pool::{MatchPool, MatchmakingEntry};
use crate::match_registry::{BotFallback, MatchRegistry};
use chrono::Utc;
use hanafuda::ids::PlayerId;
use hanafuda::ruleset::RoomType;
use protocol::ErrorCode;
use protocol::events::{EventBody, MatchType, MatchmakingEvent};
use std::sync::Arc;
use uuid::Uuid;

/// What an accepted join resulted in; echoed as the response message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    MatchedHuman,
    Searching,
}

impl JoinOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            JoinOutcome::MatchedHuman => "MATCHED_HUMAN",
            JoinOutcome::Searching => "SEARCHING",
        }
    }
}

pub struct MatchmakingService {
    pool: Arc<MatchPool>,
    registry: Arc<MatchRegistry>,
    store: Arc<GameStore>,
    internal: Arc<InternalBus>,
    outbound: Arc<OutboundBus>,
}

impl MatchmakingService {
    pub fn new(
        pool: Arc<MatchPool>,
        registry: Arc<MatchRegistry>,
        store: Arc<GameStore>,
        internal: Arc<InternalBus>,
        outbound: Arc<OutboundBus>,
    ) -> Self {
        MatchmakingService {
            pool,
            registry,
            store,
            internal,
            outbound,
        }
    }

    /// Puts a player into the queue, pairing immediately when a partner is
    /// already waiting.
    pub fn enter(
        &self,
        player_id: PlayerId,
        player_name: &str,
        room_type: RoomType,
    ) -> Result<JoinOutcome, CommandError> {
        if self.pool.has_player(player_id) {
            return Err(CommandError::new(
                ErrorCode::AlreadyInQueue,
                "player already has a matchmaking entry",
            ));
        }
        if self.store.find_active_for_player(player_id).is_some() {
            return Err(CommandError::new(
                ErrorCode::AlreadyInGame,
                "player already has an unfinished game",
            ));
        }

        let entry = MatchmakingEntry::new(player_id, player_name, room_type);
        let entry_id = entry.id;
        self.pool.add(entry.clone())?;

        if let Some(partner) = self.pool.find_match(entry_id) {
            // Both entries leave the pool before anyone hears about the
            // match, so a racing re-join starts from a clean slate.
            self.pool.remove(partner.id);
            self.pool.remove(entry_id);
            self.registry.deregister(partner.id);

            tracing::info!(
                player1 = %partner.player_id,
                player2 = %player_id,
                room = %room_type,
                "human match made"
            );
            let found = MatchFound {
                player1_id: partner.player_id,
                player1_name: partner.player_name.clone(),
                player2_id: player_id,
                player2_name: player_name.to_string(),
                room_type,
                match_type: MatchType::Human,
                matched_at: Utc::now(),
            };
            self.announce(&found);
            self.internal.match_found.publish(&found);
            return Ok(JoinOutcome::MatchedHuman);
        }

        self.registry.register(entry_id, player_id);
        tracing::debug!(player = %player_id, room = %room_type, "queued for matchmaking");
        Ok(JoinOutcome::Searching)
    }

    /// Takes a player out of the queue. Quietly succeeds when the player is
    /// not queued, which makes client retries harmless.
    pub fn cancel(&self, player_id: PlayerId) -> Result<(), CommandError> {
        let Some(entry) = self.pool.find_by_player(player_id) else {
            return Ok(());
        };
        self.pool.remove(entry.id);
        self.registry.deregister(entry.id);
        self.outbound.publish(
            player_id,
            EventBody::Matchmaking {
                event: MatchmakingEvent::MatchmakingCancelled { entry_id: entry.id },
            },
        );
        tracing::debug!(player = %player_id, entry = %entry.id, "matchmaking cancelled");
        Ok(())
    }

    /// Tells both players about their match on their outbound streams.
    fn announce(&self, found: &MatchFound) {
        self.outbound.publish(
            found.player1_id,
            EventBody::Matchmaking {
                event: MatchmakingEvent::MatchFound {
                    room_type: found.room_type,
                    match_type: found.match_type,
                    opponent_id: found.player2_id,
                    opponent_name: found.player2_name.clone(),
                },
            },
        );
        self.outbound.publish(
            found.player2_id,
            EventBody::Matchmaking {
                event: MatchmakingEvent::MatchFound {
                    room_type: found.room_type,
                    match_type: found.match_type,
                    opponent_id: found.player1_id,
                    opponent_name: found.player1_name.clone(),
                },
            },
        );
    }
}

#[async_trait::async_trait]
impl BotFallback for MatchmakingService {
    /// The fifteen-second mark: nobody came, the computer steps in.
    async fn fallback_to_bot(&self, entry_id: Uuid) {
        let Some(entry) = self.pool.remove(entry_id) else {
            // Matched or cancelled in the meantime.
            return;
        };
        self.registry.deregister(entry_id);

        tracing::info!(player = %entry.player_id, room = %entry.room_type, "bot fallback match");
        let found = MatchFound {
            player1_id: entry.player_id,
            player1_name: entry.player_name.clone(),
            player2_id: PlayerId::BOT,
            player2_name: "Computer".to_string(),
            room_type: entry.room_type,
            match_type: MatchType::Bot,
            matched_at: Utc::now(),
        };
        self.announce(&found);
        self.internal.match_found.publish(&found);
    }
}
