//! Countdown timers attached to matchmaking entries.
//!
//! Every registered entry carries two timers: the low-availability notice
//! and the bot fallback. Both are cleared when the entry is matched (the
//! registry listens on the internal bus for that), cancelled, or the
//! registry stops. Re-registering an entry id clears its old timers first.

use crate::event_bus::{InternalBus, OutboundBus, SubscriptionId};
use crate::match_pool::MatchPool;
use hanafuda::ids::PlayerId;
use protocol::events::{EntryStatus, EventBody, MatchmakingEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// The use case invoked when a queue wait runs out. Implemented by the
/// matchmaking service; late-bound because the service also owns the
/// registry.
#[async_trait::async_trait]
pub trait BotFallback: Send + Sync {
    async fn fallback_to_bot(&self, entry_id: Uuid);
}

struct EntryTimers {
    player_id: PlayerId,
    low_availability: JoinHandle<()>,
    bot_fallback: JoinHandle<()>,
}

pub struct MatchRegistry {
    pool: Arc<MatchPool>,
    outbound: Arc<OutboundBus>,
    timers: Mutex<HashMap<Uuid, EntryTimers>>,
    fallback: OnceLock<Arc<dyn BotFallback>>,
    low_availability_after: Duration,
    bot_fallback_after: Duration,
}

impl MatchRegistry {
    pub fn new(
        pool: Arc<MatchPool>,
        outbound: Arc<OutboundBus>,
        low_availability_after: Duration,
        bot_fallback_after: Duration,
    ) -> Self {
        MatchRegistry {
            pool,
            outbound,
            timers: Mutex::new(HashMap::new()),
            fallback: OnceLock::new(),
            low_availability_after,
            bot_fallback_after,
        }
    }

    /// Late-binds the bot fallback use case; the single point where the
    /// registry learns about the service built on top of it.
    pub fn bind_fallback(&self, fallback: Arc<dyn BotFallback>) {
        if self.fallback.set(fallback).is_err() {
            tracing::error!("bot fallback was already bound");
        }
    }

    /// Arms both timers for an entry. Idempotent per entry id: existing
    /// timers are cleared first.
    pub fn register(self: &Arc<Self>, entry_id: Uuid, player_id: PlayerId) {
        self.deregister(entry_id);

        let registry = self.clone();
        let low_availability = tokio::spawn(async move {
            tokio::time::sleep(registry.low_availability_after).await;
            registry.notify_low_availability(entry_id);
        });

        let registry = self.clone();
        let bot_fallback = tokio::spawn(async move {
            tokio::time::sleep(registry.bot_fallback_after).await;
            let Some(fallback) = registry.fallback.get() else {
                tracing::error!(entry = %entry_id, "bot fallback fired before binding");
                return;
            };
            fallback.fallback_to_bot(entry_id).await;
        });

        self.timers.lock().expect("registry timers poisoned").insert(
            entry_id,
            EntryTimers {
                player_id,
                low_availability,
                bot_fallback,
            },
        );
    }

    /// The ten-second mark: flag the entry and tell the player.
    fn notify_low_availability(&self, entry_id: Uuid) {
        let Some(entry) = self.pool.find_by_id(entry_id) else {
            return;
        };
        if entry.status != EntryStatus::Searching {
            return;
        }
        let Some(updated) = self
            .pool
            .update_status(entry_id, EntryStatus::LowAvailability)
        else {
            return;
        };
        tracing::debug!(entry = %entry_id, player = %updated.player_id, "matchmaking low availability");
        self.outbound.publish(
            updated.player_id,
            EventBody::Matchmaking {
                event: MatchmakingEvent::MatchmakingStatus {
                    entry_id,
                    room_type: updated.room_type,
                    status: EntryStatus::LowAvailability,
                },
            },
        );
    }

    /// Clears the timers of one entry. Idempotent.
    pub fn deregister(&self, entry_id: Uuid) {
        let removed = self
            .timers
            .lock()
            .expect("registry timers poisoned")
            .remove(&entry_id);
        if let Some(timers) = removed {
            timers.low_availability.abort();
            timers.bot_fallback.abort();
        }
    }

    /// Clears the timers of whatever entry a player holds.
    pub fn deregister_player(&self, player_id: PlayerId) {
        let ids: Vec<Uuid> = {
            let timers = self.timers.lock().expect("registry timers poisoned");
            timers
                .iter()
                .filter(|(_, t)| t.player_id == player_id)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in ids {
            self.deregister(id);
        }
    }

    /// Subscribes the registry to match-found events so that both matched
    /// players lose their timers, whoever matched them.
    pub fn attach_to_bus(self: &Arc<Self>, bus: &InternalBus) -> SubscriptionId {
        let registry = self.clone();
        bus.match_found.subscribe(move |found| {
            registry.deregister_player(found.player1_id);
            registry.deregister_player(found.player2_id);
        })
    }

    /// Drops every timer; used on shutdown.
    pub fn stop(&self) {
        let mut timers = self.timers.lock().expect("registry timers poisoned");
        for (_, entry) in timers.drain() {
            entry.low_availability.abort();
            entry.bot_fallback.abort();
        }
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().expect("registry timers poisoned").len()
    }
}
