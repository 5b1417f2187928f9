//! The two in-process buses gluing the runtime together.
//!
//! The internal bus carries typed cross-component events (match found, game
//! finished, computer opponent needed). Publishing is synchronous and fires
//! every handler in registration order; a handler that panics is logged and
//! must never rob the remaining subscribers of the event. Handlers run on
//! the publisher's task and therefore must not block; anything slow belongs
//! on a spawned task.
//!
//! The outbound bus fans gateway events out to players. Delivery is
//! best-effort over a bounded channel per player: no subscriber means the
//! event is dropped, a full channel means the slowest client loses events
//! rather than stalling the game.

use chrono::{DateTime, Utc};
use hanafuda::ids::{GameId, PlayerId};
use hanafuda::ruleset::RoomType;
use protocol::events::{EventBody, GatewayEvent, MatchType};
use protocol::views::ScoreEntry;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Buffer of each per-player outbound channel.
pub const OUTBOUND_BUFFER_SIZE: usize = 256;

/// A pairing was made, by the matcher or the bot fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchFound {
    pub player1_id: PlayerId,
    pub player1_name: String,
    pub player2_id: PlayerId,
    pub player2_name: String,
    pub room_type: RoomType,
    pub match_type: MatchType,
    pub matched_at: DateTime<Utc>,
}

/// A game reached its terminal state, for whatever reason.
#[derive(Debug, Clone, PartialEq)]
pub struct GameFinished {
    pub game_id: GameId,
    pub winner_id: Option<PlayerId>,
    pub final_scores: Vec<ScoreEntry>,
    pub players: Vec<PlayerId>,
    pub finished_at: DateTime<Utc>,
}

/// A freshly created game holds a seat for the computer opponent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiOpponentNeeded {
    pub game_id: GameId,
    pub bot_player_id: PlayerId,
}

/// Handle to take a subscription down again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// One typed topic of the internal bus.
pub struct Topic<T> {
    name: &'static str,
    handlers: Mutex<Vec<(SubscriptionId, Box<dyn Fn(&T) + Send + Sync>)>>,
    next_id: AtomicU64,
}

impl<T> Topic<T> {
    fn new(name: &'static str) -> Self {
        Topic {
            name,
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a handler. Duplicate subscriptions fire independently.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .expect("topic handler list poisoned")
            .push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.handlers
            .lock()
            .expect("topic handler list poisoned")
            .retain(|(sub, _)| *sub != id);
    }

    /// Fires every handler in registration order. A panicking handler is
    /// logged and skipped; the rest still see the event.
    pub fn publish(&self, event: &T) {
        let handlers = self.handlers.lock().expect("topic handler list poisoned");
        for (id, handler) in handlers.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| handler(event)));
            if result.is_err() {
                tracing::error!(
                    topic = self.name,
                    subscription = id.0,
                    "internal bus handler panicked"
                );
            }
        }
    }

    #[cfg(test)]
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

/// The typed topics the components talk over.
pub struct InternalBus {
    pub match_found: Topic<MatchFound>,
    pub game_finished: Topic<GameFinished>,
    pub ai_opponent_needed: Topic<AiOpponentNeeded>,
}

impl InternalBus {
    pub fn new() -> Self {
        InternalBus {
            match_found: Topic::new("match_found"),
            game_finished: Topic::new("game_finished"),
            ai_opponent_needed: Topic::new("ai_opponent_needed"),
        }
    }
}

impl Default for InternalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-player fanout of gateway events.
pub struct OutboundBus {
    subscribers: Mutex<HashMap<PlayerId, mpsc::Sender<GatewayEvent>>>,
    next_event_id: AtomicU64,
}

impl OutboundBus {
    pub fn new() -> Self {
        OutboundBus {
            subscribers: Mutex::new(HashMap::new()),
            next_event_id: AtomicU64::new(1),
        }
    }

    /// Opens the player's event stream. A previous subscription for the
    /// same player is replaced, which closes its receiver.
    pub fn subscribe(&self, player: PlayerId) -> mpsc::Receiver<GatewayEvent> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER_SIZE);
        self.subscribers
            .lock()
            .expect("outbound subscriber map poisoned")
            .insert(player, tx);
        rx
    }

    pub fn unsubscribe(&self, player: PlayerId) {
        self.subscribers
            .lock()
            .expect("outbound subscriber map poisoned")
            .remove(&player);
    }

    /// Stamps the envelope and hands the event to the player's channel.
    /// Without a live subscriber the event is dropped.
    pub fn publish(&self, player: PlayerId, body: EventBody) {
        let event = GatewayEvent {
            event_id: self.next_event_id.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            body,
        };
        let sender = {
            let subscribers = self
                .subscribers
                .lock()
                .expect("outbound subscriber map poisoned");
            subscribers.get(&player).cloned()
        };
        let Some(sender) = sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(
                    player = %player,
                    event_id = event.event_id,
                    "outbound channel full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // The receiver went away without unsubscribing; clean up.
                self.unsubscribe(player);
            }
        }
    }

    pub fn has_subscriber(&self, player: PlayerId) -> bool {
        self.subscribers
            .lock()
            .expect("outbound subscriber map poisoned")
            .contains_key(&player)
    }
}

impl Default for OutboundBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::events::MatchmakingEvent;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use uuid::Uuid;

    fn match_found() -> MatchFound {
        MatchFound {
            player1_id: PlayerId::random(),
            player1_name: "alice".to_string(),
            player2_id: PlayerId::random(),
            player2_name: "bob".to_string(),
            room_type: RoomType::Quick,
            match_type: MatchType::Human,
            matched_at: Utc::now(),
        }
    }

    fn cancelled_body() -> EventBody {
        EventBody::Matchmaking {
            event: MatchmakingEvent::MatchmakingCancelled {
                entry_id: Uuid::new_v4(),
            },
        }
    }

    #[test]
    fn handlers_fire_in_registration_order() {
        let bus = InternalBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.match_found.subscribe(move |_| {
                seen.lock().unwrap().push(tag);
            });
        }
        bus.match_found.publish(&match_found());
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        let bus = InternalBus::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = delivered.clone();
        bus.match_found.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.match_found.subscribe(|_| panic!("handler blew up"));
        let counter = delivered.clone();
        bus.match_found.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.match_found.publish(&match_found());
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_stops_the_handler() {
        let bus = InternalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = bus.game_finished.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let event = GameFinished {
            game_id: GameId::random(),
            winner_id: None,
            final_scores: Vec::new(),
            players: Vec::new(),
            finished_at: Utc::now(),
        };
        bus.game_finished.publish(&event);
        bus.game_finished.unsubscribe(id);
        bus.game_finished.publish(&event);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.game_finished.handler_count(), 0);
    }

    #[tokio::test]
    async fn outbound_events_arrive_in_order_with_rising_ids() {
        let bus = OutboundBus::new();
        let player = PlayerId::random();
        let mut rx = bus.subscribe(player);

        bus.publish(player, cancelled_body());
        bus.publish(player, cancelled_body());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.event_id > first.event_id);
    }

    #[tokio::test]
    async fn publish_without_subscriber_is_dropped() {
        let bus = OutboundBus::new();
        // Nobody listens; this must simply not panic.
        bus.publish(PlayerId::random(), cancelled_body());
    }

    #[tokio::test]
    async fn resubscribe_replaces_the_stream() {
        let bus = OutboundBus::new();
        let player = PlayerId::random();
        let mut old_rx = bus.subscribe(player);
        let mut new_rx = bus.subscribe(player);

        bus.publish(player, cancelled_body());
        assert!(old_rx.recv().await.is_none());
        assert!(new_rx.recv().await.is_some());
    }
}
