//! Live transport peers and their binding to player identities.
//!
//! A registered connection owns a bounded channel into its writer task; the
//! manager forwards the player's outbound bus stream into that channel. A
//! player has at most one live peer: registering a newer one force-closes
//! the old, which keeps the bus free of duplicate subscriptions.

use crate::event_bus::{OUTBOUND_BUFFER_SIZE, OutboundBus};
use hanafuda::ids::PlayerId;
use protocol::events::GatewayEvent;
use protocol::frames::CommandResponse;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Close code for a connection displaced by a newer one.
pub const CLOSE_REPLACED: u16 = 4000;
/// Close code for a failed or invalidated session.
pub const CLOSE_SESSION_INVALIDATED: u16 = 4002;

/// What the writer task can be asked to put on the socket.
#[derive(Debug)]
pub enum PeerMessage {
    Event(GatewayEvent),
    Response(CommandResponse),
    Close { code: u16, reason: String },
}

struct PeerEntry {
    peer_id: Uuid,
    tx: mpsc::Sender<PeerMessage>,
    forwarder: JoinHandle<()>,
}

pub struct ConnectionManager {
    outbound: Arc<OutboundBus>,
    by_player: Mutex<HashMap<PlayerId, PeerEntry>>,
    by_peer: Mutex<HashMap<Uuid, PlayerId>>,
}

impl ConnectionManager {
    pub fn new(outbound: Arc<OutboundBus>) -> Self {
        ConnectionManager {
            outbound,
            by_player: Mutex::new(HashMap::new()),
            by_peer: Mutex::new(HashMap::new()),
        }
    }

    /// Binds a peer to a player, displacing any previous peer, and starts
    /// pumping the player's outbound stream into the peer channel. Returns
    /// the peer id the transport uses for reverse lookup and cleanup.
    pub fn register(&self, player: PlayerId, tx: mpsc::Sender<PeerMessage>) -> Uuid {
        let previous = self
            .by_player
            .lock()
            .expect("connection map poisoned")
            .remove(&player);
        if let Some(previous) = previous {
            tracing::debug!(player = %player, "replacing existing connection");
            let _ = previous.tx.try_send(PeerMessage::Close {
                code: CLOSE_REPLACED,
                reason: "Replaced by a newer connection".to_string(),
            });
            previous.forwarder.abort();
            self.by_peer
                .lock()
                .expect("peer map poisoned")
                .remove(&previous.peer_id);
        }

        let peer_id = Uuid::new_v4();
        let mut events = self.outbound.subscribe(player);
        let event_tx = tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event_tx.send(PeerMessage::Event(event)).await.is_err() {
                    break;
                }
            }
        });

        self.by_player.lock().expect("connection map poisoned").insert(
            player,
            PeerEntry {
                peer_id,
                tx,
                forwarder,
            },
        );
        self.by_peer
            .lock()
            .expect("peer map poisoned")
            .insert(peer_id, player);
        peer_id
    }

    /// Tears down the binding for a closed socket. Returns the player only
    /// when this peer was still their current connection; a socket that was
    /// already displaced cleans up nothing further.
    pub fn remove(&self, peer_id: Uuid) -> Option<PlayerId> {
        let player = self
            .by_peer
            .lock()
            .expect("peer map poisoned")
            .remove(&peer_id)?;

        let removed = {
            let mut by_player = self.by_player.lock().expect("connection map poisoned");
            match by_player.get(&player) {
                Some(entry) if entry.peer_id == peer_id => by_player.remove(&player),
                _ => None,
            }
        };
        let entry = removed?;
        entry.forwarder.abort();
        self.outbound.unsubscribe(player);
        Some(player)
    }

    /// Direct write to a player's peer, outside the bus. Transport-closed
    /// failures are absorbed; the disconnect path cleans up shortly after.
    pub fn send_to_player(&self, player: PlayerId, message: PeerMessage) -> bool {
        let tx = {
            let by_player = self.by_player.lock().expect("connection map poisoned");
            by_player.get(&player).map(|entry| entry.tx.clone())
        };
        match tx {
            Some(tx) => tx.try_send(message).is_ok(),
            None => false,
        }
    }

    /// Issues a close frame and drops the binding.
    pub fn force_disconnect(&self, player: PlayerId, code: u16, reason: &str) {
        let entry = self
            .by_player
            .lock()
            .expect("connection map poisoned")
            .remove(&player);
        let Some(entry) = entry else {
            return;
        };
        let _ = entry.tx.try_send(PeerMessage::Close {
            code,
            reason: reason.to_string(),
        });
        entry.forwarder.abort();
        self.by_peer
            .lock()
            .expect("peer map poisoned")
            .remove(&entry.peer_id);
        self.outbound.unsubscribe(player);
        tracing::info!(player = %player, code, reason, "connection force-closed");
    }

    pub fn player_by_peer(&self, peer_id: Uuid) -> Option<PlayerId> {
        self.by_peer
            .lock()
            .expect("peer map poisoned")
            .get(&peer_id)
            .copied()
    }

    pub fn connected_count(&self) -> usize {
        self.by_player.lock().expect("connection map poisoned").len()
    }

    /// A fresh channel pair sized like every other peer buffer.
    pub fn peer_channel() -> (mpsc::Sender<PeerMessage>, mpsc::Receiver<PeerMessage>) {
        mpsc::channel(OUTBOUND_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::events::{EventBody, MatchmakingEvent};

    fn cancelled_body() -> EventBody {
        EventBody::Matchmaking {
            event: MatchmakingEvent::MatchmakingCancelled {
                entry_id: Uuid::new_v4(),
            },
        }
    }

    #[tokio::test]
    async fn bus_events_reach_the_registered_peer() {
        let outbound = Arc::new(OutboundBus::new());
        let manager = ConnectionManager::new(outbound.clone());
        let player = PlayerId::random();

        let (tx, mut rx) = ConnectionManager::peer_channel();
        let peer_id = manager.register(player, tx);
        assert_eq!(manager.player_by_peer(peer_id), Some(player));

        outbound.publish(player, cancelled_body());
        match rx.recv().await {
            Some(PeerMessage::Event(event)) => assert!(matches!(
                event.body,
                EventBody::Matchmaking { .. }
            )),
            other => panic!("expected an event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_newer_connection_displaces_the_older_one() {
        let outbound = Arc::new(OutboundBus::new());
        let manager = ConnectionManager::new(outbound.clone());
        let player = PlayerId::random();

        let (old_tx, mut old_rx) = ConnectionManager::peer_channel();
        let old_peer = manager.register(player, old_tx);
        let (new_tx, mut new_rx) = ConnectionManager::peer_channel();
        let _new_peer = manager.register(player, new_tx);

        // The old peer got a close frame and its socket closing is a no-op
        // for the new binding.
        match old_rx.recv().await {
            Some(PeerMessage::Close { code, .. }) => assert_eq!(code, CLOSE_REPLACED),
            other => panic!("expected a close, got {other:?}"),
        }
        assert_eq!(manager.remove(old_peer), None);
        assert_eq!(manager.connected_count(), 1);

        outbound.publish(player, cancelled_body());
        assert!(matches!(new_rx.recv().await, Some(PeerMessage::Event(_))));
    }

    #[tokio::test]
    async fn remove_cleans_the_bus_subscription() {
        let outbound = Arc::new(OutboundBus::new());
        let manager = ConnectionManager::new(outbound.clone());
        let player = PlayerId::random();

        let (tx, _rx) = ConnectionManager::peer_channel();
        let peer_id = manager.register(player, tx);
        assert!(outbound.has_subscriber(player));

        assert_eq!(manager.remove(peer_id), Some(player));
        assert!(!outbound.has_subscriber(player));
        assert_eq!(manager.connected_count(), 0);
    }

    #[tokio::test]
    async fn force_disconnect_sends_the_close_frame() {
        let outbound = Arc::new(OutboundBus::new());
        let manager = ConnectionManager::new(outbound.clone());
        let player = PlayerId::random();

        let (tx, mut rx) = ConnectionManager::peer_channel();
        manager.register(player, tx);
        manager.force_disconnect(player, CLOSE_SESSION_INVALIDATED, "Session invalidated");

        match rx.recv().await {
            Some(PeerMessage::Close { code, reason }) => {
                assert_eq!(code, CLOSE_SESSION_INVALIDATED);
                assert_eq!(reason, "Session invalidated");
            }
            other => panic!("expected a close, got {other:?}"),
        }
        assert_eq!(manager.connected_count(), 0);

        // Sending to a gone player reports failure and stays quiet.
        assert!(!manager.send_to_player(
            player,
            PeerMessage::Response(CommandResponse::ok("c-1"))
        ));
    }
}
