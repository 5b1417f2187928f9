//! The identity collaborators the runtime reads from: a player directory
//! and a session store. Both are traits so a durable backend can slot in
//! without touching the game core; the in-memory implementations below are
//! what the single-process server runs on.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hanafuda::ids::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// A player as the identity collaborator knows them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub is_ai: bool,
    pub created_at: DateTime<Utc>,
}

/// Read access to player identities. The runtime never writes players
/// except through guest registration.
#[async_trait]
pub trait PlayerDirectory: Send + Sync {
    async fn get(&self, id: PlayerId) -> Option<Player>;
    async fn register_guest(&self, display_name: &str) -> Player;
}

/// In-memory directory, pre-seeded with the computer opponent.
pub struct InMemoryPlayerDirectory {
    players: Mutex<HashMap<PlayerId, Player>>,
}

impl InMemoryPlayerDirectory {
    pub fn new() -> Self {
        let mut players = HashMap::new();
        players.insert(
            PlayerId::BOT,
            Player {
                id: PlayerId::BOT,
                display_name: "Computer".to_string(),
                is_ai: true,
                created_at: Utc::now(),
            },
        );
        InMemoryPlayerDirectory {
            players: Mutex::new(players),
        }
    }
}

impl Default for InMemoryPlayerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlayerDirectory for InMemoryPlayerDirectory {
    async fn get(&self, id: PlayerId) -> Option<Player> {
        self.players
            .lock()
            .expect("player map poisoned")
            .get(&id)
            .cloned()
    }

    async fn register_guest(&self, display_name: &str) -> Player {
        let player = Player {
            id: PlayerId::random(),
            display_name: display_name.to_string(),
            is_ai: false,
            created_at: Utc::now(),
        };
        self.players
            .lock()
            .expect("player map poisoned")
            .insert(player.id, player.clone());
        player
    }
}

/// A login session with sliding expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

/// Session resolution for the connection handshake. Reads refresh the
/// sliding expiry; everything else about sessions lives outside the core.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, player_id: PlayerId) -> Session;
    async fn resolve(&self, session_id: Uuid) -> Option<PlayerId>;
    async fn invalidate(&self, session_id: Uuid);
}

pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<Uuid, Session>>,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        InMemorySessionStore {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    fn backdate(&self, session_id: Uuid, expires_at: DateTime<Utc>) {
        if let Some(session) = self
            .sessions
            .lock()
            .unwrap()
            .get_mut(&session_id)
        {
            session.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, player_id: PlayerId) -> Session {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            player_id,
            created_at: now,
            expires_at: now + self.ttl,
            last_accessed_at: now,
        };
        self.sessions
            .lock()
            .expect("session map poisoned")
            .insert(session.id, session.clone());
        session
    }

    async fn resolve(&self, session_id: Uuid) -> Option<PlayerId> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().expect("session map poisoned");
        match sessions.get_mut(&session_id) {
            Some(session) if session.expires_at > now => {
                session.last_accessed_at = now;
                session.expires_at = now + self.ttl;
                Some(session.player_id)
            }
            Some(_) => {
                sessions.remove(&session_id);
                None
            }
            None => None,
        }
    }

    async fn invalidate(&self, session_id: Uuid) {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_serves_the_computer_opponent() {
        let directory = InMemoryPlayerDirectory::new();
        let bot = directory.get(PlayerId::BOT).await.unwrap();
        assert!(bot.is_ai);
        assert_eq!(bot.display_name, "Computer");
    }

    #[tokio::test]
    async fn guests_are_registered_and_resolvable() {
        let directory = InMemoryPlayerDirectory::new();
        let guest = directory.register_guest("alice").await;
        assert!(!guest.is_ai);
        assert_eq!(directory.get(guest.id).await.unwrap(), guest);
        assert!(directory.get(PlayerId::random()).await.is_none());
    }

    #[tokio::test]
    async fn sessions_resolve_and_slide() {
        let store = InMemorySessionStore::new(Duration::days(7));
        let player = PlayerId::random();
        let session = store.create(player).await;

        assert_eq!(store.resolve(session.id).await, Some(player));

        // The read pushed the expiry forward.
        let refreshed = store
            .sessions
            .lock()
            .unwrap()
            .get(&session.id)
            .unwrap()
            .expires_at;
        assert!(refreshed >= session.expires_at);
    }

    #[tokio::test]
    async fn expired_sessions_resolve_to_nothing_and_vanish() {
        let store = InMemorySessionStore::new(Duration::days(7));
        let session = store.create(PlayerId::random()).await;
        store.backdate(session.id, Utc::now() - Duration::seconds(1));

        assert_eq!(store.resolve(session.id).await, None);
        assert!(store.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidate_removes_the_session() {
        let store = InMemorySessionStore::new(Duration::days(7));
        let session = store.create(PlayerId::random()).await;
        store.invalidate(session.id).await;
        assert_eq!(store.resolve(session.id).await, None);
    }
}
