//! The matchmaking pool: FIFO queues per room type with a secondary index
//! by player.
//!
//! All operations take one short mutex and are atomic with respect to each
//! other. The pool never arms timers and never publishes events; it is the
//! bookkeeping the registry and the service act on.

use chrono::{DateTime, Utc};
use hanafuda::ids::PlayerId;
use hanafuda::ruleset::RoomType;
use protocol::events::EntryStatus;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// One queued player.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchmakingEntry {
    pub id: Uuid,
    pub player_id: PlayerId,
    pub player_name: String,
    pub room_type: RoomType,
    pub entered_at: DateTime<Utc>,
    pub status: EntryStatus,
}

impl MatchmakingEntry {
    pub fn new(player_id: PlayerId, player_name: impl Into<String>, room_type: RoomType) -> Self {
        MatchmakingEntry {
            id: Uuid::new_v4(),
            player_id,
            player_name: player_name.into(),
            room_type,
            entered_at: Utc::now(),
            status: EntryStatus::Searching,
        }
    }

    /// Whether the matcher may pair this entry.
    pub fn is_matchable(&self) -> bool {
        matches!(
            self.status,
            EntryStatus::Searching | EntryStatus::LowAvailability
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("player already has a matchmaking entry")]
    AlreadyInQueue,
}

#[derive(Default)]
struct PoolInner {
    /// Insertion-ordered entry ids per room type.
    by_room: HashMap<RoomType, Vec<Uuid>>,
    entries: HashMap<Uuid, MatchmakingEntry>,
    by_player: HashMap<PlayerId, Uuid>,
}

/// The shared pool. One entry per player across all room types, enforced
/// here and nowhere else.
pub struct MatchPool {
    inner: Mutex<PoolInner>,
}

impl MatchPool {
    pub fn new() -> Self {
        MatchPool {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn add(&self, entry: MatchmakingEntry) -> Result<(), PoolError> {
        let mut inner = self.inner.lock().expect("pool poisoned");
        if inner.by_player.contains_key(&entry.player_id) {
            return Err(PoolError::AlreadyInQueue);
        }
        inner.by_player.insert(entry.player_id, entry.id);
        inner.by_room.entry(entry.room_type).or_default().push(entry.id);
        inner.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Removes an entry. Idempotent; returns what was removed.
    pub fn remove(&self, entry_id: Uuid) -> Option<MatchmakingEntry> {
        let mut inner = self.inner.lock().expect("pool poisoned");
        let entry = inner.entries.remove(&entry_id)?;
        inner.by_player.remove(&entry.player_id);
        if let Some(queue) = inner.by_room.get_mut(&entry.room_type) {
            queue.retain(|id| *id != entry_id);
        }
        Some(entry)
    }

    /// The first other matchable entry in the same room queue. FIFO order
    /// is insertion order, which is also earliest `entered_at` first.
    pub fn find_match(&self, for_entry: Uuid) -> Option<MatchmakingEntry> {
        let inner = self.inner.lock().expect("pool poisoned");
        let entry = inner.entries.get(&for_entry)?;
        let queue = inner.by_room.get(&entry.room_type)?;
        queue
            .iter()
            .filter(|id| **id != for_entry)
            .filter_map(|id| inner.entries.get(id))
            .find(|candidate| {
                candidate.player_id != entry.player_id && candidate.is_matchable()
            })
            .cloned()
    }

    pub fn update_status(&self, entry_id: Uuid, status: EntryStatus) -> Option<MatchmakingEntry> {
        let mut inner = self.inner.lock().expect("pool poisoned");
        let entry = inner.entries.get_mut(&entry_id)?;
        entry.status = status;
        Some(entry.clone())
    }

    pub fn find_by_id(&self, entry_id: Uuid) -> Option<MatchmakingEntry> {
        self.inner
            .lock()
            .expect("pool poisoned")
            .entries
            .get(&entry_id)
            .cloned()
    }

    pub fn find_by_player(&self, player: PlayerId) -> Option<MatchmakingEntry> {
        let inner = self.inner.lock().expect("pool poisoned");
        let id = inner.by_player.get(&player)?;
        inner.entries.get(id).cloned()
    }

    pub fn has_player(&self, player: PlayerId) -> bool {
        self.inner
            .lock()
            .expect("pool poisoned")
            .by_player
            .contains_key(&player)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("pool poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MatchPool {
    fn default() -> Self {
        Self::new()
    }
}
