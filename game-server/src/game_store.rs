//! In-memory game state: the snapshot map, the per-game command locks and
//! the repository interface behind which a durable backend can sit.
//!
//! The store holds the latest snapshot per game behind `Arc`, swapped
//! atomically under a short map lock. Serializing whole command executions
//! is the job of the per-game async locks handed out by [`GameStore::lock_for`];
//! the session service acquires one for the entire
//! reload-validate-apply-publish cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hanafuda::game::Game;
use hanafuda::ids::{GameId, PlayerId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub struct GameStore {
    games: Mutex<HashMap<GameId, Arc<Game>>>,
    locks: Mutex<HashMap<GameId, Arc<tokio::sync::Mutex<()>>>>,
}

impl GameStore {
    pub fn new() -> Self {
        GameStore {
            games: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The latest snapshot, if the game is known.
    pub fn get(&self, id: GameId) -> Option<Arc<Game>> {
        self.games
            .lock()
            .expect("game map poisoned")
            .get(&id)
            .cloned()
    }

    /// Swaps in a new latest snapshot.
    pub fn put(&self, game: Arc<Game>) {
        self.games
            .lock()
            .expect("game map poisoned")
            .insert(game.id, game);
    }

    pub fn remove(&self, id: GameId) -> Option<Arc<Game>> {
        self.locks.lock().expect("lock map poisoned").remove(&id);
        self.games.lock().expect("game map poisoned").remove(&id)
    }

    /// The command serialization lock of one game, created on first use.
    pub fn lock_for(&self, id: GameId) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .expect("lock map poisoned")
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// The unfinished game a player sits in, if any. Blocks re-entering
    /// matchmaking while it exists.
    pub fn find_active_for_player(&self, player: PlayerId) -> Option<Arc<Game>> {
        self.games
            .lock()
            .expect("game map poisoned")
            .values()
            .find(|g| g.is_active() && g.has_player(player))
            .cloned()
    }

    pub fn active_count(&self) -> usize {
        self.games
            .lock()
            .expect("game map poisoned")
            .values()
            .filter(|g| g.is_active())
            .count()
    }

    /// Drops finished games that have not been touched since `horizon`.
    /// Runs from the watchdog; active games are never touched.
    pub fn purge_finished(&self, horizon: DateTime<Utc>) -> usize {
        let mut games = self.games.lock().expect("game map poisoned");
        let doomed: Vec<GameId> = games
            .values()
            .filter(|g| !g.is_active() && g.updated_at < horizon)
            .map(|g| g.id)
            .collect();
        for id in &doomed {
            games.remove(id);
        }
        drop(games);
        let mut locks = self.locks.lock().expect("lock map poisoned");
        for id in &doomed {
            locks.remove(id);
        }
        doomed.len()
    }
}

impl Default for GameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One entry of the per-game event log.
#[derive(Debug, Clone)]
pub struct GameLogEntry {
    pub seq: u64,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub ts: DateTime<Utc>,
}

/// Durable persistence behind the in-memory store. The runtime writes
/// through on every snapshot swap and appends every published event; a
/// database-backed implementation can replace the in-memory one without the
/// session service noticing.
#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn save(&self, game: &Game) -> Result<(), RepositoryError>;
    async fn load(&self, id: GameId) -> Result<Option<Game>, RepositoryError>;
    async fn append_log(
        &self,
        game_id: GameId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), RepositoryError>;
}

struct StoredGame {
    snapshot_json: String,
    updated_at: DateTime<Utc>,
}

pub struct InMemoryGameRepository {
    rows: Mutex<HashMap<GameId, StoredGame>>,
    logs: Mutex<HashMap<GameId, Vec<GameLogEntry>>>,
}

impl InMemoryGameRepository {
    pub fn new() -> Self {
        InMemoryGameRepository {
            rows: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
        }
    }

    pub fn log_for(&self, game_id: GameId) -> Vec<GameLogEntry> {
        self.logs
            .lock()
            .expect("log map poisoned")
            .get(&game_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InMemoryGameRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GameRepository for InMemoryGameRepository {
    async fn save(&self, game: &Game) -> Result<(), RepositoryError> {
        let snapshot_json = serde_json::to_string(game)?;
        self.rows.lock().expect("row map poisoned").insert(
            game.id,
            StoredGame {
                snapshot_json,
                updated_at: game.updated_at,
            },
        );
        Ok(())
    }

    async fn load(&self, id: GameId) -> Result<Option<Game>, RepositoryError> {
        let rows = self.rows.lock().expect("row map poisoned");
        match rows.get(&id) {
            Some(row) => Ok(Some(serde_json::from_str(&row.snapshot_json)?)),
            None => Ok(None),
        }
    }

    async fn append_log(
        &self,
        game_id: GameId,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), RepositoryError> {
        let mut logs = self.logs.lock().expect("log map poisoned");
        let entries = logs.entry(game_id).or_default();
        let seq = entries.len() as u64 + 1;
        entries.push(GameLogEntry {
            seq,
            event_type: event_type.to_string(),
            payload,
            ts: Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hanafuda::game::GamePlayer;
    use hanafuda::ruleset::RoomType;

    fn game_with(player: PlayerId) -> Arc<Game> {
        Arc::new(Game::new(
            GameId::random(),
            RoomType::Quick,
            GamePlayer::new(player, "alice", false),
            Utc::now(),
        ))
    }

    #[test]
    fn put_swaps_the_latest_snapshot() {
        let store = GameStore::new();
        let player = PlayerId::random();
        let game = game_with(player);
        store.put(game.clone());

        let second = GamePlayer::new(PlayerId::random(), "bob", false);
        let updated = Arc::new(game.add_player(second, Utc::now()).unwrap());
        store.put(updated.clone());

        let latest = store.get(game.id).unwrap();
        assert_eq!(latest.players.len(), 2);
    }

    #[test]
    fn find_active_ignores_finished_games() {
        let store = GameStore::new();
        let player = PlayerId::random();
        let game = game_with(player);
        store.put(game.clone());
        assert!(store.find_active_for_player(player).is_some());

        let (finished, _) = game.force_finish(player, Utc::now()).unwrap();
        store.put(Arc::new(finished));
        assert!(store.find_active_for_player(player).is_none());
    }

    #[test]
    fn lock_for_returns_the_same_lock_per_game() {
        let store = GameStore::new();
        let id = GameId::random();
        let first = store.lock_for(id);
        let second = store.lock_for(id);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &store.lock_for(GameId::random())));
    }

    #[test]
    fn purge_drops_only_stale_finished_games() {
        let store = GameStore::new();
        let player = PlayerId::random();
        let active = game_with(player);
        store.put(active.clone());

        let other = game_with(PlayerId::random());
        let (mut finished, _) = other.force_finish(other.players[0].id, Utc::now()).unwrap();
        finished.updated_at = Utc::now() - Duration::hours(2);
        store.put(Arc::new(finished));

        store.purge_finished(Utc::now() - Duration::hours(1));
        assert!(store.get(active.id).is_some());
        assert_eq!(store.active_count(), 1);
        assert!(store.get(other.id).is_none());
    }

    #[tokio::test]
    async fn repository_roundtrips_snapshots() {
        let repo = InMemoryGameRepository::new();
        let game = game_with(PlayerId::random());
        repo.save(&game).await.unwrap();

        let loaded = repo.load(game.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, game.id);
        assert_eq!(loaded.players.len(), 1);
        assert!(repo.load(GameId::random()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn log_entries_are_sequenced() {
        let repo = InMemoryGameRepository::new();
        let id = GameId::random();
        repo.append_log(id, "ROUND_DEALT", serde_json::json!({}))
            .await
            .unwrap();
        repo.append_log(id, "TURN_COMPLETED", serde_json::json!({}))
            .await
            .unwrap();

        let log = repo.log_for(id);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].seq, 1);
        assert_eq!(log[1].seq, 2);
        assert_eq!(log[1].event_type, "TURN_COMPLETED");
    }
}
