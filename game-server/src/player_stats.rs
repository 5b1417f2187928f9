//! Win/loss bookkeeping, fed from the internal bus.

use crate::event_bus::{GameFinished, InternalBus};
use hanafuda::ids::PlayerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub points: u32,
}

/// Accumulates per-player statistics from `GameFinished` events. In-memory
/// today; the table mirrors the durable `player_stats` layout so a database
/// writer can take its place.
pub struct PlayerStatsRecorder {
    stats: Mutex<HashMap<PlayerId, PlayerStats>>,
}

impl PlayerStatsRecorder {
    pub fn new() -> Self {
        PlayerStatsRecorder {
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes the recorder to the internal bus. The handler is
    /// synchronous and cheap, as bus handlers must be.
    pub fn attach(self: &Arc<Self>, bus: &InternalBus) {
        let recorder = self.clone();
        bus.game_finished.subscribe(move |finished| {
            recorder.record(finished);
        });
    }

    pub fn record(&self, finished: &GameFinished) {
        let mut stats = self.stats.lock().expect("stats map poisoned");
        for player in &finished.players {
            let entry = stats.entry(*player).or_default();
            match finished.winner_id {
                Some(winner) if winner == *player => entry.wins += 1,
                Some(_) => entry.losses += 1,
                None => entry.draws += 1,
            }
        }
        for score in &finished.final_scores {
            stats.entry(score.player_id).or_default().points += score.score;
        }
    }

    pub fn get(&self, player: PlayerId) -> PlayerStats {
        self.stats
            .lock()
            .expect("stats map poisoned")
            .get(&player)
            .copied()
            .unwrap_or_default()
    }
}

impl Default for PlayerStatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
