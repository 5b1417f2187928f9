//! Fixed-window command rate limiting per player.
//!
//! Never blocks: a check either opens a window, counts against the current
//! one, or rejects with the seconds left until the window turns over. A
//! janitor task sweeps windows that nobody touched for a while.

use hanafuda::ids::PlayerId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

struct Window {
    started: Instant,
    count: u32,
}

pub struct RateLimiter {
    window: Duration,
    budget: u32,
    entries: Mutex<HashMap<PlayerId, Window>>,
}

impl RateLimiter {
    pub fn new(window: Duration, budget: u32) -> Self {
        RateLimiter {
            window,
            budget,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one command against the player's current window.
    pub fn check(&self, player: PlayerId) -> RateDecision {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("rate limit map poisoned");

        match entries.get_mut(&player) {
            Some(window) if now < window.started + self.window => {
                if window.count >= self.budget {
                    let remaining = (window.started + self.window) - now;
                    let retry_after_seconds = (remaining.as_millis() as u64 / 1_000).max(1);
                    RateDecision::Limited {
                        retry_after_seconds,
                    }
                } else {
                    window.count += 1;
                    RateDecision::Allowed
                }
            }
            _ => {
                entries.insert(
                    player,
                    Window {
                        started: now,
                        count: 1,
                    },
                );
                RateDecision::Allowed
            }
        }
    }

    /// Forgets the player's window, e.g. after leaving a game.
    pub fn reset(&self, player: PlayerId) {
        self.entries
            .lock()
            .expect("rate limit map poisoned")
            .remove(&player);
    }

    /// Drops windows that ended more than two window lengths ago.
    pub fn sweep(&self) {
        let now = Instant::now();
        let horizon = self.window * 3;
        self.entries
            .lock()
            .expect("rate limit map poisoned")
            .retain(|_, window| now < window.started + horizon);
    }

    pub fn tracked_players(&self) -> usize {
        self.entries.lock().expect("rate limit map poisoned").len()
    }

    /// Periodic cleanup task; wakes every ten seconds.
    pub fn spawn_janitor(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                limiter.sweep();
            }
        })
    }
}
