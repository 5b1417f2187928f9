//! One timer slot per game.
//!
//! Starting a timeout replaces whatever was armed for that game; a cancel
//! is best-effort and idempotent. The handler is late-bound once at wiring
//! time: the timer service is built before the session service that uses
//! it, and the session service is handed back in afterwards as the single
//! late-binding point.

use async_trait::async_trait;
use hanafuda::ids::GameId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a fired timer means for the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The pause between installing both players and the first deal.
    StartGrace,
    /// The active player sat on their turn too long; auto-act.
    Action,
    /// The settlement screen ran out; advance the game.
    Display,
}

/// Receiver of fired timers. Implementations log their own failures; a
/// timeout must never take the timer service down.
#[async_trait]
pub trait FlowTimeoutHandler: Send + Sync {
    async fn on_timeout(&self, game_id: GameId, kind: TimeoutKind);
}

struct TimerSlot {
    kind: TimeoutKind,
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct FlowTimerService {
    slots: Mutex<HashMap<GameId, TimerSlot>>,
    handler: OnceLock<Arc<dyn FlowTimeoutHandler>>,
    generations: AtomicU64,
}

impl FlowTimerService {
    pub fn new() -> Self {
        FlowTimerService {
            slots: Mutex::new(HashMap::new()),
            handler: OnceLock::new(),
            generations: AtomicU64::new(1),
        }
    }

    /// Binds the timeout handler. Called exactly once during wiring; a
    /// second call is a programming error and is ignored with a log line.
    pub fn bind_handler(&self, handler: Arc<dyn FlowTimeoutHandler>) {
        if self.handler.set(handler).is_err() {
            tracing::error!("flow timer handler was already bound");
        }
    }

    /// Arms (or re-arms) the game's single timer slot.
    pub fn start_timeout(self: &Arc<Self>, game_id: GameId, kind: TimeoutKind, after: Duration) {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let service = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;

            // Only the newest timer for the game may fire; a re-arm or a
            // cancel in the meantime wins.
            {
                let mut slots = service.slots.lock().expect("timer slots poisoned");
                match slots.get(&game_id) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&game_id);
                    }
                    _ => return,
                }
            }

            let Some(handler) = service.handler.get() else {
                tracing::error!(game = %game_id, "timer fired before a handler was bound");
                return;
            };
            handler.on_timeout(game_id, kind).await;
        });

        let mut slots = self.slots.lock().expect("timer slots poisoned");
        if let Some(previous) = slots.insert(
            game_id,
            TimerSlot {
                kind,
                generation,
                handle,
            },
        ) {
            previous.handle.abort();
        }
    }

    /// Best-effort cancellation; idempotent.
    pub fn cancel_timeout(&self, game_id: GameId) {
        let mut slots = self.slots.lock().expect("timer slots poisoned");
        if let Some(slot) = slots.remove(&game_id) {
            slot.handle.abort();
        }
    }

    /// The kind currently armed for a game, for tests and the status page.
    pub fn armed_kind(&self, game_id: GameId) -> Option<TimeoutKind> {
        self.slots
            .lock()
            .expect("timer slots poisoned")
            .get(&game_id)
            .map(|slot| slot.kind)
    }

    pub fn armed_count(&self) -> usize {
        self.slots.lock().expect("timer slots poisoned").len()
    }
}

impl Default for FlowTimerService {
    fn default() -> Self {
        Self::new()
    }
}
