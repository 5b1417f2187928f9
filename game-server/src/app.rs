//! Construction-order wiring of the runtime.
//!
//! Components are built bottom-up: buses and stores first, then the
//! matchmaking layer, then the session service, and finally the two
//! late-binding points (the flow timer handler and the registry's bot
//! fallback) close the loops. Both the binary and the integration tests go
//! through [`build`], so the wiring under test is the wiring that ships.

use crate::ai_opponent::AiOpponent;
use crate::config::Config;
use crate::connections::ConnectionManager;
use crate::event_bus::{InternalBus, OutboundBus};
use crate::flow_timer::FlowTimerService;
use crate::game_store::{GameRepository, GameStore, InMemoryGameRepository};
use crate::handoff::HandoffTokens;
use crate::identity::{
    InMemoryPlayerDirectory, InMemorySessionStore, PlayerDirectory, SessionStore,
};
use crate::match_pool::MatchPool;
use crate::match_registry::MatchRegistry;
use crate::matchmaking_service::MatchmakingService;
use crate::player_stats::PlayerStatsRecorder;
use crate::rate_limiter::RateLimiter;
use crate::session_service::SessionService;
use std::sync::Arc;
use std::time::Duration;

pub struct App {
    pub config: Config,
    pub internal: Arc<InternalBus>,
    pub outbound: Arc<OutboundBus>,
    pub pool: Arc<MatchPool>,
    pub registry: Arc<MatchRegistry>,
    pub matchmaking: Arc<MatchmakingService>,
    pub store: Arc<GameStore>,
    pub repository: Arc<InMemoryGameRepository>,
    pub timers: Arc<FlowTimerService>,
    pub limiter: Arc<RateLimiter>,
    pub sessions: Arc<InMemorySessionStore>,
    pub players: Arc<InMemoryPlayerDirectory>,
    pub session_service: Arc<SessionService>,
    pub connections: Arc<ConnectionManager>,
    pub stats: Arc<PlayerStatsRecorder>,
    pub ai: Arc<AiOpponent>,
    pub handoff: Option<Arc<HandoffTokens>>,
}

pub fn build(config: Config) -> Arc<App> {
    let internal = Arc::new(InternalBus::new());
    let outbound = Arc::new(OutboundBus::new());
    let store = Arc::new(GameStore::new());
    let repository = Arc::new(InMemoryGameRepository::new());
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_window(),
        config.rate_limit_budget,
    ));
    let pool = Arc::new(MatchPool::new());
    let timers = Arc::new(FlowTimerService::new());
    let players = Arc::new(InMemoryPlayerDirectory::new());
    let sessions = Arc::new(InMemorySessionStore::new(chrono::Duration::days(
        config.session_ttl_days,
    )));

    let registry = Arc::new(MatchRegistry::new(
        pool.clone(),
        outbound.clone(),
        config.low_availability(),
        config.bot_fallback(),
    ));
    registry.attach_to_bus(&internal);

    let matchmaking = Arc::new(MatchmakingService::new(
        pool.clone(),
        registry.clone(),
        store.clone(),
        internal.clone(),
        outbound.clone(),
    ));
    registry.bind_fallback(matchmaking.clone());

    let session_service = Arc::new(SessionService::new(
        config.clone(),
        store.clone(),
        repository.clone() as Arc<dyn GameRepository>,
        outbound.clone(),
        internal.clone(),
        timers.clone(),
        limiter.clone(),
        matchmaking.clone(),
        players.clone() as Arc<dyn PlayerDirectory>,
    ));
    // The single late-binding point of the command/timer cycle.
    timers.bind_handler(session_service.clone());

    // Game creation follows every match announcement. The bus handler must
    // not block, so the real work runs on its own task.
    let creator = session_service.clone();
    internal.match_found.subscribe(move |found| {
        let creator = creator.clone();
        let found = found.clone();
        tokio::spawn(async move {
            creator.handle_match_found(found).await;
        });
    });

    let stats = Arc::new(PlayerStatsRecorder::new());
    stats.attach(&internal);

    let ai = AiOpponent::spawn(
        store.clone(),
        &outbound,
        &internal,
        session_service.clone(),
        Duration::from_millis(config.ai_think_millis),
    );

    let connections = Arc::new(ConnectionManager::new(outbound.clone()));
    let handoff = config
        .handoff_secret
        .as_ref()
        .map(|secret| Arc::new(HandoffTokens::new(secret.as_bytes())));

    Arc::new(App {
        config,
        internal,
        outbound,
        pool,
        registry,
        matchmaking,
        store,
        repository,
        timers,
        limiter,
        sessions,
        players,
        session_service,
        connections,
        stats,
        ai,
        handoff,
    })
}

impl App {
    /// Trait-object view of the session store for the transport layer.
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.sessions.clone()
    }

    /// Trait-object view of the player directory.
    pub fn player_directory(&self) -> Arc<dyn PlayerDirectory> {
        self.players.clone()
    }
}
