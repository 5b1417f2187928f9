//! The Koi-Koi game session runtime.
//!
//! Layered from the bottom up: the event buses and stores, the matchmaking
//! pool with its countdown registry, the per-game command path of the
//! session service, the timer service driving timeouts, and the websocket
//! transport on top. The pure game rules live in the `hanafuda` crate; the
//! wire contract in `protocol`.

pub mod ai_opponent;
pub mod app;
pub mod config;
pub mod connections;
pub mod errors;
pub mod event_bus;
pub mod event_mapper;
pub mod flow_timer;
pub mod game_store;
pub mod handoff;
pub mod identity;
pub mod match_pool;
pub mod match_registry;
pub mod matchmaking_service;
pub mod player_stats;
pub mod rate_limiter;
pub mod session_service;
pub mod web_socket;
