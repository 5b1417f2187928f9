//! Pure game rules for two-player Koi-Koi.
//!
//! Everything in this crate is synchronous and side-effect free. The
//! aggregates ([`game::Game`], [`round::Round`]) are immutable snapshots:
//! every operation validates against the current snapshot and returns a new
//! one together with a report of what happened, or a typed [`RuleError`].
//! The server runtime owns the transition from old snapshot to new snapshot;
//! this crate never talks to a clock, a socket or a random source except
//! where a pre-shuffled deck is handed in.

pub mod auto_action;
pub mod cards;
pub mod game;
pub mod ids;
pub mod round;
pub mod ruleset;
pub mod yaku;

mod error;

pub use error::RuleError;
pub use ids::{GameId, PlayerId};
