//! The JSON wire contract between the game server and its clients.
//! Everything in here is used consistently on both ends of the socket.
//!
//! Inbound traffic is a stream of [`frames::CommandFrame`]s, each answered
//! with exactly one [`frames::CommandResponse`]. Outbound traffic is a
//! stream of [`events::GatewayEvent`]s carrying either matchmaking or game
//! payloads; game state always crosses the wire as the redacted views of
//! [`views`], never as raw snapshots.

pub mod error_codes;
pub mod events;
pub mod frames;
pub mod views;

pub use error_codes::ErrorCode;
pub use events::{EventBody, GameEvent, GatewayEvent, MatchType, MatchmakingEvent};
pub use frames::{Command, CommandFrame, CommandResponse, ContinueDecision, FrameProbe};
