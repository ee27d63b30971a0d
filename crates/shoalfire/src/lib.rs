//! # Shoalfire
//!
//! Server-authoritative backend for a multiplayer fish-shooting arena:
//! room lifecycle, matchmaking, countdown/game clocks, and real-time
//! event fan-out over WebSocket connections.
//!
//! The heavy simulation (fish pathing, collision detection) runs on the
//! room host's client; the server stays the authority on membership,
//! lifecycle, and score. The layers:
//!
//! ```text
//! transport  — WebSocket accept loop, split-half connections
//! protocol   — tagged command/event unions, documents, codec
//! session    — token auth, connection router
//! room       — registry owning all Room mutation
//! match      — FIFO queue in the shared key/value store
//! timer      — cancellable per-room countdowns
//! shoalfire  — this crate: orchestration, handler, server
//! ```

mod api;
mod config;
mod error;
mod game;
mod handler;
mod matchmaker;
mod server;
mod state;

pub use api::ArenaApi;
pub use config::ServerConfig;
pub use error::ArenaError;
pub use game::GameController;
pub use matchmaker::{MatchOutcome, Matchmaker};
pub use server::{ArenaServer, ArenaServerBuilder, drive_timers};
pub use state::ArenaCore;
