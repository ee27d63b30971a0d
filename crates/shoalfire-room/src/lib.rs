//! Room lifecycle management for Shoalfire.
//!
//! The [`RoomRegistry`] is the single owner of Room and Player mutation.
//! Everything else in the system — the connection handlers, the timers,
//! the matchmaker — goes through it, which is what keeps the room
//! invariants enforceable:
//!
//! - exactly one host per non-empty room, matching `host_id`;
//! - player count never exceeds the configured maximum;
//! - a user is in at most one unfinished room system-wide;
//! - status only moves along the state-machine edges.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates, mutates, matches, and sweeps rooms
//! - [`RoomConfig`] — capacity, thresholds, TTLs
//! - [`RoomError`] — the typed failure taxonomy with stable codes

mod config;
mod error;
mod registry;

pub use config::RoomConfig;
pub use error::RoomError;
pub use registry::RoomRegistry;
