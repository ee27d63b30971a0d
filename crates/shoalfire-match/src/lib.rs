//! Matchmaking queue for Shoalfire.
//!
//! A FIFO pool of players awaiting automatic grouping into a room,
//! stored as a list in the shared key/value store. The server's
//! matchmaker drains it in capacity-sized batches on a fixed tick; this
//! crate owns only the queue discipline (ordering, idempotence, atomic
//! batch removal), not room formation.

mod error;
mod queue;

pub use error::MatchError;
pub use queue::{MatchQueue, MatchingPlayer};
