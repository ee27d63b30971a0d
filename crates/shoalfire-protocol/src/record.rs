//! Durable game-record shape.
//!
//! The record itself is owned by the persistence collaborator; its shape
//! is part of this crate's contract because the game-end broadcast and
//! the stored document share it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::PlayerResult;
use crate::types::RoomId;

/// Immutable result of one finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub id: Uuid,
    pub room_id: RoomId,
    pub room_code: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Whole seconds from start to end.
    pub duration: u64,
    /// All players' results, rank order.
    pub players: Vec<PlayerResult>,
    /// The rank-1 result. Ties break toward earliest join order.
    pub winner: PlayerResult,
}
