//! Core identity and domain document types.
//!
//! Everything here has a wire representation: rooms and players are sent
//! to clients verbatim inside room-lifecycle events, so the document
//! shapes double as the protocol shapes. Field names serialize in
//! `camelCase` to match the client SDK.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique, stable identifier for a user.
///
/// Newtype over a UUID so a `UserId` can never be confused with a
/// [`RoomId`] in a signature. `#[serde(transparent)]` keeps the wire
/// shape a plain string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Generates a fresh random user id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for a room. Distinct from the human-readable
/// six-digit room code, which is only unique among live rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub Uuid);

impl RoomId {
    /// Generates a fresh random room id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoomId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Public profile data attached to a player wherever they appear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Display nickname.
    pub nickname: String,
    /// Avatar image reference.
    pub avatar_url: String,
}

// ---------------------------------------------------------------------------
// Room type and status
// ---------------------------------------------------------------------------

/// Whether a room participates in automatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// Discoverable and matchable.
    Public,
    /// Joinable only by room code.
    Private,
}

/// The lifecycle state of a room.
///
/// ```text
/// Waiting ──→ Countdown ──→ Playing ──→ Finished
///    ↑ └──────────┘ (players drop below threshold)       │
///    └────────────────────────────────────────────────────┘
///              (all players ready for the next game)
/// ```
///
/// A host may also start a private room directly from `Waiting`
/// (no countdown phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Waiting,
    Countdown,
    Playing,
    Finished,
}

impl RoomStatus {
    /// Returns `true` if new players may join a room in this state.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Waiting | Self::Countdown)
    }

    /// Returns `true` if the room has started or finished a game and
    /// therefore rejects joins.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Playing | Self::Finished)
    }

    /// Returns `true` if transitioning to `target` is a legal edge of
    /// the state machine.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Waiting, Self::Countdown)
                | (Self::Waiting, Self::Playing)
                | (Self::Countdown, Self::Playing)
                | (Self::Countdown, Self::Waiting)
                | (Self::Playing, Self::Finished)
                | (Self::Finished, Self::Waiting)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "waiting",
            Self::Countdown => "countdown",
            Self::Playing => "playing",
            Self::Finished => "finished",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Seat layout
// ---------------------------------------------------------------------------

/// Which table edge a seat faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Top,
    Bottom,
}

/// Which half of the edge a seat occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// A seat in the arena, with its default cannon anchor expressed as a
/// fraction of the play field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatLayout {
    pub id: u8,
    pub orientation: Orientation,
    pub side: Side,
    pub default_x: f64,
    pub default_y: f64,
}

/// The fixed four-seat layout, indexed by position id 1–4.
pub const SEAT_LAYOUTS: [SeatLayout; 4] = [
    SeatLayout {
        id: 1,
        orientation: Orientation::Bottom,
        side: Side::Left,
        default_x: 0.25,
        default_y: 0.95,
    },
    SeatLayout {
        id: 2,
        orientation: Orientation::Bottom,
        side: Side::Right,
        default_x: 0.75,
        default_y: 0.95,
    },
    SeatLayout {
        id: 3,
        orientation: Orientation::Top,
        side: Side::Left,
        default_x: 0.25,
        default_y: 0.05,
    },
    SeatLayout {
        id: 4,
        orientation: Orientation::Top,
        side: Side::Right,
        default_x: 0.75,
        default_y: 0.05,
    },
];

/// Derives `(orientation, side)` from a position id.
///
/// Pure function rather than stored state, so the derived fields can
/// never drift from the position they were assigned from. Returns `None`
/// for ids outside 1–4.
pub fn seat_for_position(position_id: u8) -> Option<(Orientation, Side)> {
    match position_id {
        1 => Some((Orientation::Bottom, Side::Left)),
        2 => Some((Orientation::Bottom, Side::Right)),
        3 => Some((Orientation::Top, Side::Left)),
        4 => Some((Orientation::Top, Side::Right)),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A participant's in-room state, embedded in [`Room`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub user_id: UserId,
    pub nickname: String,
    pub avatar_url: String,
    /// Accumulated score for the current game. Adjusted by deltas,
    /// reset to zero when the player readies up for the next game.
    pub score: i64,
    pub is_ready: bool,
    pub is_host: bool,
    /// Seat assignment, set at game start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    /// Weapon chosen during player init.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon_type: Option<u32>,
}

impl Player {
    /// Creates a fresh non-host player entry from a profile.
    pub fn from_profile(user_id: UserId, profile: &Profile) -> Self {
        Self {
            user_id,
            nickname: profile.nickname.clone(),
            avatar_url: profile.avatar_url.clone(),
            score: 0,
            is_ready: false,
            is_host: false,
            position_id: None,
            orientation: None,
            side: None,
            weapon_type: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// A game session container: a bounded group of players sharing one
/// game lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    /// Human-readable six-digit join code, unique among live rooms.
    pub room_code: String,
    #[serde(rename = "type")]
    pub kind: RoomType,
    pub status: RoomStatus,
    /// Always matches the single player whose `is_host` flag is set.
    pub host_id: UserId,
    /// Players in join order. Seat positions are assigned separately
    /// at game start.
    pub players: Vec<Player>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub current_round: u32,
    pub created_at: DateTime<Utc>,
    /// Garbage-collection deadline for abandoned rooms.
    pub expires_at: DateTime<Utc>,
}

impl Room {
    /// Finds a player entry by user id.
    pub fn player(&self, user_id: UserId) -> Option<&Player> {
        self.players.iter().find(|p| p.user_id == user_id)
    }

    /// Finds a mutable player entry by user id.
    pub fn player_mut(&mut self, user_id: UserId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Returns `true` if the user is a member of this room.
    pub fn contains(&self, user_id: UserId) -> bool {
        self.player(user_id).is_some()
    }
}

/// A condensed room entry for public listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub room_code: String,
    #[serde(rename = "type")]
    pub kind: RoomType,
    pub status: RoomStatus,
    pub player_count: usize,
    pub host_name: String,
    pub created_at: DateTime<Utc>,
}

impl RoomSummary {
    /// Builds a listing entry from a full room document.
    pub fn from_room(room: &Room) -> Self {
        let host_name = room
            .players
            .iter()
            .find(|p| p.is_host)
            .map(|p| p.nickname.clone())
            .unwrap_or_default();
        Self {
            id: room.id,
            room_code: room.room_code.clone(),
            kind: room.kind,
            status: room.status,
            player_count: room.players.len(),
            host_name,
            created_at: room.created_at,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
