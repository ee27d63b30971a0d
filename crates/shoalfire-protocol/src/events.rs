//! Real-time message surface: inbound commands and outbound events.
//!
//! Both directions are tagged unions — one concrete payload shape per
//! discriminator value — rather than a bag of optional fields. Inbound
//! frames are [`ClientCommand`] (tagged by `cmd`), outbound frames are
//! [`ServerEvent`] (tagged by `event`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{Player, Profile, Room, RoomId, UserId};

// ---------------------------------------------------------------------------
// Game event payloads
// ---------------------------------------------------------------------------

/// Category of a generic in-round game event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventKind {
    FishCaught,
    ItemUsed,
    SpecialEvent,
}

/// A generic in-round event submitted by a player.
///
/// Broadcast verbatim to the room; it carries no authority over score
/// (score changes go through the explicit score-update call).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    #[serde(rename = "type")]
    pub kind: GameEventKind,
    pub target_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

/// A game event with the acting user's identity attached, as fanned out
/// to the room and recorded in game results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEventWithUser {
    #[serde(flatten)]
    pub event: GameEvent,
    pub user_id: UserId,
    pub nickname: String,
}

// ---------------------------------------------------------------------------
// Fish payloads (host-simulated)
// ---------------------------------------------------------------------------

/// Movement pattern a fish follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FishBehaviorKind {
    Normal,
    Schooling,
    Escape,
    Aggressive,
    Zigzag,
}

/// A point on a fish path, with the time offset it is reached at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    /// Milliseconds from path start.
    pub time: f64,
}

/// Behavior tuning knobs; which ones apply depends on the behavior kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_player_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

/// A behavior assignment for a fish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishBehavior {
    #[serde(rename = "type")]
    pub kind: FishBehaviorKind,
    pub params: BehaviorParams,
}

/// A fish spawned by the host simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishData {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u32,
    pub path: Vec<PathPoint>,
    pub hp: u32,
    pub speed: f64,
    pub behavior: FishBehavior,
}

/// A mid-flight behavior change for an already-spawned fish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishBehaviorUpdate {
    pub id: String,
    pub behavior: FishBehavior,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<Vec<PathPoint>>,
}

// ---------------------------------------------------------------------------
// Bullet payloads
// ---------------------------------------------------------------------------

/// A 2D point in play-field coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// What happens when two bullets meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionEffect {
    Cancel,
    Continue,
    Reflect,
    Explode,
}

/// A shot fired by a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootBullet {
    pub bullet_id: String,
    pub angle: f64,
    pub power: f64,
    pub weapon_type: u32,
    pub position: Point,
    pub client_time: u64,
}

/// A host-confirmed bullet/bullet collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletCollision {
    pub bullet_id1: String,
    pub bullet_id2: String,
    pub player_id1: UserId,
    pub player_id2: UserId,
    pub position: Point,
    pub effect: CollisionEffect,
}

/// A host-confirmed bullet/fish collision result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FishCollision {
    pub bullet_id: String,
    pub player_id: UserId,
    pub fish_id: String,
    pub position: Point,
    pub damage: f64,
    pub killed: bool,
    pub score: i64,
}

// ---------------------------------------------------------------------------
// Game results
// ---------------------------------------------------------------------------

/// One player's final standing in a finished game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResult {
    pub user_id: UserId,
    pub nickname: String,
    pub score: i64,
    /// 1-based rank by descending score; ties keep join order.
    pub rank: u32,
    /// Ordered events this player produced during the game.
    pub events: Vec<GameEventWithUser>,
}

/// A matched player as announced in `match_found`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPlayer {
    pub user_id: UserId,
    pub nickname: String,
    pub avatar_url: String,
}

impl MatchedPlayer {
    /// Builds the announcement entry from a user id and profile.
    pub fn new(user_id: UserId, profile: &Profile) -> Self {
        Self {
            user_id,
            nickname: profile.nickname.clone(),
            avatar_url: profile.avatar_url.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------

/// Commands a client can send over the real-time channel.
///
/// The first frame on any connection must be `hello`; everything else is
/// rejected until the token is verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Authentication handshake carrying the signed session token.
    Hello { token: String },
    /// Attach this connection to a room the user is a member of.
    JoinRoom { room_id: RoomId },
    /// Leave the current room.
    LeaveRoom,
    /// Toggle readiness while the room is waiting.
    SetReady { is_ready: bool },
    /// Host only: start the game.
    StartGame,
    /// Signal readiness for another round in a finished room.
    ReadyForNextGame,
    /// Submit a generic in-round event for fan-out.
    GameEvent { event: GameEvent },
    /// Apply an additive score delta for the sender.
    UpdateScore { delta: i64 },
    /// Announce the sender's chosen weapon.
    PlayerInit { weapon_type: u32 },
    /// Fire a bullet.
    Shoot { bullet: ShootBullet },
    /// Host only: spawn a wave of fish.
    SpawnFish { fishes: Vec<FishData> },
    /// Host only: retarget fish behaviors.
    UpdateFishBehavior { fishes: Vec<FishBehaviorUpdate> },
    /// Host only: confirm bullet/bullet collisions.
    BulletCollision { bullets: Vec<BulletCollision> },
    /// Host only: confirm bullet/fish collision results.
    FishCollision { collisions: Vec<FishCollision> },
    /// Withdraw from the matchmaking queue.
    CancelMatch,
    /// Host only: end the game before the clock runs out.
    EndGame,
    /// Keep-alive ping.
    Heartbeat { client_time: u64 },
    /// Query the sender's connection/room status.
    Status,
}

// ---------------------------------------------------------------------------
// Outbound events
// ---------------------------------------------------------------------------

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Handshake accepted; the connection is now authenticated.
    Welcome { user_id: UserId, nickname: String },
    /// Per-command acknowledgment. `success = false` carries a stable
    /// error code plus a human-readable message.
    Ack {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    // -- Room lifecycle --
    RoomCreated { room: Room },
    RoomUpdated { room: Room },
    UserJoined { user_id: UserId, nickname: String },
    UserLeft { user_id: UserId },

    // -- Game lifecycle --
    CountdownTick { count: u32 },
    GameStarted,
    TimeTick { remaining: u32, total: u32 },
    ScoreUpdated {
        user_id: UserId,
        delta: i64,
        players: Vec<Player>,
    },
    GameEvent {
        #[serde(flatten)]
        game: GameEventWithUser,
    },
    PlayerInit { user_id: UserId, weapon_type: u32 },
    Shot { user_id: UserId, bullet: ShootBullet },
    FishSpawned { fishes: Vec<FishData> },
    FishBehaviorUpdated { fishes: Vec<FishBehaviorUpdate> },
    BulletCollided { bullets: Vec<BulletCollision> },
    FishCollided { collisions: Vec<FishCollision> },
    GameEnded {
        game_id: Uuid,
        duration: u64,
        player_results: Vec<PlayerResult>,
        winner_id: UserId,
    },

    // -- Matchmaking --
    MatchFound {
        room_id: RoomId,
        room_code: String,
        ready_deadline_secs: u32,
        players: Vec<MatchedPlayer>,
    },
    MatchReadyTick { remaining: u32 },
    MatchCancelled {
        reason: String,
        not_ready: Vec<UserId>,
    },

    // -- Connection --
    HeartbeatAck { client_time: u64, server_time: u64 },
    StatusReport {
        user_id: UserId,
        #[serde(skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        queued: bool,
        server_time: u64,
    },
    Error { code: String, message: String },
}

impl ServerEvent {
    /// A positive acknowledgment.
    pub fn ok() -> Self {
        Self::Ack {
            success: true,
            code: None,
            message: None,
        }
    }

    /// A failure acknowledgment with a stable code and message.
    pub fn fail(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ack {
            success: false,
            code: Some(code.into()),
            message: Some(message.into()),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
