//! Wire protocol for Shoalfire.
//!
//! This crate defines the language clients and the server speak:
//!
//! - **Documents** ([`Room`], [`Player`], [`GameRecord`], seat layout) —
//!   the domain shapes that travel inside events and persist in stores.
//! - **Messages** ([`ClientCommand`], [`ServerEvent`]) — tagged unions
//!   covering the room, game, and matchmaking surfaces.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — how frames become bytes.
//!
//! The protocol layer knows nothing about connections, rooms' rules, or
//! timers; it is pure data.

mod codec;
mod error;
mod events;
mod record;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use events::{
    BehaviorParams, BulletCollision, ClientCommand, CollisionEffect, FishBehavior,
    FishBehaviorKind, FishBehaviorUpdate, FishCollision, FishData, GameEvent,
    GameEventKind, GameEventWithUser, MatchedPlayer, PathPoint, PlayerResult,
    Point, ServerEvent, ShootBullet,
};
pub use record::GameRecord;
pub use types::{
    Orientation, Player, Profile, Room, RoomId, RoomStatus, RoomSummary, RoomType,
    SEAT_LAYOUTS, SeatLayout, Side, UserId, seat_for_position,
};
