//! Error types for the room layer.

use shoalfire_protocol::{RoomId, RoomStatus, UserId};
use shoalfire_store::StoreError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this id.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// No live room with this join code.
    #[error("no room with code {0}")]
    UnknownCode(String),

    /// The user is already a member of some other unfinished room.
    #[error("user {0} is already in room {1}")]
    AlreadyInRoom(UserId, RoomId),

    /// The user is already a member of the room they tried to join.
    #[error("user {0} is already in this room")]
    AlreadyInThisRoom(UserId, RoomId),

    /// No free player slot left.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The room has started playing or already finished.
    #[error("room {0} has already started or finished")]
    RoomClosed(RoomId),

    /// The user is not a member of this room.
    #[error("user {0} is not in room {1}")]
    UserNotInRoom(UserId, RoomId),

    /// Only the host may perform this operation.
    #[error("user {0} is not the host of room {1}")]
    NotHost(UserId, RoomId),

    /// `start_game` on a room that is already playing.
    #[error("game in room {0} has already started")]
    GameAlreadyStarted(RoomId),

    /// `end_game` on a room that is not playing.
    #[error("room {0} is not playing")]
    RoomNotPlaying(RoomId),

    /// A public game cannot start until every non-host player is ready.
    #[error("not all players in room {0} are ready")]
    PlayersNotReady(RoomId),

    /// Too few players to start.
    #[error("not enough players in room {0}")]
    NotEnoughPlayers(RoomId),

    /// The room's status does not permit this operation.
    #[error("room {room} is {status}: {operation} not allowed")]
    InvalidState {
        room: RoomId,
        status: RoomStatus,
        operation: &'static str,
    },

    /// Could not find an unused six-digit code within the retry bound.
    #[error("could not allocate a unique room code")]
    CodeAllocation,

    /// The lock/key-value backend failed; the operation was aborted
    /// without touching room state.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// A stable machine-readable code for acks and synchronous error
    /// payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::UnknownCode(_) => "room_not_found",
            Self::AlreadyInRoom(..) => "already_in_room",
            Self::AlreadyInThisRoom(..) => "already_in_this_room",
            Self::RoomFull(_) => "room_full",
            Self::RoomClosed(_) => "room_closed",
            Self::UserNotInRoom(..) => "user_not_in_room",
            Self::NotHost(..) => "not_host",
            Self::GameAlreadyStarted(_) => "game_already_started",
            Self::RoomNotPlaying(_) => "room_not_playing",
            Self::PlayersNotReady(_) => "players_not_ready",
            Self::NotEnoughPlayers(_) => "not_enough_players",
            Self::InvalidState { .. } => "invalid_room_state",
            Self::CodeAllocation => "code_allocation",
            Self::Store(_) => "store_unavailable",
        }
    }

    /// `true` for conditions the client can fix by changing its request;
    /// `false` for server-side trouble worth retrying.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::CodeAllocation | Self::Store(_))
    }
}
