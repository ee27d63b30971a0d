//! Unified error type for the Shoalfire server.

use shoalfire_match::MatchError;
use shoalfire_protocol::ProtocolError;
use shoalfire_room::RoomError;
use shoalfire_session::SessionError;
use shoalfire_store::StoreError;
use shoalfire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// A transport-level error (connection, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, token).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (full, not found, invalid state).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A matchmaking-queue error.
    #[error(transparent)]
    Match(#[from] MatchError),

    /// A key/value or persistence backend error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A host-only action was attempted by a non-host connection.
    #[error("operation not allowed")]
    OperationNotAllowed,

    /// The command requires the user to be in a room, and they are not.
    #[error("user is not in any room")]
    NotInRoom,
}

impl ArenaError {
    /// Stable machine-readable code for acks and error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Protocol(_) => "bad_request",
            Self::Session(_) => "unauthorized",
            Self::Room(e) => e.code(),
            Self::Match(MatchError::Store(_)) | Self::Store(_) => "store_unavailable",
            Self::Match(MatchError::Codec(_)) => "internal",
            Self::OperationNotAllowed => "operation_not_allowed",
            Self::NotInRoom => "not_in_room",
        }
    }
}
