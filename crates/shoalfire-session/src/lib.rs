//! Authentication and connection routing for Shoalfire.
//!
//! Two concerns live here:
//!
//! 1. **Who is this connection?** — the [`Authenticator`] trait and the
//!    [`TokenIssuer`] that signs and verifies session tokens carrying
//!    `{subject user id, nickname}`.
//! 2. **Where do events go?** — the [`Router`], which maps authenticated
//!    users to their outbound channels and current rooms and fans room
//!    events out to every attached connection.
//!
//! ```text
//! Server handler (above)  ← authenticates, then routes through Router
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol layer (below)  ← UserId, RoomId, ServerEvent
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod router;
mod token;

pub use auth::{AuthClaims, Authenticator};
pub use error::SessionError;
pub use router::{EventSender, Router};
pub use token::{DEFAULT_TOKEN_TTL_SECS, TokenIssuer};
