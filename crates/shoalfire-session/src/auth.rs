//! Authentication hook for resolving a connection to a user.
//!
//! Identity exchange with an external provider (issuing the credential
//! in the first place) is not this crate's job. The server only needs
//! one capability: given an opaque token string, resolve the stable user
//! id and profile it carries — that is the [`Authenticator`] trait. The
//! default implementation is [`TokenIssuer`](crate::TokenIssuer), which
//! verifies the signed session tokens this system issues; tests use
//! cheap stand-ins.

use shoalfire_protocol::{Profile, UserId};

use crate::SessionError;

/// The verified identity carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthClaims {
    /// Stable subject user id.
    pub user_id: UserId,
    /// Profile snapshot embedded in the token.
    pub profile: Profile,
}

/// Validates a client's token and returns who they are.
///
/// `Send + Sync + 'static` so one authenticator can serve every
/// connection task for the lifetime of the server.
pub trait Authenticator: Send + Sync + 'static {
    /// Verifies the given token.
    ///
    /// # Errors
    /// [`SessionError::AuthFailed`] (or a token error) when the token is
    /// invalid, expired, or malformed.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<AuthClaims, SessionError>> + Send;
}
