//! Error types for the session layer.

/// Errors that can occur during authentication and token handling.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was rejected by the [`Authenticator`](crate::Authenticator):
    /// bad signature, expired, or otherwise unacceptable.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The token failed to encode or decode.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// The token verified but its subject claim is not a valid user id.
    #[error("token subject is not a valid user id")]
    MalformedSubject,
}
