//! Signed session tokens.
//!
//! HS256 JWTs carrying the subject user id and profile. The same struct
//! both issues tokens (after the external identity exchange resolves a
//! user) and verifies them on the real-time channel's handshake.

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shoalfire_protocol::{Profile, UserId};

use crate::{AuthClaims, Authenticator, SessionError};

/// Default token lifetime: 7 days.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the user id.
    sub: String,
    nickname: String,
    #[serde(default)]
    avatar_url: String,
    iat: u64,
    exp: u64,
}

/// Issues and verifies session tokens with a shared secret.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
}

impl TokenIssuer {
    /// Creates an issuer from a shared secret with the default lifetime.
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, DEFAULT_TOKEN_TTL_SECS)
    }

    /// Creates an issuer with an explicit token lifetime in seconds.
    pub fn with_ttl(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl_secs,
        }
    }

    /// Issues a signed token for a resolved user.
    pub fn issue(&self, user_id: UserId, profile: &Profile) -> Result<String, SessionError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            sub: user_id.to_string(),
            nickname: profile.nickname.clone(),
            avatar_url: profile.avatar_url.clone(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        Ok(jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &self.encoding,
        )?)
    }

    /// Verifies a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<AuthClaims, SessionError> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)?;
        let user_id = data
            .claims
            .sub
            .parse::<Uuid>()
            .map(UserId)
            .map_err(|_| SessionError::MalformedSubject)?;
        Ok(AuthClaims {
            user_id,
            profile: Profile {
                nickname: data.claims.nickname,
                avatar_url: data.claims.avatar_url,
            },
        })
    }
}

impl Authenticator for TokenIssuer {
    async fn authenticate(&self, token: &str) -> Result<AuthClaims, SessionError> {
        self.verify(token)
    }
}

// =========================================================================
// Tests
// =========================================================================
