//! HMAC-signed session tokens.
//!
//! # Security
//!
//! - Tokens are shape- and size-checked before any decoding
//! - Only HS256 is accepted; the algorithm in the header is not trusted
//! - `exp` is enforced with the configured clock skew as leeway
//! - `iat` too far in the future is rejected
//! - All failures surface as one generic message; details go to debug logs

use crate::auth::claims::SessionClaims;
use crate::errors::RoomError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::jwt::{check_token_shape, validate_iat};
use common::secret::SecretString;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const INVALID_TOKEN_MESSAGE: &str = "The session token is invalid or expired";

/// A freshly signed token and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

/// Issues and decodes room session tokens with a process-wide secret.
#[derive(Clone)]
pub struct SessionTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
    clock_skew_seconds: i64,
}

impl fmt::Debug for SessionTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTokenService")
            .field("keys", &"[REDACTED]")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .finish()
    }
}

impl SessionTokenService {
    pub fn new(secret: &[u8], ttl_seconds: i64, clock_skew_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_seconds,
            clock_skew_seconds,
        }
    }

    /// Token lifetime in seconds, also used as the cookie max-age.
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Sign a token binding `user_uuid` to `room_code`.
    #[instrument(skip_all, name = "room.auth.issue")]
    pub fn issue(&self, room_code: &str, user_uuid: Uuid) -> Result<IssuedToken, RoomError> {
        let now = Utc::now();
        let expires_at = now + ChronoDuration::seconds(self.ttl_seconds);

        let claims = SessionClaims {
            room_code: room_code.to_string(),
            user_uuid,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| {
                tracing::error!(target: "room.auth.token", error = %e, "Failed to sign session token");
                RoomError::Internal("Failed to sign session token".to_string())
            })?;

        Ok(IssuedToken {
            token: SecretString::from(token),
            expires_at,
        })
    }

    /// Verify signature and expiry and return the claims.
    ///
    /// Never consults the store: a token for a departed user still decodes.
    #[instrument(skip_all, name = "room.auth.decode")]
    pub fn decode(&self, token: &str) -> Result<SessionClaims, RoomError> {
        check_token_shape(token).map_err(|e| {
            tracing::debug!(target: "room.auth.token", error = ?e, "Token shape check failed");
            RoomError::Unauthenticated(INVALID_TOKEN_MESSAGE.to_string())
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = self.clock_skew_seconds.max(0) as u64;
        validation.set_required_spec_claims(&["exp", "iat"]);

        let token_data =
            decode::<SessionClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                tracing::debug!(target: "room.auth.token", error = %e, "Token verification failed");
                RoomError::Unauthenticated(INVALID_TOKEN_MESSAGE.to_string())
            })?;

        let skew = Duration::from_secs(self.clock_skew_seconds.max(0) as u64);
        validate_iat(token_data.claims.iat, skew).map_err(|e| {
            tracing::debug!(target: "room.auth.token", error = ?e, "Token iat validation failed");
            RoomError::Unauthenticated(INVALID_TOKEN_MESSAGE.to_string())
        })?;

        Ok(token_data.claims)
    }
}
