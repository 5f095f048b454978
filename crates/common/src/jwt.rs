//! Session token limits and claim checks shared by token issuers and verifiers.
//!
//! Signature verification itself lives with the service that owns the signing
//! key. This module holds the checks that run around it:
//! - size limit applied before any parsing
//! - clock skew bounds for `iat` validation
//! - minimum length for HMAC signing secrets
//!
//! Error messages are generic on purpose. Callers log the variant at debug
//! level and hand clients a single "invalid or expired" message.

use std::time::Duration;
use thiserror::Error;

/// Maximum accepted token size in bytes (8KB).
///
/// Session tokens carry two short claims plus `iat`/`exp`, so a real token is
/// well under 400 bytes. Anything above this limit is rejected before base64
/// decoding or signature work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for `iat` (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound for a configured clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

/// Minimum length of an HMAC signing secret in bytes (256 bits).
pub const MIN_HMAC_SECRET_BYTES: usize = 32;

/// Errors raised by the pre- and post-verification checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("The session token is invalid or expired")]
    TokenTooLarge,

    /// Token is not three dot-separated segments.
    #[error("The session token is invalid or expired")]
    MalformedToken,

    /// Token `iat` is further in the future than the allowed skew.
    #[error("The session token is invalid or expired")]
    IatTooFarInFuture,
}

/// Reject oversized or structurally broken tokens before any decoding.
///
/// # Errors
///
/// - `TokenTooLarge` when the token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` when the token is empty or not `header.payload.signature`
pub fn check_token_shape(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let segments = token.split('.').count();
    if segments != 3 || token.split('.').any(str::is_empty) {
        tracing::debug!(
            target: "common.jwt",
            segments,
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::MalformedToken);
    }

    Ok(())
}

/// Validate the `iat` claim against the current time with skew tolerance.
///
/// # Errors
///
/// Returns `IatTooFarInFuture` if `iat` is more than `clock_skew` ahead of now.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic variant of [`validate_iat`] for boundary tests.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // clock_skew is bounded by MAX_CLOCK_SKEW
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now + clock_skew_secs;

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}
