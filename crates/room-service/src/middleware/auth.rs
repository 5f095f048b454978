//! Session middleware for protected routes.
//!
//! Extracts the session token from `Authorization: Bearer` or, failing that,
//! the `room_token` cookie, decodes it, and stores the [`SessionClaims`] in
//! the request extensions. Decoding only proves the token was issued here;
//! handlers still authorize the claims against live membership.

use crate::auth::{SessionClaims, SessionTokenService};
use crate::errors::RoomError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// Cookie holding the session token for browser clients.
pub const SESSION_COOKIE_NAME: &str = "room_token";

/// Find the session token in a request, preferring the bearer header.
pub fn extract_session_token(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    bearer.or_else(|| {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .find_map(|h| cookie_value(h, SESSION_COOKIE_NAME))
    })
}

/// Value of cookie `name` in a `Cookie` header, if present and non-empty.
fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then_some(value)
    })
}

/// `Set-Cookie` value carrying a freshly issued token.
pub fn session_cookie(token: &str, max_age_seconds: i64) -> Result<HeaderValue, RoomError> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={max_age_seconds}"
    ))
    .map_err(|_| RoomError::Internal("Session token is not a valid header value".to_string()))
}

/// `Set-Cookie` value removing the session cookie.
pub fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("room_token=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

/// Require a decodable session token.
///
/// # Response
///
/// - 401 Unauthorized if the token is missing or fails verification
/// - Otherwise continues with `SessionClaims` in the request extensions
#[instrument(skip_all, name = "room.middleware.session")]
pub async fn require_session(
    State(tokens): State<Arc<SessionTokenService>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, RoomError> {
    let token = extract_session_token(req.headers()).ok_or_else(|| {
        tracing::debug!(target: "room.middleware.auth", "Request carries no session token");
        RoomError::Unauthenticated("Missing session token".to_string())
    })?;

    let claims: SessionClaims = tokens.decode(token)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
