//! Current member endpoint.

use crate::auth::SessionClaims;
use crate::errors::RoomError;
use crate::models::UserInfo;
use crate::routes::AppState;
use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::instrument;

/// Handler for GET /api/v1/me
///
/// Returns the caller's own member record, including whether it has left.
///
/// # Response
///
/// - 200 OK: member record
/// - 401 Unauthorized: missing or invalid token
/// - 404 Not Found: the member's room no longer exists
#[instrument(
    skip_all,
    name = "room.handlers.me",
    fields(method = "GET", endpoint = "/api/v1/me")
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
) -> Result<Json<UserInfo>, RoomError> {
    let info = state.coordinator.user_info(&claims).await?;
    Ok(Json(info))
}
