//! Content queue handlers.

use crate::auth::SessionClaims;
use crate::errors::RoomError;
use crate::handlers::parse_body;
use crate::models::{AddContentRequest, ContentListResponse};
use crate::routes::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for GET /api/v1/rooms/:code/contents
#[instrument(
    skip_all,
    name = "room.handlers.list_contents",
    fields(method = "GET", endpoint = "/api/v1/rooms/{code}/contents")
)]
pub async fn list_contents(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
) -> Result<Json<ContentListResponse>, RoomError> {
    let session = state.coordinator.authorize(&claims, &code).await?;
    let contents = state.coordinator.contents(&session).await?;
    Ok(Json(ContentListResponse {
        success: true,
        contents,
    }))
}

/// Handler for POST /api/v1/rooms/:code/contents
///
/// Appends an item authored by the caller and returns the whole queue.
#[instrument(
    skip_all,
    name = "room.handlers.add_content",
    fields(method = "POST", endpoint = "/api/v1/rooms/{code}/contents")
)]
pub async fn add_content(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
    body: Bytes,
) -> Result<Json<ContentListResponse>, RoomError> {
    let request: AddContentRequest = parse_body(&body)?;
    let session = state.coordinator.authorize(&claims, &code).await?;

    let contents = state
        .coordinator
        .add_content(&session, &request.content_id, request.content_type)
        .await?;
    Ok(Json(ContentListResponse {
        success: true,
        contents,
    }))
}

/// Handler for DELETE /api/v1/rooms/:code/contents/:uuid
///
/// Succeeds whether or not the item was still queued.
#[instrument(
    skip_all,
    name = "room.handlers.remove_content",
    fields(method = "DELETE", endpoint = "/api/v1/rooms/{code}/contents/{uuid}")
)]
pub async fn remove_content(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path((code, content_uuid)): Path<(String, String)>,
) -> Result<Json<ContentListResponse>, RoomError> {
    let content_uuid = Uuid::parse_str(&content_uuid)
        .map_err(|_| RoomError::BadRequest("Invalid content id".to_string()))?;
    let session = state.coordinator.authorize(&claims, &code).await?;

    let contents = state
        .coordinator
        .remove_content(&session, content_uuid)
        .await?;
    Ok(Json(ContentListResponse {
        success: true,
        contents,
    }))
}
