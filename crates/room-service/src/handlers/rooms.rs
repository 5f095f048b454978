//! Room membership and room state handlers.
//!
//! Create and join are public; they hand out the session token both in the
//! body and as the `room_token` cookie. Everything scoped to a room runs
//! behind `require_session` and authorizes the decoded claims against live
//! membership before doing anything else.

use crate::auth::SessionClaims;
use crate::errors::RoomError;
use crate::handlers::parse_body;
use crate::middleware::{clear_session_cookie, extract_session_token, session_cookie};
use crate::models::{
    validate_display_name, validate_room_code, ActiveListenersResponse, CreateRoomRequest,
    CreateRoomResponse, HeartbeatResponse, JoinRoomRequest, LeaveRoomResponse, PlayingResponse,
    ReactionRequest, RoomSnapshot, SessionResponse, SetPlayingRequest,
};
use crate::routes::AppState;
use crate::services::IssuedSession;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use common::secret::ExposeSecret;
use std::sync::Arc;
use tracing::{info, instrument};

fn session_response(session: &IssuedSession) -> SessionResponse {
    SessionResponse {
        room_code: session.room_code.clone(),
        token: session.token.token.expose_secret().to_string(),
        expires_at: session.token.expires_at,
    }
}

// ============================================================================
// Handler: POST /api/v1/rooms
// ============================================================================

/// Handler for POST /api/v1/rooms
///
/// Create a room with the caller as its first member. A session the caller
/// already holds is left first, but only once the request is valid.
///
/// # Response
///
/// - 201 Created: `{roomCode, token, expiresAt, room}` plus `Set-Cookie`
/// - 400 Bad Request: invalid body or name
#[instrument(
    skip_all,
    name = "room.handlers.create_room",
    fields(method = "POST", endpoint = "/api/v1/rooms")
)]
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RoomError> {
    let request: CreateRoomRequest = parse_body(&body)?;
    let name = validate_display_name(&request.name)?;

    state
        .coordinator
        .leave_previous_session(extract_session_token(&headers))
        .await;

    let (room, session) = state.coordinator.create_room(&name).await?;
    let cookie = session_cookie(
        session.token.token.expose_secret(),
        state.coordinator.tokens().ttl_seconds(),
    )?;

    info!(target: "room.handlers.rooms", room_code = %session.room_code, "Room created");

    let body = CreateRoomResponse {
        session: session_response(&session),
        room,
    };
    Ok((StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

// ============================================================================
// Handler: POST /api/v1/rooms/:code/join
// ============================================================================

/// Handler for POST /api/v1/rooms/:code/join
///
/// # Response
///
/// - 200 OK: `{roomCode, token, expiresAt}` plus `Set-Cookie`
/// - 400 Bad Request: invalid body or name
/// - 404 Not Found: unknown room
/// - 409 Conflict: room is full
#[instrument(
    skip_all,
    name = "room.handlers.join_room",
    fields(method = "POST", endpoint = "/api/v1/rooms/{code}/join")
)]
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, RoomError> {
    let request: JoinRoomRequest = parse_body(&body)?;
    validate_room_code(&code)
        .map_err(|_| RoomError::NotFound("Room not found".to_string()))?;
    let name = validate_display_name(&request.name)?;

    state
        .coordinator
        .leave_previous_session(extract_session_token(&headers))
        .await;

    let session = state.coordinator.join_room(&code, &name).await?;
    let cookie = session_cookie(
        session.token.token.expose_secret(),
        state.coordinator.tokens().ttl_seconds(),
    )?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(session_response(&session)),
    )
        .into_response())
}

// ============================================================================
// Handler: POST /api/v1/rooms/leave
// ============================================================================

/// Handler for POST /api/v1/rooms/leave
///
/// # Response
///
/// - 200 OK: `{left, roomCode, roomDeleted}` and the cookie is cleared
/// - 401 Unauthorized: no token, invalid token, or the member already left
#[instrument(
    skip_all,
    name = "room.handlers.leave_room",
    fields(method = "POST", endpoint = "/api/v1/rooms/leave")
)]
pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, RoomError> {
    let outcome = state
        .coordinator
        .leave_room(extract_session_token(&headers))
        .await?;

    let body = LeaveRoomResponse {
        left: true,
        room_code: outcome.room_code,
        room_deleted: outcome.room_deleted,
    };
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(body),
    )
        .into_response())
}

// ============================================================================
// Authenticated room handlers
// ============================================================================

/// Handler for GET /api/v1/rooms/:code
#[instrument(
    skip_all,
    name = "room.handlers.get_room",
    fields(method = "GET", endpoint = "/api/v1/rooms/{code}")
)]
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
) -> Result<Json<RoomSnapshot>, RoomError> {
    let session = state.coordinator.authorize(&claims, &code).await?;
    let snapshot = state.coordinator.room_snapshot(session.room_code()).await?;
    Ok(Json(snapshot))
}

/// Handler for PUT /api/v1/rooms/:code/playing
#[instrument(
    skip_all,
    name = "room.handlers.set_playing",
    fields(method = "PUT", endpoint = "/api/v1/rooms/{code}/playing")
)]
pub async fn set_playing(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
    body: Bytes,
) -> Result<Json<PlayingResponse>, RoomError> {
    let request: SetPlayingRequest = parse_body(&body)?;
    let session = state.coordinator.authorize(&claims, &code).await?;

    let playing = state
        .coordinator
        .set_playing(&session, request.playing)
        .await?;
    Ok(Json(PlayingResponse { playing }))
}

/// Handler for GET /api/v1/rooms/:code/playing
#[instrument(
    skip_all,
    name = "room.handlers.get_playing",
    fields(method = "GET", endpoint = "/api/v1/rooms/{code}/playing")
)]
pub async fn get_playing(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
) -> Result<Json<PlayingResponse>, RoomError> {
    let session = state.coordinator.authorize(&claims, &code).await?;
    let playing = state.coordinator.is_playing(&session).await?;
    Ok(Json(PlayingResponse { playing }))
}

/// Handler for POST /api/v1/rooms/:code/heartbeat
///
/// Marks the caller as listening. Clients call it while playback runs; the
/// listener idle task clears the flag once heartbeats stop.
#[instrument(
    skip_all,
    name = "room.handlers.heartbeat",
    fields(method = "POST", endpoint = "/api/v1/rooms/{code}/heartbeat")
)]
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
) -> Result<Json<HeartbeatResponse>, RoomError> {
    let session = state.coordinator.authorize(&claims, &code).await?;
    state.coordinator.record_heartbeat(&session).await?;
    Ok(Json(HeartbeatResponse { listening: true }))
}

/// Handler for POST /api/v1/rooms/:code/reactions
///
/// # Response
///
/// - 202 Accepted: relayed to current subscribers, not stored
/// - 400 Bad Request: invalid emoji or coordinates
#[instrument(
    skip_all,
    name = "room.handlers.send_reaction",
    fields(method = "POST", endpoint = "/api/v1/rooms/{code}/reactions")
)]
pub async fn send_reaction(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
    body: Bytes,
) -> Result<StatusCode, RoomError> {
    let request: ReactionRequest = parse_body(&body)?;
    let session = state.coordinator.authorize(&claims, &code).await?;

    state
        .coordinator
        .send_reaction(&session, &request.emoji, request.x, request.y)?;
    Ok(StatusCode::ACCEPTED)
}

// ============================================================================
// Handler: GET /api/v1/listeners/active
// ============================================================================

/// Handler for GET /api/v1/listeners/active
///
/// Public count of members currently listening across all rooms.
#[instrument(
    skip_all,
    name = "room.handlers.active_listeners",
    fields(method = "GET", endpoint = "/api/v1/listeners/active")
)]
pub async fn active_listeners(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveListenersResponse>, RoomError> {
    let count = state.coordinator.active_listener_count().await?;
    Ok(Json(ActiveListenersResponse { count }))
}
