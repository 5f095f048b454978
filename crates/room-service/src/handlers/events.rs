//! Room change stream over Server-Sent Events.
//!
//! The stream opens with the current snapshot, then relays the room topic:
//!
//! - `room` - a fresh snapshot after each change
//! - `reaction` - an emoji reaction
//! - `closed` - the room was deleted; the stream ends after it
//!
//! Snapshots from the topic that are not newer than the opening snapshot are
//! skipped, so a client never steps back to an older state.
//!
//! The stream also ends on server shutdown. Closing the connection cancels
//! the subscription.

use crate::auth::SessionClaims;
use crate::errors::RoomError;
use crate::routes::AppState;
use crate::services::RoomEvent;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::{future, stream, Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Interval between keep-alive comments on idle streams.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Handler for GET /api/v1/rooms/:code/events
#[instrument(
    skip_all,
    name = "room.handlers.room_events",
    fields(method = "GET", endpoint = "/api/v1/rooms/{code}/events")
)]
pub async fn room_events(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<SessionClaims>,
    Path(code): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, RoomError> {
    let session = state.coordinator.authorize(&claims, &code).await?;
    let (subscription, snapshot) = state.coordinator.subscribe(&session).await?;

    tracing::debug!(target: "room.handlers.events", room_code = %code, "Event stream opened");

    let opened_at = snapshot.version;
    let events = stream::once(async move { RoomEvent::Snapshot(snapshot) })
        .chain(subscription.filter(move |event| future::ready(is_newer_than(event, opened_at))))
        .map(|event| to_sse_event(&event));

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Whether `event` should follow a snapshot at `version`. Only snapshots
/// carry a version; other events always pass.
pub fn is_newer_than(event: &RoomEvent, version: i64) -> bool {
    match event {
        RoomEvent::Snapshot(snapshot) => snapshot.version > version,
        RoomEvent::Reaction(_) | RoomEvent::Closed { .. } => true,
    }
}

/// Encode a bus event as an SSE frame.
pub fn to_sse_event(event: &RoomEvent) -> Result<Event, axum::Error> {
    match event {
        RoomEvent::Snapshot(snapshot) => Event::default().event("room").json_data(snapshot),
        RoomEvent::Reaction(reaction) => Event::default().event("reaction").json_data(reaction),
        RoomEvent::Closed { room_code } => Event::default()
            .event("closed")
            .json_data(serde_json::json!({ "roomCode": room_code })),
    }
}
