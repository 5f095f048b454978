//! HTTP request handlers for the room service.

pub mod contents;
pub mod events;
pub mod health;
pub mod me;
pub mod metrics;
pub mod rooms;

pub use contents::{add_content, list_contents, remove_content};
pub use events::room_events;
pub use health::{health_check, readiness_check};
pub use me::get_me;
pub use metrics::metrics_handler;
pub use rooms::{
    active_listeners, create_room, get_playing, get_room, heartbeat, join_room, leave_room,
    send_reaction, set_playing,
};

use crate::errors::RoomError;
use serde::de::DeserializeOwned;

/// Deserialize a JSON body, answering 400 (not axum's default 422) on failure.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RoomError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "room.handlers", error = %e, "Invalid request body");
        RoomError::BadRequest("Invalid request body".to_string())
    })
}
