//! Repository layer for the room service.
//!
//! Provides database access following the Handler -> Service -> Repository
//! architecture. Functions that take part in a room mutation accept a
//! `&mut PgConnection` so the coordinator can run them inside one transaction;
//! sweeps and global counters take the pool directly.

pub mod contents;
pub mod rooms;
pub mod users;

pub use contents::ContentsRepository;
pub use rooms::RoomsRepository;
pub use users::UsersRepository;

use crate::errors::RoomError;
use crate::observability::metrics;
use std::time::Instant;

/// Record a failed query and convert the error.
pub(crate) fn query_failed(operation: &'static str, start: Instant) -> impl FnOnce(sqlx::Error) -> RoomError {
    move |e| {
        metrics::record_db_query(operation, "error", start.elapsed());
        RoomError::Database(e.to_string())
    }
}

/// Record a successful query.
pub(crate) fn query_succeeded(operation: &'static str, start: Instant) {
    metrics::record_db_query(operation, "success", start.elapsed());
}
