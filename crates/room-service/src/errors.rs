//! Room service error types.
//!
//! Every failure a caller can see maps to one variant here, and every variant
//! maps to an HTTP status through `IntoResponse`. Store failures are logged
//! server-side and reach clients only as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Room service error type.
///
/// Maps to HTTP status codes:
/// - NotFound: 404 Not Found
/// - Unauthenticated, SessionExpired: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - RoomFull: 409 Conflict
/// - BadRequest: 400 Bad Request
/// - Database, Internal: 500 Internal Server Error
///
/// Room code collisions never appear here; the coordinator retries them.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Session expired or deleted: {0}")]
    SessionExpired(String),

    #[error("Room is full: {0}")]
    RoomFull(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RoomError::Database(_) | RoomError::Internal(_) => 500,
            RoomError::NotFound(_) => 404,
            RoomError::Unauthenticated(_) | RoomError::SessionExpired(_) => 401,
            RoomError::Forbidden(_) => 403,
            RoomError::RoomFull(_) => 409,
            RoomError::BadRequest(_) => 400,
        }
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomError::Database(_) => "database",
            RoomError::NotFound(_) => "not_found",
            RoomError::Unauthenticated(_) => "unauthenticated",
            RoomError::Forbidden(_) => "forbidden",
            RoomError::SessionExpired(_) => "session_expired",
            RoomError::RoomFull(_) => "room_full",
            RoomError::BadRequest(_) => "bad_request",
            RoomError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RoomError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            RoomError::Database(err) => {
                tracing::error!(target: "room.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            RoomError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            RoomError::Unauthenticated(reason) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", reason.clone())
            }
            RoomError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            RoomError::SessionExpired(reason) => {
                (StatusCode::UNAUTHORIZED, "SESSION_EXPIRED", reason.clone())
            }
            RoomError::RoomFull(reason) => (StatusCode::CONFLICT, "ROOM_FULL", reason.clone()),
            RoomError::BadRequest(reason) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", reason.clone())
            }
            RoomError::Internal(reason) => {
                tracing::error!(target: "room.internal", reason = %reason, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"listening-room\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}

impl From<sqlx::Error> for RoomError {
    fn from(err: sqlx::Error) -> Self {
        RoomError::Database(err.to_string())
    }
}
