//! Middleware for the room service.
//!
//! # Components
//!
//! - `auth` - Session token extraction and decoding for protected routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{
    clear_session_cookie, extract_session_token, require_session, session_cookie,
    SESSION_COOKIE_NAME,
};
pub use http_metrics::http_metrics_middleware;
