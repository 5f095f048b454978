//! Room Service Library
//!
//! Shared listening rooms: a small group joins a room by its short code,
//! queues media, and shares one playback state. The service tracks
//! membership, authorizes every request against it with a signed session
//! token, serializes concurrent changes to a room, pushes every change to
//! the room's subscribers, and reclaims stale rooms and idle listeners.
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/coordinator.rs -> repositories/*.rs
//!                                         |
//!                                         +-> services/room_bus.rs -> SSE subscribers
//! ```
//!
//! # Modules
//!
//! - `auth` - Session token issuing and decoding
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Session extraction and HTTP metrics
//! - `models` - Rows, snapshots and API bodies
//! - `observability` - Prometheus metrics
//! - `repositories` - Database access
//! - `routes` - Axum router setup
//! - `services` - Room coordinator and notification bus
//! - `tasks` - Room retention and listener idle sweeps

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
