//! HTTP routes for the room service.
//!
//! Defines the Axum router and application state.

use crate::auth::SessionTokenService;
use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_session};
use crate::services::RoomCoordinator;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Per-request timeout for everything except the event stream.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: PgPool,

    /// Service configuration.
    pub config: Config,

    /// Room session coordinator.
    pub coordinator: RoomCoordinator,
}

/// Build the application routes.
///
/// - `/health`, `/ready`, `/metrics` - public, unversioned
/// - `POST /api/v1/rooms`, `POST /api/v1/rooms/:code/join`,
///   `POST /api/v1/rooms/leave`, `GET /api/v1/listeners/active` - public
/// - everything else under `/api/v1` - requires a session token
///
/// Layers, innermost first: a 30 second timeout (not on the event stream),
/// request tracing, then HTTP metrics for every response.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let tokens: Arc<SessionTokenService> = Arc::new(state.coordinator.tokens().clone());

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/rooms", post(handlers::create_room))
        .route("/api/v1/rooms/leave", post(handlers::leave_room))
        .route("/api/v1/rooms/:code/join", post(handlers::join_room))
        .route("/api/v1/listeners/active", get(handlers::active_listeners))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/api/v1/me", get(handlers::get_me))
        .route("/api/v1/rooms/:code", get(handlers::get_room))
        .route(
            "/api/v1/rooms/:code/playing",
            get(handlers::get_playing).put(handlers::set_playing),
        )
        .route(
            "/api/v1/rooms/:code/contents",
            get(handlers::list_contents).post(handlers::add_content),
        )
        .route(
            "/api/v1/rooms/:code/contents/:uuid",
            delete(handlers::remove_content),
        )
        .route("/api/v1/rooms/:code/heartbeat", post(handlers::heartbeat))
        .route("/api/v1/rooms/:code/reactions", post(handlers::send_reaction))
        .route_layer(middleware::from_fn_with_state(
            tokens.clone(),
            require_session,
        ))
        .with_state(state.clone());

    // Long-lived: kept out of the timeout layer
    let stream_routes = Router::new()
        .route("/api/v1/rooms/:code/events", get(handlers::room_events))
        .route_layer(middleware::from_fn_with_state(tokens, require_session))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .merge(stream_routes)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
