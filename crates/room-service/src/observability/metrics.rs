//! Metric definitions for the room service.
//!
//! Naming follows Prometheus conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: parameterized paths only (room codes and uuids are folded)
//! - `operation`: fixed set of repository operation names
//! - `kind`: `snapshot`, `reaction`, `closed`
//! - `sweep`: `room_retention`, `listener_idle`

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle serving `/metrics`.
///
/// # Errors
///
/// Returns an error if a recorder is already installed for this process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("room_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("room_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `room_http_requests_total`, `room_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("room_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Fold room codes and content uuids out of request paths.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/" | "/health" | "/ready" | "/metrics" | "/api/v1/me" | "/api/v1/rooms"
        | "/api/v1/rooms/leave" | "/api/v1/listeners/active" => path.to_string(),
        _ => normalize_room_endpoint(path),
    }
}

fn normalize_room_endpoint(path: &str) -> String {
    const ROOM_ACTIONS: [&str; 6] = [
        "join",
        "events",
        "playing",
        "contents",
        "heartbeat",
        "reactions",
    ];

    let Some(rest) = path.strip_prefix("/api/v1/rooms/") else {
        return "/other".to_string();
    };
    let parts: Vec<&str> = rest.split('/').collect();

    match parts.as_slice() {
        [code] if !code.is_empty() => "/api/v1/rooms/{code}".to_string(),
        [_, action] if ROOM_ACTIONS.contains(action) => {
            format!("/api/v1/rooms/{{code}}/{action}")
        }
        [_, "contents", _] => "/api/v1/rooms/{code}/contents/{uuid}".to_string(),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record a repository operation.
///
/// Metric: `room_db_query_duration_seconds`, `room_db_queries_total`
/// Labels: `operation`, `status`
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    histogram!("room_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("room_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Notification Bus Metrics
// ============================================================================

/// Record one event published on a room topic.
///
/// Metric: `room_events_published_total`
/// Labels: `kind`
pub fn record_event_published(kind: &'static str, receivers: usize) {
    counter!("room_events_published_total", "kind" => kind).increment(1);
    counter!("room_event_deliveries_total", "kind" => kind).increment(receivers as u64);
}

/// Set the number of live room topics.
///
/// Metric: `room_bus_topics`
pub fn set_bus_topics(count: usize) {
    gauge!("room_bus_topics").set(count as f64);
}

// ============================================================================
// Reaper Metrics
// ============================================================================

/// Record the outcome of one reaper sweep.
///
/// Metric: `room_sweeps_total`, `room_sweep_affected_total`
/// Labels: `sweep`, `status`
pub fn record_sweep(sweep: &'static str, status: &'static str, affected: u64) {
    counter!("room_sweeps_total", "sweep" => sweep, "status" => status).increment(1);
    if affected > 0 {
        counter!("room_sweep_affected_total", "sweep" => sweep).increment(affected);
    }
}
