//! Listener idle background task.
//!
//! Every `sweep_interval_seconds`, clears `is_listening` for members whose
//! last heartbeat is older than `idle_seconds`. Members stay in their rooms.
//! Each room that had a member cleared gets one fresh snapshot.

use crate::config::{Config, DEFAULT_LISTENER_IDLE_SECONDS, DEFAULT_LISTENER_SWEEP_INTERVAL_SECONDS};
use crate::errors::RoomError;
use crate::observability::metrics;
use crate::repositories::UsersRepository;
use crate::services::RoomCoordinator;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const SWEEP_NAME: &str = "listener_idle";

/// Configuration for the listener idle task.
#[derive(Debug, Clone)]
pub struct ListenerIdleConfig {
    /// Seconds without a heartbeat before a member stops counting as listening.
    pub idle_seconds: i64,
    /// Seconds between sweeps.
    pub sweep_interval_seconds: u64,
}

impl Default for ListenerIdleConfig {
    fn default() -> Self {
        Self {
            idle_seconds: DEFAULT_LISTENER_IDLE_SECONDS,
            sweep_interval_seconds: DEFAULT_LISTENER_SWEEP_INTERVAL_SECONDS,
        }
    }
}

impl From<&Config> for ListenerIdleConfig {
    fn from(config: &Config) -> Self {
        Self {
            idle_seconds: config.listener_idle_seconds,
            sweep_interval_seconds: config.listener_sweep_interval_seconds,
        }
    }
}

/// Start the listener idle background task.
#[instrument(skip_all, name = "room.task.listener_idle")]
pub async fn start_listener_idle_sweep(
    coordinator: RoomCoordinator,
    config: ListenerIdleConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "room.task.listener_idle",
        idle_seconds = config.idle_seconds,
        sweep_interval_seconds = config.sweep_interval_seconds,
        "Starting listener idle task"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_listener_sweep(&coordinator, &config).await;
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "room.task.listener_idle",
                    "Listener idle task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "room.task.listener_idle", "Listener idle task stopped");
}

/// Run one sweep. Failures are logged; the next tick retries.
pub(crate) async fn run_listener_sweep(coordinator: &RoomCoordinator, config: &ListenerIdleConfig) {
    match sweep_idle_listeners(coordinator, config.idle_seconds, Utc::now()).await {
        Ok(rooms) => {
            metrics::record_sweep(SWEEP_NAME, "success", rooms.len() as u64);
            if !rooms.is_empty() {
                debug!(
                    target: "room.task.listener_idle",
                    room_count = rooms.len(),
                    "Cleared idle listeners"
                );
            }
        }
        Err(e) => {
            metrics::record_sweep(SWEEP_NAME, "error", 0);
            tracing::error!(
                target: "room.task.listener_idle",
                error = %e,
                "Listener idle sweep failed"
            );
        }
    }
}

/// Clear idle listeners and notify each affected room once.
///
/// Returns the codes of the affected rooms.
pub(crate) async fn sweep_idle_listeners(
    coordinator: &RoomCoordinator,
    idle_seconds: i64,
    now: DateTime<Utc>,
) -> Result<Vec<String>, RoomError> {
    let cutoff = now - ChronoDuration::seconds(idle_seconds);
    let rooms = UsersRepository::clear_idle_listeners(coordinator.pool(), cutoff).await?;

    for room_code in &rooms {
        match coordinator.publish_room_changed(room_code).await {
            Ok(()) => {}
            // Deleted between the update and the read; its topic is already closed
            Err(RoomError::NotFound(_)) => {}
            Err(e) => {
                warn!(
                    target: "room.task.listener_idle",
                    room_code = %room_code,
                    error = %e,
                    "Failed to notify room after clearing listeners"
                );
            }
        }
    }

    Ok(rooms)
}
