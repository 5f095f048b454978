//! Room retention background task.
//!
//! Once a day, at a fixed UTC hour, deletes every room created more than
//! `retention_days` ago regardless of who is still in it. Subscribers of a
//! deleted room receive a `Closed` event and their streams end.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered. A sweep already
//! in progress runs to completion first.

use crate::config::{Config, DEFAULT_ROOM_RETENTION_DAYS, DEFAULT_ROOM_SWEEP_HOUR_UTC};
use crate::errors::RoomError;
use crate::observability::metrics;
use crate::repositories::RoomsRepository;
use crate::services::RoomCoordinator;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

const SWEEP_NAME: &str = "room_retention";

/// Configuration for the room retention task.
#[derive(Debug, Clone)]
pub struct RoomRetentionConfig {
    /// Rooms older than this many days are deleted.
    pub retention_days: i32,
    /// Hour of the day (UTC) the sweep runs at.
    pub sweep_hour_utc: u32,
}

impl Default for RoomRetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_ROOM_RETENTION_DAYS,
            sweep_hour_utc: DEFAULT_ROOM_SWEEP_HOUR_UTC,
        }
    }
}

impl From<&Config> for RoomRetentionConfig {
    fn from(config: &Config) -> Self {
        Self {
            retention_days: config.room_retention_days,
            sweep_hour_utc: config.room_sweep_hour_utc,
        }
    }
}

/// Start the room retention background task.
///
/// Sleeps until the next occurrence of `sweep_hour_utc`, sweeps, and repeats
/// until the cancellation token is triggered.
#[instrument(skip_all, name = "room.task.room_retention")]
pub async fn start_room_retention(
    coordinator: RoomCoordinator,
    config: RoomRetentionConfig,
    cancel_token: CancellationToken,
) {
    info!(
        target: "room.task.room_retention",
        retention_days = config.retention_days,
        sweep_hour_utc = config.sweep_hour_utc,
        "Starting room retention task"
    );

    loop {
        let delay = delay_until_next_run(Utc::now(), config.sweep_hour_utc);

        tokio::select! {
            () = tokio::time::sleep(delay) => {
                run_retention_sweep(&coordinator, &config).await;
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "room.task.room_retention",
                    "Room retention task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "room.task.room_retention", "Room retention task stopped");
}

/// Time from `now` until the next `hour:00:00` UTC, strictly in the future.
pub fn delay_until_next_run(now: DateTime<Utc>, hour: u32) -> Duration {
    let Some(today) = now.date_naive().and_hms_opt(hour, 0, 0) else {
        return Duration::from_secs(24 * 60 * 60);
    };

    let mut next = today.and_utc();
    if next <= now {
        next += ChronoDuration::days(1);
    }

    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Run one sweep. Failures are logged; the next scheduled run retries.
pub(crate) async fn run_retention_sweep(coordinator: &RoomCoordinator, config: &RoomRetentionConfig) {
    match sweep_expired_rooms(coordinator, config.retention_days, Utc::now()).await {
        Ok(deleted) => {
            metrics::record_sweep(SWEEP_NAME, "success", deleted.len() as u64);
            if !deleted.is_empty() {
                info!(
                    target: "room.task.room_retention",
                    deleted_count = deleted.len(),
                    retention_days = config.retention_days,
                    "Deleted expired rooms"
                );
            }
        }
        Err(e) => {
            metrics::record_sweep(SWEEP_NAME, "error", 0);
            tracing::error!(
                target: "room.task.room_retention",
                error = %e,
                "Room retention sweep failed"
            );
        }
    }
}

/// Delete rooms created before `now - retention_days` and close their topics.
///
/// Returns the codes of the deleted rooms.
pub(crate) async fn sweep_expired_rooms(
    coordinator: &RoomCoordinator,
    retention_days: i32,
    now: DateTime<Utc>,
) -> Result<Vec<String>, RoomError> {
    let cutoff = now - ChronoDuration::days(i64::from(retention_days));
    let deleted = RoomsRepository::delete_created_before(coordinator.pool(), cutoff).await?;

    for room_code in &deleted {
        coordinator.bus().close_room(room_code);
    }

    Ok(deleted)
}
