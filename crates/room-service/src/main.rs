//! Room Service
//!
//! Entry point for the shared listening room server.

use room_service::auth::SessionTokenService;
use room_service::config::Config;
use room_service::observability::metrics::init_metrics_recorder;
use room_service::routes::{self, AppState};
use room_service::services::{RoomBus, RoomCoordinator};
use room_service::tasks::{
    start_listener_idle_sweep, start_room_retention, ListenerIdleConfig, RoomRetentionConfig,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        room_member_cap = config.room_member_cap,
        room_retention_days = config.room_retention_days,
        listener_idle_seconds = config.listener_idle_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(&config.database_url, 5);
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    info!("Database connection established");

    let tokens = SessionTokenService::new(
        config.token_secret_bytes(),
        config.token_ttl_seconds,
        config.jwt_clock_skew_seconds,
    );
    let bus = RoomBus::default();
    let coordinator = RoomCoordinator::new(
        db_pool.clone(),
        tokens,
        bus.clone(),
        config.room_member_cap,
    );

    let cancel_token = CancellationToken::new();

    let retention_handle = tokio::spawn(start_room_retention(
        coordinator.clone(),
        RoomRetentionConfig::from(&config),
        cancel_token.child_token(),
    ));
    let listener_handle = tokio::spawn(start_listener_idle_sweep(
        coordinator.clone(),
        ListenerIdleConfig::from(&config),
        cancel_token.child_token(),
    ));

    let bind_address = config.bind_address.clone();

    let state = Arc::new(AppState {
        pool: db_pool,
        config,
        coordinator,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Room Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel_token, bus))
    .await?;

    for (name, handle) in [("room_retention", retention_handle), ("listener_idle", listener_handle)] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }

    info!("Room Service shutdown complete");

    Ok(())
}

/// Wait for SIGTERM or SIGINT, then stop background tasks, end every event
/// stream, and let in-flight requests drain.
async fn shutdown_signal(cancel_token: CancellationToken, bus: RoomBus) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    cancel_token.cancel();
    bus.shutdown();

    let drain_secs: u64 = std::env::var("ROOM_DRAIN_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (ROOM_DRAIN_SECONDS=0)");
    }
}

/// Append a server-side `statement_timeout` to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
