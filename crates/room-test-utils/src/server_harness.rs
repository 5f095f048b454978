//! Test server harness for E2E testing
//!
//! Provides `TestRoomServer` for spawning real room service instances in tests.

use crate::sessions::TEST_TOKEN_SECRET;
use room_service::auth::SessionTokenService;
use room_service::config::Config;
use room_service::observability::metrics::init_metrics_recorder;
use room_service::routes::{self, AppState};
use room_service::services::{RoomBus, RoomCoordinator};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the room service in E2E tests.
///
/// Background sweeps are not started; tests call them directly when needed.
///
/// # Example
/// ```rust,ignore
/// #[sqlx::test(migrations = "../../migrations")]
/// async fn test_create_room(pool: PgPool) -> Result<()> {
///     let server = TestRoomServer::spawn(pool).await?;
///     let response = reqwest::Client::new()
///         .post(format!("{}/api/v1/rooms", server.url()))
///         .json(&serde_json::json!({"name": "Alice"}))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 201);
///     Ok(())
/// }
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    pool: PgPool,
    config: Config,
    coordinator: RoomCoordinator,
    _handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn a server with the default member cap.
    pub async fn spawn(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(pool, HashMap::new()).await
    }

    /// Spawn a server, overriding configuration variables.
    ///
    /// The server binds to a random port on 127.0.0.1 and runs until the
    /// harness is dropped.
    pub async fn spawn_with_vars(
        pool: PgPool,
        overrides: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("ROOM_TOKEN_SECRET".to_string(), TEST_TOKEN_SECRET.to_string()),
        ]);
        vars.extend(overrides);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let tokens = SessionTokenService::new(
            config.token_secret_bytes(),
            config.token_ttl_seconds,
            config.jwt_clock_skew_seconds,
        );
        let coordinator = RoomCoordinator::new(
            pool.clone(),
            tokens,
            RoomBus::default(),
            config.room_member_cap,
        );

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config: config.clone(),
            coordinator: coordinator.clone(),
        });

        // The global recorder can only be installed once per process
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            pool,
            config,
            coordinator,
            _handle: handle,
        })
    }

    /// Get reference to the database pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The coordinator behind the server, sharing its notification bus.
    pub fn coordinator(&self) -> &RoomCoordinator {
        &self.coordinator
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_server_spawns_successfully(pool: PgPool) -> Result<(), anyhow::Error> {
        let server = TestRoomServer::spawn(pool).await?;
        assert!(server.url().starts_with("http://127.0.0.1:"));

        let response = reqwest::get(format!("{}/health", server.url())).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await?, "OK");

        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_server_applies_overrides(pool: PgPool) -> Result<(), anyhow::Error> {
        let server = TestRoomServer::spawn_with_vars(
            pool,
            HashMap::from([("ROOM_MEMBER_CAP".to_string(), "2".to_string())]),
        )
        .await?;

        assert_eq!(server.config().room_member_cap, 2);
        assert_eq!(server.coordinator().member_cap(), 2);

        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_multiple_servers_different_ports(pool: PgPool) -> Result<(), anyhow::Error> {
        let server1 = TestRoomServer::spawn(pool.clone()).await?;
        let server2 = TestRoomServer::spawn(pool).await?;

        assert_ne!(server1.addr(), server2.addr());

        Ok(())
    }
}
