//! # Room Test Utilities
//!
//! Shared test utilities for the room service.
//!
//! - Server test harness (`TestRoomServer` for E2E tests)
//! - Session helpers for driving the coordinator directly
//!
//! ## Usage
//!
//! ```rust,ignore
//! use room_test_utils::*;
//!
//! #[sqlx::test(migrations = "../../migrations")]
//! async fn test_example(pool: PgPool) -> Result<()> {
//!     let server = TestRoomServer::spawn(pool).await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(&format!("{}/health", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod sessions;

pub use server_harness::*;
pub use sessions::*;
