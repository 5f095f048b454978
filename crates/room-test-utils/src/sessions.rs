//! Helpers for tests that drive the coordinator without HTTP.

use common::secret::ExposeSecret;
use room_service::auth::SessionTokenService;
use room_service::services::{AuthenticatedSession, IssuedSession, RoomBus, RoomCoordinator};
use sqlx::PgPool;

/// Signing secret used by every test coordinator and test server.
pub const TEST_TOKEN_SECRET: &str = "room-test-utils-secret-0123456789abcdef";

/// Member cap used when a test does not pick one.
pub const TEST_MEMBER_CAP: i64 = 16;

/// Build a coordinator over `pool` with a fresh bus.
pub fn test_coordinator(pool: PgPool) -> RoomCoordinator {
    test_coordinator_with_cap(pool, TEST_MEMBER_CAP)
}

/// Build a coordinator with a specific member cap.
pub fn test_coordinator_with_cap(pool: PgPool, member_cap: i64) -> RoomCoordinator {
    let tokens = SessionTokenService::new(TEST_TOKEN_SECRET.as_bytes(), 3600, 300);
    RoomCoordinator::new(pool, tokens, RoomBus::default(), member_cap)
}

/// The raw token string of an issued session.
pub fn token_of(session: &IssuedSession) -> &str {
    session.token.token.expose_secret()
}

/// Authorize an issued session for its own room.
///
/// # Panics
///
/// Panics if the session is no longer valid.
pub async fn authenticate(
    coordinator: &RoomCoordinator,
    session: &IssuedSession,
) -> AuthenticatedSession {
    coordinator
        .check_authentication(Some(token_of(session)), &session.room_code)
        .await
        .expect("issued session should authenticate")
}
