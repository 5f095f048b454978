//! Session token claims.
//!
//! The user uuid is redacted in Debug output so claims can be traced without
//! leaking a bearer-equivalent identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Claims carried by a room session token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Code of the room the session was issued for.
    #[serde(rename = "roomCode")]
    pub room_code: String,

    /// User the session belongs to. Redacted in Debug output.
    #[serde(rename = "userUuid")]
    pub user_uuid: Uuid,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
}

impl fmt::Debug for SessionClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionClaims")
            .field("room_code", &self.room_code)
            .field("user_uuid", &"[REDACTED]")
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}
