//! Room service models.
//!
//! Database rows, the snapshot broadcast to room subscribers, and the JSON
//! request/response bodies of the HTTP surface.

use crate::errors::RoomError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 6;

/// Longest room code accepted on input.
pub const MAX_ROOM_CODE_LENGTH: usize = 16;

/// Maximum display name length in characters.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 36;

/// Maximum external content reference length.
pub const MAX_CONTENT_ID_LENGTH: usize = 64;

/// Maximum emoji payload length in characters.
pub const MAX_EMOJI_LENGTH: usize = 16;

/// Colors handed out to new members, stored without the leading `#`.
pub const COLOR_PALETTE: [&str; 12] = [
    "F44336", "E91E63", "9C27B0", "673AB7", "3F51B5", "2196F3", "00BCD4", "009688", "4CAF50",
    "CDDC39", "FFC107", "FF5722",
];

// ============================================================================
// Domain enums
// ============================================================================

/// Source a queued content item is played from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Youtube,
    Soundcloud,
}

impl ContentType {
    /// Returns the string stored in the `content_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Youtube => "youtube",
            ContentType::Soundcloud => "soundcloud",
        }
    }
}

impl FromStr for ContentType {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" => Ok(ContentType::Youtube),
            "soundcloud" => Ok(ContentType::Soundcloud),
            other => Err(RoomError::BadRequest(format!(
                "Unsupported content type '{}'",
                other
            ))),
        }
    }
}

/// Membership state of a user.
///
/// `Active -> Departed` is the only transition. A departed user keeps its row
/// so the content it queued stays attributed, but it can no longer
/// authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    Active,
    Departed,
}

impl UserState {
    /// Maps the persisted soft-delete flag onto the state machine.
    pub fn from_is_deleted(is_deleted: bool) -> Self {
        if is_deleted {
            UserState::Departed
        } else {
            UserState::Active
        }
    }
}

// ============================================================================
// Database rows
// ============================================================================

/// Room database row.
#[derive(Debug, Clone)]
pub struct RoomRow {
    pub room_id: Uuid,
    pub room_code: String,
    pub is_playing: bool,
    pub play_time: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

/// User database row joined with its room code.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub room_code: String,
    pub name: String,
    pub color: String,
    pub is_deleted: bool,
    pub is_listening: bool,
    pub last_listening_at: Option<DateTime<Utc>>,
}

impl UserRow {
    pub fn state(&self) -> UserState {
        UserState::from_is_deleted(self.is_deleted)
    }
}

/// Content row joined with its author.
#[derive(Debug, Clone)]
pub struct ContentRow {
    pub content_uuid: Uuid,
    pub content_id: String,
    pub content_type: String,
    pub author_uuid: Uuid,
    pub author_name: String,
    pub author_color: String,
}

// ============================================================================
// Snapshot (broadcast payload)
// ============================================================================

/// Full state of a room with members and queue resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub is_playing: bool,
    pub play_time: i32,
    /// Change counter of the room; a higher version is a newer state.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    /// Active members in join order.
    pub users: Vec<MemberView>,
    /// Queued content in insertion order.
    pub contents: Vec<ContentView>,
}

impl RoomSnapshot {
    /// Number of members currently flagged as listening.
    pub fn listening_count(&self) -> usize {
        self.users.iter().filter(|u| u.is_listening).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub uuid: Uuid,
    pub name: String,
    pub color: String,
    pub is_listening: bool,
    pub last_listening_at: Option<DateTime<Utc>>,
}

impl From<&UserRow> for MemberView {
    fn from(row: &UserRow) -> Self {
        Self {
            uuid: row.user_id,
            name: row.name.clone(),
            color: row.color.clone(),
            is_listening: row.is_listening,
            last_listening_at: row.last_listening_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentView {
    pub uuid: Uuid,
    pub content_id: String,
    pub content_type: ContentType,
    pub author: AuthorView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView {
    pub uuid: Uuid,
    pub name: String,
    pub color: String,
}

impl TryFrom<ContentRow> for ContentView {
    type Error = RoomError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let content_type = row.content_type.parse().map_err(|_| {
            RoomError::Internal(format!(
                "Stored content type '{}' is not recognized",
                row.content_type
            ))
        })?;

        Ok(Self {
            uuid: row.content_uuid,
            content_id: row.content_id,
            content_type,
            author: AuthorView {
                uuid: row.author_uuid,
                name: row.author_name,
                color: row.author_color,
            },
        })
    }
}

/// Ephemeral reaction relayed to everyone in a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmojiReaction {
    pub emoji: String,
    pub name: String,
    pub color: String,
    pub x: f64,
    pub y: f64,
}

/// The caller's own membership record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub uuid: Uuid,
    pub name: String,
    pub color: String,
    pub room_code: String,
    pub state: UserState,
    pub is_listening: bool,
    pub last_listening_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for UserInfo {
    fn from(row: UserRow) -> Self {
        Self {
            uuid: row.user_id,
            state: row.state(),
            name: row.name,
            color: row.color,
            room_code: row.room_code,
            is_listening: row.is_listening,
            last_listening_at: row.last_listening_at,
        }
    }
}

// ============================================================================
// Input validation
// ============================================================================

/// Trim and validate a member display name.
pub fn validate_display_name(name: &str) -> Result<String, RoomError> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();

    if length == 0 {
        return Err(RoomError::BadRequest("Name must not be empty".to_string()));
    }
    if length > MAX_DISPLAY_NAME_LENGTH {
        return Err(RoomError::BadRequest(format!(
            "Name must be at most {} characters",
            MAX_DISPLAY_NAME_LENGTH
        )));
    }

    Ok(trimmed.to_string())
}

/// Reject room codes that could never have been generated.
pub fn validate_room_code(code: &str) -> Result<(), RoomError> {
    if code.is_empty()
        || code.len() > MAX_ROOM_CODE_LENGTH
        || !code.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(RoomError::BadRequest("Invalid room code format".to_string()));
    }
    Ok(())
}

/// Validate an external content reference.
pub fn validate_content_id(content_id: &str) -> Result<String, RoomError> {
    let trimmed = content_id.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_CONTENT_ID_LENGTH {
        return Err(RoomError::BadRequest(format!(
            "Content id must be between 1 and {} characters",
            MAX_CONTENT_ID_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate a reaction payload; coordinates are fractions of the player area.
pub fn validate_reaction(emoji: &str, x: f64, y: f64) -> Result<(), RoomError> {
    let length = emoji.chars().count();
    if length == 0 || length > MAX_EMOJI_LENGTH {
        return Err(RoomError::BadRequest(format!(
            "Emoji must be between 1 and {} characters",
            MAX_EMOJI_LENGTH
        )));
    }
    let in_range = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
    if !in_range(x) || !in_range(y) {
        return Err(RoomError::BadRequest(
            "Reaction coordinates must be within [0, 1]".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// HTTP API models
// ============================================================================

/// Request body for `POST /api/v1/rooms`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
}

/// Request body for `POST /api/v1/rooms/:code/join`.
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRoomRequest {
    pub name: String,
}

/// Issued session returned by create and join.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub room_code: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Response body for `POST /api/v1/rooms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub room: RoomSnapshot,
}

/// Response body for `POST /api/v1/rooms/leave`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomResponse {
    pub left: bool,
    pub room_code: String,
    pub room_deleted: bool,
}

/// Request body for `PUT /api/v1/rooms/:code/playing`.
#[derive(Debug, Clone, Deserialize)]
pub struct SetPlayingRequest {
    pub playing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayingResponse {
    pub playing: bool,
}

/// Request body for `POST /api/v1/rooms/:code/contents`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddContentRequest {
    pub content_id: String,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentListResponse {
    pub success: bool,
    pub contents: Vec<ContentView>,
}

/// Request body for `POST /api/v1/rooms/:code/reactions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub listening: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveListenersResponse {
    pub count: i64,
}

/// Readiness check response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    /// Generic message, no infrastructure details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trips_through_column_value() {
        for ty in [ContentType::Youtube, ContentType::Soundcloud] {
            assert_eq!(ty.as_str().parse::<ContentType>().unwrap(), ty);
        }
        assert!(matches!(
            "vimeo".parse::<ContentType>(),
            Err(RoomError::BadRequest(_))
        ));
    }

    #[test]
    fn test_content_type_serializes_lowercase() {
        let json = serde_json::to_string(&ContentType::Soundcloud).unwrap();
        assert_eq!(json, "\"soundcloud\"");
    }

    #[test]
    fn test_user_state_from_flag() {
        assert_eq!(UserState::from_is_deleted(false), UserState::Active);
        assert_eq!(UserState::from_is_deleted(true), UserState::Departed);
    }

    #[test]
    fn test_palette_colors_are_six_hex_digits() {
        for color in COLOR_PALETTE {
            assert_eq!(color.len(), 6);
            assert!(color.chars().all(|c| c.is_ascii_hexdigit()), "{color}");
        }
    }

    #[test]
    fn test_validate_display_name() {
        assert_eq!(validate_display_name("  Alice ").unwrap(), "Alice");
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"a".repeat(MAX_DISPLAY_NAME_LENGTH)).is_ok());
        assert!(validate_display_name(&"a".repeat(MAX_DISPLAY_NAME_LENGTH + 1)).is_err());
        // Counted in characters, not bytes
        assert!(validate_display_name(&"é".repeat(MAX_DISPLAY_NAME_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_room_code() {
        assert!(validate_room_code("aB3dE9").is_ok());
        assert!(validate_room_code("").is_err());
        assert!(validate_room_code("ab-cd").is_err());
        assert!(validate_room_code(&"a".repeat(MAX_ROOM_CODE_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_content_id() {
        assert_eq!(validate_content_id(" dQw4w9WgXcQ ").unwrap(), "dQw4w9WgXcQ");
        assert!(validate_content_id("").is_err());
        assert!(validate_content_id(&"x".repeat(MAX_CONTENT_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_reaction() {
        assert!(validate_reaction("🎉", 0.5, 0.25).is_ok());
        assert!(validate_reaction("", 0.5, 0.5).is_err());
        assert!(validate_reaction("🎉", 1.5, 0.5).is_err());
        assert!(validate_reaction("🎉", 0.5, f64::NAN).is_err());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let snapshot = RoomSnapshot {
            code: "aB3dE9".to_string(),
            is_playing: true,
            play_time: 0,
            version: 3,
            created_at: Utc::now(),
            users: vec![MemberView {
                uuid: Uuid::new_v4(),
                name: "Alice".to_string(),
                color: "2196F3".to_string(),
                is_listening: true,
                last_listening_at: None,
            }],
            contents: vec![],
        };

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["isPlaying"], true);
        assert_eq!(json["playTime"], 0);
        assert_eq!(json["version"], 3);
        assert_eq!(json["users"][0]["isListening"], true);
        assert_eq!(snapshot.listening_count(), 1);
    }

    #[test]
    fn test_create_room_response_flattens_session() {
        let response = CreateRoomResponse {
            session: SessionResponse {
                room_code: "aB3dE9".to_string(),
                token: "t.o.k".to_string(),
                expires_at: Utc::now(),
            },
            room: RoomSnapshot {
                code: "aB3dE9".to_string(),
                is_playing: false,
                play_time: 0,
                version: 0,
                created_at: Utc::now(),
                users: vec![],
                contents: vec![],
            },
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["roomCode"], "aB3dE9");
        assert_eq!(json["token"], "t.o.k");
        assert_eq!(json["room"]["code"], "aB3dE9");
    }
}
