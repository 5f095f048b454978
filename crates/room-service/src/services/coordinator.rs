//! Room session coordinator.
//!
//! Owns every state change of a room: membership, the playback flag, the
//! content queue and listener presence. Each mutation runs in one transaction
//! that starts by locking the room row, reads the resulting snapshot before
//! committing, and publishes exactly one event on the room's topic after the
//! commit succeeds.
//!
//! # Authorization
//!
//! Token decoding and membership checks are two separate steps. A decoded
//! [`SessionClaims`] is never trusted on its own: [`RoomCoordinator::authorize`]
//! re-reads the user and is the only way to obtain an [`AuthenticatedSession`],
//! which every room-scoped mutation requires.

use crate::auth::{IssuedToken, SessionClaims, SessionTokenService};
use crate::errors::RoomError;
use crate::models::{
    validate_content_id, validate_display_name, validate_reaction, validate_room_code,
    ContentType, ContentView, EmojiReaction, MemberView, RoomRow, RoomSnapshot, UserInfo,
    UserState, COLOR_PALETTE, ROOM_CODE_LENGTH,
};
use crate::repositories::{ContentsRepository, RoomsRepository, UsersRepository};
use crate::services::room_bus::{RoomBus, RoomEvent, RoomSubscription};
use ring::rand::{SecureRandom, SystemRandom};
use sqlx::{PgConnection, PgPool};
use tracing::instrument;
use uuid::Uuid;

/// Room code attempts before giving up on create.
const MAX_CODE_COLLISION_RETRIES: usize = 5;

/// Base62 alphabet for room codes.
const BASE62_CHARS: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const INVALID_SESSION_MESSAGE: &str = "Session has ended or the member left the room";

/// Proof that a caller holds a live membership of a room.
///
/// Only [`RoomCoordinator::authorize`] and
/// [`RoomCoordinator::check_authentication`] construct it.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    room_code: String,
    user_uuid: Uuid,
    name: String,
    color: String,
}

impl AuthenticatedSession {
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn user_uuid(&self) -> Uuid {
        self.user_uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> &str {
        &self.color
    }
}

/// A membership created by create or join.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub room_code: String,
    pub user_uuid: Uuid,
    pub token: IssuedToken,
}

/// Result of a leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room_code: String,
    /// True when the leaving member was the last one and the room is gone.
    pub room_deleted: bool,
}

/// Coordinates room state changes and their notifications.
#[derive(Clone)]
pub struct RoomCoordinator {
    pool: PgPool,
    tokens: SessionTokenService,
    bus: RoomBus,
    member_cap: i64,
}

impl RoomCoordinator {
    pub fn new(pool: PgPool, tokens: SessionTokenService, bus: RoomBus, member_cap: i64) -> Self {
        Self {
            pool,
            tokens,
            bus,
            member_cap,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn bus(&self) -> &RoomBus {
        &self.bus
    }

    pub fn tokens(&self) -> &SessionTokenService {
        &self.tokens
    }

    pub fn member_cap(&self) -> i64 {
        self.member_cap
    }

    // ------------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------------

    /// Create a room with a fresh code and make `name` its first member.
    #[instrument(skip_all, name = "room.service.create_room")]
    pub async fn create_room(&self, name: &str) -> Result<(RoomSnapshot, IssuedSession), RoomError> {
        let name = validate_display_name(name)?;
        let mut tx = self.pool.begin().await?;

        let room = insert_with_fresh_code(&mut tx, generate_room_code).await?;

        let user = UsersRepository::insert_user(&mut tx, room.room_id, &name, pick_color()?).await?;
        let token = self.tokens.issue(&room.room_code, user.user_id)?;
        let snapshot = load_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        tracing::info!(
            target: "room.service.coordinator",
            room_code = %room.room_code,
            "Room created"
        );
        self.bus.publish_snapshot(snapshot.clone());

        Ok((
            snapshot,
            IssuedSession {
                room_code: room.room_code,
                user_uuid: user.user_id,
                token,
            },
        ))
    }

    /// Add `name` to an existing room.
    ///
    /// The member count check and the insert happen under the room lock, so
    /// concurrent joins can never push a room past the cap.
    #[instrument(skip_all, name = "room.service.join_room", fields(room_code = %room_code))]
    pub async fn join_room(&self, room_code: &str, name: &str) -> Result<IssuedSession, RoomError> {
        validate_room_code(room_code).map_err(|_| room_not_found())?;
        let name = validate_display_name(name)?;
        let mut tx = self.pool.begin().await?;

        let room = RoomsRepository::lock_by_code(&mut tx, room_code)
            .await?
            .ok_or_else(room_not_found)?;

        let active = UsersRepository::count_active(&mut tx, room.room_id).await?;
        if active >= self.member_cap {
            tracing::debug!(
                target: "room.service.coordinator",
                active,
                cap = self.member_cap,
                "Join rejected, room is full"
            );
            return Err(RoomError::RoomFull(format!(
                "Room {} already has {} members",
                room.room_code, self.member_cap
            )));
        }

        let user = UsersRepository::insert_user(&mut tx, room.room_id, &name, pick_color()?).await?;
        let token = self.tokens.issue(&room.room_code, user.user_id)?;
        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        self.bus.publish_snapshot(snapshot);

        Ok(IssuedSession {
            room_code: room.room_code,
            user_uuid: user.user_id,
            token,
        })
    }

    /// End the membership referenced by `token`.
    ///
    /// The room is deleted when no active member remains; subscribers then
    /// get a single `Closed` event instead of a snapshot.
    #[instrument(skip_all, name = "room.service.leave_room")]
    pub async fn leave_room(&self, token: Option<&str>) -> Result<LeaveOutcome, RoomError> {
        let claims = self.decode_present(token)?;
        let mut tx = self.pool.begin().await?;

        let room = RoomsRepository::lock_by_code(&mut tx, &claims.room_code)
            .await?
            .ok_or_else(session_expired)?;

        let user = UsersRepository::find_with_room(&mut tx, claims.user_uuid)
            .await?
            .ok_or_else(session_expired)?;
        if user.room_id != room.room_id {
            return Err(wrong_room());
        }
        if user.state() == UserState::Departed {
            return Err(session_expired());
        }

        UsersRepository::mark_departed(&mut tx, user.user_id).await?;

        let remaining = UsersRepository::count_active(&mut tx, room.room_id).await?;
        if remaining == 0 {
            RoomsRepository::delete_room(&mut tx, room.room_id).await?;
            tx.commit().await?;

            tracing::info!(
                target: "room.service.coordinator",
                room_code = %room.room_code,
                "Last member left, room deleted"
            );
            self.bus.close_room(&room.room_code);

            return Ok(LeaveOutcome {
                room_code: room.room_code,
                room_deleted: true,
            });
        }

        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;
        self.bus.publish_snapshot(snapshot);

        Ok(LeaveOutcome {
            room_code: room.room_code,
            room_deleted: false,
        })
    }

    /// Leave the room of a token the caller already holds before they move
    /// to another room. Never fails: a stale or foreign token is ignored.
    pub async fn leave_previous_session(&self, token: Option<&str>) {
        if token.is_none() {
            return;
        }
        match self.leave_room(token).await {
            Ok(outcome) => {
                tracing::debug!(
                    target: "room.service.coordinator",
                    room_code = %outcome.room_code,
                    room_deleted = outcome.room_deleted,
                    "Left previous room"
                );
            }
            Err(e) => {
                tracing::debug!(
                    target: "room.service.coordinator",
                    error = %e,
                    "Previous session could not be left, ignoring"
                );
            }
        }
    }

    // ------------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------------

    /// Decode `token` and authorize it for `room_code`.
    pub async fn check_authentication(
        &self,
        token: Option<&str>,
        room_code: &str,
    ) -> Result<AuthenticatedSession, RoomError> {
        let claims = self.decode_present(token)?;
        self.authorize(&claims, room_code).await
    }

    /// Check decoded claims against live membership of `room_code`.
    ///
    /// - `Forbidden` when the token names another room
    /// - `SessionExpired` when the user is gone or has left
    #[instrument(skip_all, name = "room.service.authorize", fields(room_code = %room_code))]
    pub async fn authorize(
        &self,
        claims: &SessionClaims,
        room_code: &str,
    ) -> Result<AuthenticatedSession, RoomError> {
        if claims.room_code != room_code {
            return Err(wrong_room());
        }

        let mut conn = self.pool.acquire().await?;
        let user = UsersRepository::find_with_room(&mut conn, claims.user_uuid)
            .await?
            .ok_or_else(session_expired)?;

        if user.room_code != room_code {
            return Err(wrong_room());
        }
        if user.state() == UserState::Departed {
            return Err(session_expired());
        }

        Ok(AuthenticatedSession {
            room_code: user.room_code,
            user_uuid: user.user_id,
            name: user.name,
            color: user.color,
        })
    }

    /// The caller's own user record, departed or not.
    #[instrument(skip_all, name = "room.service.user_info")]
    pub async fn user_info(&self, claims: &SessionClaims) -> Result<UserInfo, RoomError> {
        let mut conn = self.pool.acquire().await?;
        let user = UsersRepository::find_with_room(&mut conn, claims.user_uuid)
            .await?
            .ok_or_else(|| RoomError::NotFound("User not found".to_string()))?;

        if user.room_code != claims.room_code {
            return Err(wrong_room());
        }

        Ok(UserInfo::from(user))
    }

    // ------------------------------------------------------------------------
    // Room state
    // ------------------------------------------------------------------------

    #[instrument(skip_all, name = "room.service.set_playing")]
    pub async fn set_playing(
        &self,
        session: &AuthenticatedSession,
        playing: bool,
    ) -> Result<bool, RoomError> {
        let mut tx = self.pool.begin().await?;
        let room = RoomsRepository::lock_by_code(&mut tx, &session.room_code)
            .await?
            .ok_or_else(room_not_found)?;

        let stored = RoomsRepository::set_playing(&mut tx, room.room_id, playing)
            .await?
            .ok_or_else(room_not_found)?;
        let room = RoomRow {
            is_playing: stored,
            ..room
        };
        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        self.bus.publish_snapshot(snapshot);
        Ok(stored)
    }

    #[instrument(skip_all, name = "room.service.is_playing")]
    pub async fn is_playing(&self, session: &AuthenticatedSession) -> Result<bool, RoomError> {
        let mut conn = self.pool.acquire().await?;
        let room = RoomsRepository::find_by_code(&mut conn, &session.room_code)
            .await?
            .ok_or_else(room_not_found)?;
        Ok(room.is_playing)
    }

    /// Queue an item authored by the session's user and return the full queue.
    #[instrument(skip_all, name = "room.service.add_content")]
    pub async fn add_content(
        &self,
        session: &AuthenticatedSession,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Vec<ContentView>, RoomError> {
        let content_id = validate_content_id(content_id)?;
        let mut tx = self.pool.begin().await?;

        let room = RoomsRepository::lock_by_code(&mut tx, &session.room_code)
            .await?
            .ok_or_else(room_not_found)?;

        // Membership may have ended between authorization and the lock
        let user = UsersRepository::find_with_room(&mut tx, session.user_uuid)
            .await?
            .ok_or_else(|| RoomError::NotFound("User not found".to_string()))?;
        if user.state() == UserState::Departed {
            return Err(session_expired());
        }

        ContentsRepository::insert_content(
            &mut tx,
            room.room_id,
            user.user_id,
            &content_id,
            content_type,
        )
        .await?;
        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        let contents = snapshot.contents.clone();
        self.bus.publish_snapshot(snapshot);
        Ok(contents)
    }

    /// Remove an item by uuid and return the remaining queue.
    ///
    /// Removing an item that is not queued is not an error and still
    /// notifies subscribers.
    #[instrument(skip_all, name = "room.service.remove_content")]
    pub async fn remove_content(
        &self,
        session: &AuthenticatedSession,
        content_uuid: Uuid,
    ) -> Result<Vec<ContentView>, RoomError> {
        let mut tx = self.pool.begin().await?;
        let room = RoomsRepository::lock_by_code(&mut tx, &session.room_code)
            .await?
            .ok_or_else(room_not_found)?;

        let removed = ContentsRepository::delete_content(&mut tx, room.room_id, content_uuid).await?;
        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        tracing::debug!(target: "room.service.coordinator", removed, "Content removal applied");

        let contents = snapshot.contents.clone();
        self.bus.publish_snapshot(snapshot);
        Ok(contents)
    }

    #[instrument(skip_all, name = "room.service.contents")]
    pub async fn contents(
        &self,
        session: &AuthenticatedSession,
    ) -> Result<Vec<ContentView>, RoomError> {
        Ok(self.room_snapshot(&session.room_code).await?.contents)
    }

    /// Mark the session's user as listening now.
    #[instrument(skip_all, name = "room.service.heartbeat")]
    pub async fn record_heartbeat(&self, session: &AuthenticatedSession) -> Result<(), RoomError> {
        let mut tx = self.pool.begin().await?;
        let room = RoomsRepository::lock_by_code(&mut tx, &session.room_code)
            .await?
            .ok_or_else(room_not_found)?;

        let user = UsersRepository::find_with_room(&mut tx, session.user_uuid)
            .await?
            .ok_or_else(session_expired)?;
        if user.room_id != room.room_id {
            return Err(wrong_room());
        }
        if user.state() == UserState::Departed {
            return Err(session_expired());
        }

        UsersRepository::touch_listening(&mut tx, user.user_id).await?;
        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        self.bus.publish_snapshot(snapshot);
        Ok(())
    }

    /// Current state of a room with members and queue resolved.
    #[instrument(skip_all, name = "room.service.snapshot", fields(room_code = %room_code))]
    pub async fn room_snapshot(&self, room_code: &str) -> Result<RoomSnapshot, RoomError> {
        let mut conn = self.pool.acquire().await?;
        let room = RoomsRepository::find_by_code(&mut conn, room_code)
            .await?
            .ok_or_else(room_not_found)?;
        load_snapshot(&mut conn, &room).await
    }

    /// Publish the current state of a room changed outside the coordinator,
    /// such as by a sweep. Advances the room version like any mutation.
    #[instrument(skip_all, name = "room.service.publish_room_changed", fields(room_code = %room_code))]
    pub async fn publish_room_changed(&self, room_code: &str) -> Result<(), RoomError> {
        let mut tx = self.pool.begin().await?;
        let room = RoomsRepository::lock_by_code(&mut tx, room_code)
            .await?
            .ok_or_else(room_not_found)?;

        let snapshot = load_changed_snapshot(&mut tx, &room).await?;
        tx.commit().await?;

        self.bus.publish_snapshot(snapshot);
        Ok(())
    }

    /// Number of members flagged as listening across all rooms.
    pub async fn active_listener_count(&self) -> Result<i64, RoomError> {
        UsersRepository::count_listening(&self.pool).await
    }

    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    /// Subscribe to the session's room and fetch its current state.
    ///
    /// The subscription is opened before the snapshot is read, so no change
    /// between the two is lost.
    pub async fn subscribe(
        &self,
        session: &AuthenticatedSession,
    ) -> Result<(RoomSubscription, RoomSnapshot), RoomError> {
        let subscription = self.bus.subscribe(&session.room_code);
        let snapshot = self.room_snapshot(&session.room_code).await?;
        Ok((subscription, snapshot))
    }

    /// Relay an emoji reaction to everyone in the room.
    ///
    /// Reactions are not stored. Returns the number of subscriptions reached.
    pub fn send_reaction(
        &self,
        session: &AuthenticatedSession,
        emoji: &str,
        x: f64,
        y: f64,
    ) -> Result<usize, RoomError> {
        validate_reaction(emoji, x, y)?;

        let reaction = EmojiReaction {
            emoji: emoji.to_string(),
            name: session.name.clone(),
            color: session.color.clone(),
            x,
            y,
        };
        Ok(self
            .bus
            .publish(&session.room_code, RoomEvent::Reaction(reaction)))
    }

    fn decode_present(&self, token: Option<&str>) -> Result<SessionClaims, RoomError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RoomError::Unauthenticated("No active session".to_string()))?;
        self.tokens.decode(token)
    }
}

/// Insert a room under the first free code drawn from `next_code`.
///
/// A taken code is not an error: another one is drawn, up to
/// `MAX_CODE_COLLISION_RETRIES` attempts.
async fn insert_with_fresh_code<F>(
    conn: &mut PgConnection,
    mut next_code: F,
) -> Result<RoomRow, RoomError>
where
    F: FnMut() -> Result<String, RoomError>,
{
    for attempt in 1..=MAX_CODE_COLLISION_RETRIES {
        let code = next_code()?;
        if let Some(room) = RoomsRepository::insert_room(&mut *conn, &code).await? {
            return Ok(room);
        }
        tracing::warn!(
            target: "room.service.coordinator",
            attempt,
            "Room code collision, regenerating"
        );
    }

    Err(RoomError::Internal(
        "Failed to generate unique room code".to_string(),
    ))
}

/// Advance the room version and read the resulting snapshot. The caller
/// holds the room lock, so versions follow commit order.
async fn load_changed_snapshot(
    conn: &mut PgConnection,
    room: &RoomRow,
) -> Result<RoomSnapshot, RoomError> {
    let version = RoomsRepository::bump_version(&mut *conn, room.room_id)
        .await?
        .ok_or_else(room_not_found)?;
    let room = RoomRow {
        version,
        ..room.clone()
    };
    load_snapshot(conn, &room).await
}

/// Read a room's members and queue on the given connection.
async fn load_snapshot(conn: &mut PgConnection, room: &RoomRow) -> Result<RoomSnapshot, RoomError> {
    let users = UsersRepository::list_active(&mut *conn, room.room_id).await?;
    let contents = ContentsRepository::list_for_room(&mut *conn, room.room_id)
        .await?
        .into_iter()
        .map(ContentView::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RoomSnapshot {
        code: room.room_code.clone(),
        is_playing: room.is_playing,
        play_time: room.play_time,
        version: room.version,
        created_at: room.created_at,
        users: users.iter().map(MemberView::from).collect(),
        contents,
    })
}

/// Generate a room code: base62 over CSPRNG output.
pub(crate) fn generate_room_code() -> Result<String, RoomError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 8];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(target: "room.service.coordinator", error = %e, "Failed to generate random bytes for room code");
        RoomError::Internal("RNG failure".to_string())
    })?;

    let mut value = u64::from_be_bytes(bytes);
    let mut code = String::with_capacity(ROOM_CODE_LENGTH);
    for _ in 0..ROOM_CODE_LENGTH {
        let idx = (value % 62) as usize;
        let ch = BASE62_CHARS
            .get(idx)
            .ok_or_else(|| RoomError::Internal("Base62 index out of range".to_string()))?;
        code.push(char::from(*ch));
        value /= 62;
    }

    Ok(code)
}

/// Pick a member color from the palette.
fn pick_color() -> Result<&'static str, RoomError> {
    let rng = SystemRandom::new();
    let mut byte = [0u8; 1];
    rng.fill(&mut byte)
        .map_err(|_| RoomError::Internal("RNG failure".to_string()))?;

    let idx = usize::from(u8::from_be_bytes(byte)) % COLOR_PALETTE.len();
    COLOR_PALETTE
        .get(idx)
        .copied()
        .ok_or_else(|| RoomError::Internal("Palette index out of range".to_string()))
}

fn room_not_found() -> RoomError {
    RoomError::NotFound("Room not found".to_string())
}

fn session_expired() -> RoomError {
    RoomError::SessionExpired(INVALID_SESSION_MESSAGE.to_string())
}

fn wrong_room() -> RoomError {
    RoomError::Forbidden("Session belongs to a different room".to_string())
}
