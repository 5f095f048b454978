//! Room members repository.
//!
//! Users are never hard-deleted here. Leaving flips `is_deleted`; the row
//! disappears only when its room is deleted.

use super::{query_failed, query_succeeded};
use crate::errors::RoomError;
use crate::models::UserRow;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

pub struct UsersRepository;

impl UsersRepository {
    /// Create an active member of `room_id`.
    #[instrument(skip_all, name = "room.repo.insert_user")]
    pub async fn insert_user(
        conn: &mut PgConnection,
        room_id: Uuid,
        name: &str,
        color: &str,
    ) -> Result<UserRow, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO room_users (user_id, room_id, name, color)
                VALUES ($1, $2, $3, $4)
                RETURNING user_id, room_id, name, color, is_deleted,
                          is_listening, last_listening_at
            )
            SELECT i.*, r.room_code
            FROM inserted i
            JOIN rooms r ON r.room_id = i.room_id
            "#,
        )
        .bind(Uuid::new_v4()) // $1
        .bind(room_id) // $2
        .bind(name) // $3
        .bind(color) // $4
        .fetch_one(conn)
        .await
        .map_err(query_failed("insert_user", start))?;

        query_succeeded("insert_user", start);
        Ok(map_row_to_user(row))
    }

    /// Count members of a room that have not left.
    #[instrument(skip_all, name = "room.repo.count_active_users")]
    pub async fn count_active(conn: &mut PgConnection, room_id: Uuid) -> Result<i64, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS active
            FROM room_users
            WHERE room_id = $1 AND is_deleted = false
            "#,
        )
        .bind(room_id)
        .fetch_one(conn)
        .await
        .map_err(query_failed("count_active_users", start))?;

        query_succeeded("count_active_users", start);
        Ok(row.get("active"))
    }

    /// Find a user, departed or not, together with its room code.
    #[instrument(skip_all, name = "room.repo.find_user")]
    pub async fn find_with_room(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Option<UserRow>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT u.user_id, u.room_id, u.name, u.color, u.is_deleted,
                   u.is_listening, u.last_listening_at, r.room_code
            FROM room_users u
            JOIN rooms r ON r.room_id = u.room_id
            WHERE u.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(query_failed("find_user", start))?;

        query_succeeded("find_user", start);
        Ok(row.map(map_row_to_user))
    }

    /// Mark a member as departed and stop counting it as a listener.
    ///
    /// Returns `false` when the user was already departed.
    #[instrument(skip_all, name = "room.repo.mark_departed")]
    pub async fn mark_departed(conn: &mut PgConnection, user_id: Uuid) -> Result<bool, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            UPDATE room_users
            SET is_deleted = true, is_listening = false
            WHERE user_id = $1 AND is_deleted = false
            "#,
        )
        .bind(user_id)
        .execute(conn)
        .await
        .map_err(query_failed("mark_departed", start))?;

        query_succeeded("mark_departed", start);
        Ok(result.rows_affected() > 0)
    }

    /// Record a heartbeat: listening now.
    #[instrument(skip_all, name = "room.repo.touch_listening")]
    pub async fn touch_listening(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<DateTime<Utc>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            UPDATE room_users
            SET is_listening = true, last_listening_at = NOW()
            WHERE user_id = $1
            RETURNING last_listening_at
            "#,
        )
        .bind(user_id)
        .fetch_one(conn)
        .await
        .map_err(query_failed("touch_listening", start))?;

        query_succeeded("touch_listening", start);
        Ok(row.get("last_listening_at"))
    }

    /// Active members of a room in join order.
    #[instrument(skip_all, name = "room.repo.list_active_users")]
    pub async fn list_active(
        conn: &mut PgConnection,
        room_id: Uuid,
    ) -> Result<Vec<UserRow>, RoomError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT u.user_id, u.room_id, u.name, u.color, u.is_deleted,
                   u.is_listening, u.last_listening_at, r.room_code
            FROM room_users u
            JOIN rooms r ON r.room_id = u.room_id
            WHERE u.room_id = $1 AND u.is_deleted = false
            ORDER BY u.joined_at, u.user_id
            "#,
        )
        .bind(room_id)
        .fetch_all(conn)
        .await
        .map_err(query_failed("list_active_users", start))?;

        query_succeeded("list_active_users", start);
        Ok(rows.into_iter().map(map_row_to_user).collect())
    }

    /// Number of members currently flagged as listening, across all rooms.
    #[instrument(skip_all, name = "room.repo.count_listening")]
    pub async fn count_listening(pool: &PgPool) -> Result<i64, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS listening
            FROM room_users
            WHERE is_listening = true AND is_deleted = false
            "#,
        )
        .fetch_one(pool)
        .await
        .map_err(query_failed("count_listening", start))?;

        query_succeeded("count_listening", start);
        Ok(row.get("listening"))
    }

    /// Clear the listening flag of every member whose last heartbeat is older
    /// than `cutoff`. Members are not removed from their rooms.
    ///
    /// Returns the distinct codes of rooms that had a member cleared.
    #[instrument(skip_all, name = "room.repo.clear_idle_listeners")]
    pub async fn clear_idle_listeners(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, RoomError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            WITH cleared AS (
                UPDATE room_users
                SET is_listening = false
                WHERE is_listening = true
                  AND (last_listening_at IS NULL OR last_listening_at < $1)
                RETURNING room_id
            )
            SELECT DISTINCT r.room_code
            FROM cleared c
            JOIN rooms r ON r.room_id = c.room_id
            ORDER BY r.room_code
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(query_failed("clear_idle_listeners", start))?;

        query_succeeded("clear_idle_listeners", start);
        Ok(rows.into_iter().map(|r| r.get("room_code")).collect())
    }
}

/// Map a database row to a UserRow struct.
pub fn map_row_to_user(row: sqlx::postgres::PgRow) -> UserRow {
    UserRow {
        user_id: row.get("user_id"),
        room_id: row.get("room_id"),
        room_code: row.get("room_code"),
        name: row.get("name"),
        color: row.get("color"),
        is_deleted: row.get("is_deleted"),
        is_listening: row.get("is_listening"),
        last_listening_at: row.get("last_listening_at"),
    }
}
