//! Rooms repository.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - Room codes are unique at the database level; inserts never overwrite

use super::{query_failed, query_succeeded};
use crate::errors::RoomError;
use crate::models::RoomRow;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const ROOM_COLUMNS: &str = "room_id, room_code, is_playing, play_time, version, created_at";

pub struct RoomsRepository;

impl RoomsRepository {
    /// Insert a room with the given code.
    ///
    /// Returns `None` when the code is already taken; the caller picks a new
    /// code and tries again.
    #[instrument(skip_all, name = "room.repo.insert_room")]
    pub async fn insert_room(
        conn: &mut PgConnection,
        room_code: &str,
    ) -> Result<Option<RoomRow>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO rooms (room_id, room_code)
            VALUES ($1, $2)
            ON CONFLICT (room_code) DO NOTHING
            RETURNING {ROOM_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(room_code)
        .fetch_optional(conn)
        .await
        .map_err(query_failed("insert_room", start))?;

        query_succeeded("insert_room", start);
        Ok(row.map(map_row_to_room))
    }

    #[instrument(skip_all, name = "room.repo.find_room")]
    pub async fn find_by_code(
        conn: &mut PgConnection,
        room_code: &str,
    ) -> Result<Option<RoomRow>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE room_code = $1"
        ))
        .bind(room_code)
        .fetch_optional(conn)
        .await
        .map_err(query_failed("find_room", start))?;

        query_succeeded("find_room", start);
        Ok(row.map(map_row_to_room))
    }

    /// Fetch a room and take its row lock until the surrounding transaction
    /// ends. Every mutation of a room's members or queue goes through here
    /// first, so mutations of one room run one at a time.
    #[instrument(skip_all, name = "room.repo.lock_room")]
    pub async fn lock_by_code(
        conn: &mut PgConnection,
        room_code: &str,
    ) -> Result<Option<RoomRow>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE room_code = $1 FOR UPDATE"
        ))
        .bind(room_code)
        .fetch_optional(conn)
        .await
        .map_err(query_failed("lock_room", start))?;

        query_succeeded("lock_room", start);
        Ok(row.map(map_row_to_room))
    }

    /// Set the playback flag. Returns the stored value, or `None` if the room
    /// no longer exists.
    #[instrument(skip_all, name = "room.repo.set_playing")]
    pub async fn set_playing(
        conn: &mut PgConnection,
        room_id: Uuid,
        playing: bool,
    ) -> Result<Option<bool>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            UPDATE rooms
            SET is_playing = $2
            WHERE room_id = $1
            RETURNING is_playing
            "#,
        )
        .bind(room_id)
        .bind(playing)
        .fetch_optional(conn)
        .await
        .map_err(query_failed("set_playing", start))?;

        query_succeeded("set_playing", start);
        Ok(row.map(|r| r.get("is_playing")))
    }

    /// Advance the room's change counter and return the new value, or `None`
    /// if the room no longer exists. Callers hold the room lock.
    #[instrument(skip_all, name = "room.repo.bump_version")]
    pub async fn bump_version(
        conn: &mut PgConnection,
        room_id: Uuid,
    ) -> Result<Option<i64>, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            UPDATE rooms
            SET version = version + 1
            WHERE room_id = $1
            RETURNING version
            "#,
        )
        .bind(room_id)
        .fetch_optional(conn)
        .await
        .map_err(query_failed("bump_version", start))?;

        query_succeeded("bump_version", start);
        Ok(row.map(|r| r.get("version")))
    }

    /// Delete a room; users and contents go with it.
    #[instrument(skip_all, name = "room.repo.delete_room")]
    pub async fn delete_room(conn: &mut PgConnection, room_id: Uuid) -> Result<bool, RoomError> {
        let start = Instant::now();

        let result = sqlx::query("DELETE FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .execute(conn)
            .await
            .map_err(query_failed("delete_room", start))?;

        query_succeeded("delete_room", start);
        Ok(result.rows_affected() > 0)
    }

    /// Delete every room created before `cutoff`, regardless of membership.
    ///
    /// Returns the codes of the deleted rooms. Running it twice deletes
    /// nothing the second time.
    #[instrument(skip_all, name = "room.repo.delete_rooms_created_before")]
    pub async fn delete_created_before(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>, RoomError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            DELETE FROM rooms
            WHERE created_at < $1
            RETURNING room_code
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await
        .map_err(query_failed("delete_rooms_created_before", start))?;

        query_succeeded("delete_rooms_created_before", start);
        Ok(rows.into_iter().map(|r| r.get("room_code")).collect())
    }
}

/// Map a database row to a RoomRow struct.
pub fn map_row_to_room(row: sqlx::postgres::PgRow) -> RoomRow {
    RoomRow {
        room_id: row.get("room_id"),
        room_code: row.get("room_code"),
        is_playing: row.get("is_playing"),
        play_time: row.get("play_time"),
        version: row.get("version"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_insert_room_rejects_duplicate_code(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();

        let first = RoomsRepository::insert_room(&mut conn, "aB3dE9").await.unwrap();
        let room = first.expect("first insert should succeed");
        assert_eq!(room.room_code, "aB3dE9");
        assert!(!room.is_playing);
        assert_eq!(room.play_time, 0);
        assert_eq!(room.version, 0);

        let second = RoomsRepository::insert_room(&mut conn, "aB3dE9").await.unwrap();
        assert!(second.is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_set_playing_and_find(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let room = RoomsRepository::insert_room(&mut conn, "PlAy01")
            .await
            .unwrap()
            .unwrap();

        let stored = RoomsRepository::set_playing(&mut conn, room.room_id, true)
            .await
            .unwrap();
        assert_eq!(stored, Some(true));

        let found = RoomsRepository::find_by_code(&mut conn, "PlAy01")
            .await
            .unwrap()
            .unwrap();
        assert!(found.is_playing);

        assert!(RoomsRepository::find_by_code(&mut conn, "nope00")
            .await
            .unwrap()
            .is_none());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_bump_version_increments(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let room = RoomsRepository::insert_room(&mut conn, "VeRs01")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            RoomsRepository::bump_version(&mut conn, room.room_id).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            RoomsRepository::bump_version(&mut conn, room.room_id).await.unwrap(),
            Some(2)
        );
        assert_eq!(
            RoomsRepository::bump_version(&mut conn, Uuid::new_v4()).await.unwrap(),
            None
        );

        let found = RoomsRepository::find_by_code(&mut conn, "VeRs01")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.version, 2);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_delete_created_before_only_removes_old_rooms(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        RoomsRepository::insert_room(&mut conn, "old001").await.unwrap();
        RoomsRepository::insert_room(&mut conn, "new001").await.unwrap();
        sqlx::query("UPDATE rooms SET created_at = NOW() - INTERVAL '3 days' WHERE room_code = 'old001'")
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        let cutoff = Utc::now() - Duration::days(2);
        let deleted = RoomsRepository::delete_created_before(&pool, cutoff).await.unwrap();
        assert_eq!(deleted, vec!["old001".to_string()]);

        let again = RoomsRepository::delete_created_before(&pool, cutoff).await.unwrap();
        assert!(again.is_empty());
    }
}
