//! Content queue repository.

use super::{query_failed, query_succeeded};
use crate::errors::RoomError;
use crate::models::{ContentRow, ContentType};
use sqlx::{PgConnection, Row};
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

pub struct ContentsRepository;

impl ContentsRepository {
    /// Append an item to a room's queue, authored by `user_id`.
    #[instrument(skip_all, name = "room.repo.insert_content")]
    pub async fn insert_content(
        conn: &mut PgConnection,
        room_id: Uuid,
        user_id: Uuid,
        content_id: &str,
        content_type: ContentType,
    ) -> Result<Uuid, RoomError> {
        let start = Instant::now();

        let row = sqlx::query(
            r#"
            INSERT INTO room_contents (content_uuid, room_id, user_id, content_id, content_type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING content_uuid
            "#,
        )
        .bind(Uuid::new_v4()) // $1
        .bind(room_id) // $2
        .bind(user_id) // $3
        .bind(content_id) // $4
        .bind(content_type.as_str()) // $5
        .fetch_one(conn)
        .await
        .map_err(query_failed("insert_content", start))?;

        query_succeeded("insert_content", start);
        Ok(row.get("content_uuid"))
    }

    /// Delete an item from a room's queue.
    ///
    /// Scoped to `room_id` so a member can never remove another room's
    /// content. Returns `false` when nothing matched.
    #[instrument(skip_all, name = "room.repo.delete_content")]
    pub async fn delete_content(
        conn: &mut PgConnection,
        room_id: Uuid,
        content_uuid: Uuid,
    ) -> Result<bool, RoomError> {
        let start = Instant::now();

        let result = sqlx::query(
            r#"
            DELETE FROM room_contents
            WHERE content_uuid = $1 AND room_id = $2
            "#,
        )
        .bind(content_uuid)
        .bind(room_id)
        .execute(conn)
        .await
        .map_err(query_failed("delete_content", start))?;

        query_succeeded("delete_content", start);
        Ok(result.rows_affected() > 0)
    }

    /// A room's queue in insertion order with authors resolved.
    ///
    /// Authors that have left the room are still resolved.
    #[instrument(skip_all, name = "room.repo.list_contents")]
    pub async fn list_for_room(
        conn: &mut PgConnection,
        room_id: Uuid,
    ) -> Result<Vec<ContentRow>, RoomError> {
        let start = Instant::now();

        let rows = sqlx::query(
            r#"
            SELECT c.content_uuid, c.content_id, c.content_type,
                   u.user_id AS author_uuid, u.name AS author_name, u.color AS author_color
            FROM room_contents c
            JOIN room_users u ON u.user_id = c.user_id
            WHERE c.room_id = $1
            ORDER BY c.seq
            "#,
        )
        .bind(room_id)
        .fetch_all(conn)
        .await
        .map_err(query_failed("list_contents", start))?;

        query_succeeded("list_contents", start);
        Ok(rows.into_iter().map(map_row_to_content).collect())
    }
}

/// Map a database row to a ContentRow struct.
pub fn map_row_to_content(row: sqlx::postgres::PgRow) -> ContentRow {
    ContentRow {
        content_uuid: row.get("content_uuid"),
        content_id: row.get("content_id"),
        content_type: row.get("content_type"),
        author_uuid: row.get("author_uuid"),
        author_name: row.get("author_name"),
        author_color: row.get("author_color"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::repositories::{RoomsRepository, UsersRepository};
    use sqlx::PgPool;

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_queue_keeps_insertion_order_and_scopes_deletes(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let room = RoomsRepository::insert_room(&mut conn, "cnt001")
            .await
            .unwrap()
            .unwrap();
        let other = RoomsRepository::insert_room(&mut conn, "cnt002")
            .await
            .unwrap()
            .unwrap();
        let user = UsersRepository::insert_user(&mut conn, room.room_id, "Alice", "2196F3")
            .await
            .unwrap();

        let first = ContentsRepository::insert_content(
            &mut conn,
            room.room_id,
            user.user_id,
            "vid123",
            ContentType::Youtube,
        )
        .await
        .unwrap();
        ContentsRepository::insert_content(
            &mut conn,
            room.room_id,
            user.user_id,
            "track42",
            ContentType::Soundcloud,
        )
        .await
        .unwrap();

        let listed = ContentsRepository::list_for_room(&mut conn, room.room_id)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].content_id, "vid123");
        assert_eq!(listed[1].content_type, "soundcloud");
        assert_eq!(listed[0].author_name, "Alice");

        // Wrong room: nothing happens
        assert!(!ContentsRepository::delete_content(&mut conn, other.room_id, first)
            .await
            .unwrap());
        assert!(ContentsRepository::delete_content(&mut conn, room.room_id, first)
            .await
            .unwrap());
        assert!(!ContentsRepository::delete_content(&mut conn, room.room_id, first)
            .await
            .unwrap());
    }
}
