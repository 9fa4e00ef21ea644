#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{KeyAssignment, KeyRecord};
use chrono::{DateTime, Utc};
use keybus_core::{CellIndex, KeyCode};
use sqlx::SqlitePool;

/// Data access for the key cells of each room.
pub trait KeyRepository: Send + Sync {
    /// Create missing rows so the room has one row per cell `0..cell_count`.
    async fn ensure_cells(&self, room_id: i64, cell_count: u8) -> StorageResult<()>;

    /// All cells of a room, ordered by cell index.
    async fn find_by_room(&self, room_id: i64) -> StorageResult<Vec<KeyRecord>>;

    async fn find_cell(&self, room_id: i64, cell: CellIndex) -> StorageResult<Option<KeyRecord>>;

    /// Place a key into a cell, replacing whatever it held.
    async fn assign(&self, room_id: i64, assignment: &KeyAssignment) -> StorageResult<()>;

    /// Empty a cell and stamp the removal time.
    async fn clear(&self, room_id: i64, cell: CellIndex, removed_at: DateTime<Utc>)
    -> StorageResult<()>;

    /// Overwrite only the code of a cell with what the controller reported.
    async fn record_code(
        &self,
        room_id: i64,
        cell: CellIndex,
        code: Option<KeyCode>,
    ) -> StorageResult<()>;

    /// Cells on a floor holding a key whose expiry is earlier than `now`.
    async fn find_expired(&self, floor_id: i64, now: DateTime<Utc>)
    -> StorageResult<Vec<KeyRecord>>;
}

/// SQLite implementation of [`KeyRepository`]
#[derive(Debug, Clone)]
pub struct SqliteKeyRepository {
    pool: SqlitePool,
}

impl SqliteKeyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn cell_not_found(room_id: i64, cell: CellIndex) -> StorageError {
    StorageError::not_found("RoomKey", "room_id/cell_index", format!("{room_id}/{cell}"))
}

impl KeyRepository for SqliteKeyRepository {
    async fn ensure_cells(&self, room_id: i64, cell_count: u8) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for cell in 0..cell_count {
            sqlx::query("INSERT OR IGNORE INTO room_keys (room_id, cell_index) VALUES (?, ?)")
                .bind(room_id)
                .bind(i64::from(cell))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_room(&self, room_id: i64) -> StorageResult<Vec<KeyRecord>> {
        let keys = sqlx::query_as::<_, KeyRecord>(
            r#"
            SELECT id, room_id, cell_index, key_code, holder_name,
                   created_at, expires_at, removed_at
            FROM room_keys
            WHERE room_id = ?
            ORDER BY cell_index
            "#,
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn find_cell(&self, room_id: i64, cell: CellIndex) -> StorageResult<Option<KeyRecord>> {
        let key = sqlx::query_as::<_, KeyRecord>(
            r#"
            SELECT id, room_id, cell_index, key_code, holder_name,
                   created_at, expires_at, removed_at
            FROM room_keys
            WHERE room_id = ? AND cell_index = ?
            "#,
        )
        .bind(room_id)
        .bind(i64::from(cell.as_u8()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn assign(&self, room_id: i64, assignment: &KeyAssignment) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE room_keys
            SET key_code = ?, holder_name = ?, created_at = ?,
                expires_at = ?, removed_at = NULL
            WHERE room_id = ? AND cell_index = ?
            "#,
        )
        .bind(assignment.code.to_hex())
        .bind(&assignment.holder_name)
        .bind(assignment.created_at)
        .bind(assignment.expires_at)
        .bind(room_id)
        .bind(i64::from(assignment.cell.as_u8()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(cell_not_found(room_id, assignment.cell));
        }
        Ok(())
    }

    async fn clear(
        &self,
        room_id: i64,
        cell: CellIndex,
        removed_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE room_keys
            SET key_code = NULL, holder_name = NULL, created_at = NULL,
                expires_at = NULL, removed_at = ?
            WHERE room_id = ? AND cell_index = ?
            "#,
        )
        .bind(removed_at)
        .bind(room_id)
        .bind(i64::from(cell.as_u8()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(cell_not_found(room_id, cell));
        }
        Ok(())
    }

    async fn record_code(
        &self,
        room_id: i64,
        cell: CellIndex,
        code: Option<KeyCode>,
    ) -> StorageResult<()> {
        let hex = code.filter(|c| !c.is_empty()).map(|c| c.to_hex());
        let result = sqlx::query(
            "UPDATE room_keys SET key_code = ? WHERE room_id = ? AND cell_index = ?",
        )
        .bind(hex)
        .bind(room_id)
        .bind(i64::from(cell.as_u8()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(cell_not_found(room_id, cell));
        }
        Ok(())
    }

    async fn find_expired(
        &self,
        floor_id: i64,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<KeyRecord>> {
        let keys = sqlx::query_as::<_, KeyRecord>(
            r#"
            SELECT k.id, k.room_id, k.cell_index, k.key_code, k.holder_name,
                   k.created_at, k.expires_at, k.removed_at
            FROM room_keys k
            JOIN rooms r ON r.id = k.room_id
            WHERE r.floor_id = ?
              AND k.key_code IS NOT NULL
              AND k.expires_at IS NOT NULL
            ORDER BY k.room_id, k.cell_index
            "#,
        )
        .bind(floor_id)
        .fetch_all(&self.pool)
        .await?;

        // Compared in Rust; stored timestamps are not guaranteed to sort as text.
        Ok(keys.into_iter().filter(|k| k.is_expired(now)).collect())
    }
}
