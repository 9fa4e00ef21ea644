#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::FloorRecord;
use sqlx::SqlitePool;

/// Data access for floors.
pub trait FloorRepository: Send + Sync {
    /// All floors, ordered by id.
    async fn find_all(&self) -> StorageResult<Vec<FloorRecord>>;

    /// The floor served by `port_name`, if configured.
    async fn find_by_port(&self, port_name: &str) -> StorageResult<Option<FloorRecord>>;

    /// Insert a floor. Fails if the port is already used by another floor.
    async fn create(&self, port_name: &str, name: &str) -> StorageResult<FloorRecord>;

    async fn delete(&self, id: i64) -> StorageResult<()>;
}

/// SQLite implementation of [`FloorRepository`]
#[derive(Debug, Clone)]
pub struct SqliteFloorRepository {
    pool: SqlitePool,
}

impl SqliteFloorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl FloorRepository for SqliteFloorRepository {
    async fn find_all(&self) -> StorageResult<Vec<FloorRecord>> {
        let floors = sqlx::query_as::<_, FloorRecord>(
            r#"
            SELECT id, port_name, name
            FROM floors
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(floors)
    }

    async fn find_by_port(&self, port_name: &str) -> StorageResult<Option<FloorRecord>> {
        let floor = sqlx::query_as::<_, FloorRecord>(
            r#"
            SELECT id, port_name, name
            FROM floors
            WHERE port_name = ?
            "#,
        )
        .bind(port_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(floor)
    }

    async fn create(&self, port_name: &str, name: &str) -> StorageResult<FloorRecord> {
        if port_name.trim().is_empty() {
            return Err(StorageError::Validation(
                "floor port name must not be empty".to_string(),
            ));
        }
        if self.find_by_port(port_name).await?.is_some() {
            return Err(StorageError::Validation(format!(
                "port {port_name} is already assigned to a floor"
            )));
        }

        let result = sqlx::query("INSERT INTO floors (port_name, name) VALUES (?, ?)")
            .bind(port_name)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(FloorRecord {
            id: result.last_insert_rowid(),
            port_name: port_name.to_string(),
            name: name.to_string(),
        })
    }

    async fn delete(&self, id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM floors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Floor", "id", id));
        }

        Ok(())
    }
}
