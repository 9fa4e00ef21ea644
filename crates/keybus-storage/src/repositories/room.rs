#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{NewRoom, RoomRecord};
use keybus_core::ControllerAddress;
use sqlx::SqlitePool;

/// Data access for rooms.
pub trait RoomRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<RoomRecord>>;

    /// Rooms of a floor, ordered by controller address.
    async fn find_by_floor(&self, floor_id: i64) -> StorageResult<Vec<RoomRecord>>;

    async fn find_by_address(
        &self,
        floor_id: i64,
        address: ControllerAddress,
    ) -> StorageResult<Option<RoomRecord>>;

    /// Insert a room. The address must be free on its floor.
    async fn create(&self, room: &NewRoom) -> StorageResult<RoomRecord>;

    async fn set_online(&self, id: i64, online: bool) -> StorageResult<()>;

    async fn set_protected(&self, id: i64, protected: bool) -> StorageResult<()>;

    async fn set_light(&self, id: i64, light_on: bool) -> StorageResult<()>;

    /// Record a controller's new bus address.
    async fn set_address(&self, id: i64, address: ControllerAddress) -> StorageResult<()>;
}

/// SQLite implementation of [`RoomRepository`]
#[derive(Debug, Clone)]
pub struct SqliteRoomRepository {
    pool: SqlitePool,
}

impl SqliteRoomRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn update_flag(&self, id: i64, column: Flag, value: bool) -> StorageResult<()> {
        let sql = match column {
            Flag::Online => "UPDATE rooms SET online = ? WHERE id = ?",
            Flag::Protected => "UPDATE rooms SET protected = ? WHERE id = ?",
            Flag::Light => "UPDATE rooms SET light_on = ? WHERE id = ?",
        };
        let result = sqlx::query(sql)
            .bind(value)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Room", "id", id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Flag {
    Online,
    Protected,
    Light,
}

impl RoomRepository for SqliteRoomRepository {
    async fn find_by_id(&self, id: i64) -> StorageResult<Option<RoomRecord>> {
        let room = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, floor_id, room_number, controller_address,
                   online, protected, light_on
            FROM rooms
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(room)
    }

    async fn find_by_floor(&self, floor_id: i64) -> StorageResult<Vec<RoomRecord>> {
        let rooms = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, floor_id, room_number, controller_address,
                   online, protected, light_on
            FROM rooms
            WHERE floor_id = ?
            ORDER BY controller_address
            "#,
        )
        .bind(floor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rooms)
    }

    async fn find_by_address(
        &self,
        floor_id: i64,
        address: ControllerAddress,
    ) -> StorageResult<Option<RoomRecord>> {
        let room = sqlx::query_as::<_, RoomRecord>(
            r#"
            SELECT id, floor_id, room_number, controller_address,
                   online, protected, light_on
            FROM rooms
            WHERE floor_id = ? AND controller_address = ?
            "#,
        )
        .bind(floor_id)
        .bind(i64::from(address.as_u8()))
        .fetch_optional(&self.pool)
        .await?;

        Ok(room)
    }

    async fn create(&self, room: &NewRoom) -> StorageResult<RoomRecord> {
        if self
            .find_by_address(room.floor_id, room.controller_address)
            .await?
            .is_some()
        {
            return Err(StorageError::Validation(format!(
                "address {} is already used on floor {}",
                room.controller_address, room.floor_id
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO rooms (
                floor_id, room_number, controller_address, online, protected
            )
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(room.floor_id)
        .bind(room.room_number)
        .bind(i64::from(room.controller_address.as_u8()))
        .bind(room.online)
        .bind(room.protected)
        .execute(&self.pool)
        .await?;

        Ok(RoomRecord {
            id: result.last_insert_rowid(),
            floor_id: room.floor_id,
            room_number: room.room_number,
            controller_address: i64::from(room.controller_address.as_u8()),
            online: room.online,
            protected: room.protected,
            light_on: false,
        })
    }

    async fn set_online(&self, id: i64, online: bool) -> StorageResult<()> {
        self.update_flag(id, Flag::Online, online).await
    }

    async fn set_protected(&self, id: i64, protected: bool) -> StorageResult<()> {
        self.update_flag(id, Flag::Protected, protected).await
    }

    async fn set_light(&self, id: i64, light_on: bool) -> StorageResult<()> {
        self.update_flag(id, Flag::Light, light_on).await
    }

    async fn set_address(&self, id: i64, address: ControllerAddress) -> StorageResult<()> {
        let result = sqlx::query("UPDATE rooms SET controller_address = ? WHERE id = ?")
            .bind(i64::from(address.as_u8()))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::not_found("Room", "id", id));
        }
        Ok(())
    }
}
