//! Facade bundling the repositories over one connection pool.

use crate::connection::{Database, DatabaseConfig};
use crate::error::StorageResult;
use crate::models::{FloorRecord, KeyRecord, NewRoom, RoomRecord};
use crate::repositories::{
    FloorRepository, KeyRepository, RoomRepository, SqliteFloorRepository, SqliteKeyRepository,
    SqliteRoomRepository,
};
use keybus_core::StorageConfig;
use tracing::debug;

/// Everything persisted about one floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloorSnapshot {
    pub floor: FloorRecord,
    pub rooms: Vec<RoomSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub room: RoomRecord,
    /// One entry per cell, ordered by cell index.
    pub keys: Vec<KeyRecord>,
}

/// Gateway store. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (and migrate) the database named in the gateway configuration.
    pub async fn open(config: &StorageConfig) -> StorageResult<Self> {
        Ok(Self::new(Database::new(DatabaseConfig::from(config)).await?))
    }

    pub async fn in_memory() -> StorageResult<Self> {
        Ok(Self::new(Database::in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn floors(&self) -> SqliteFloorRepository {
        SqliteFloorRepository::new(self.db.pool().clone())
    }

    pub fn rooms(&self) -> SqliteRoomRepository {
        SqliteRoomRepository::new(self.db.pool().clone())
    }

    pub fn keys(&self) -> SqliteKeyRepository {
        SqliteKeyRepository::new(self.db.pool().clone())
    }

    /// Insert a room together with its empty key cells.
    pub async fn add_room(&self, room: &NewRoom, cell_count: u8) -> StorageResult<RoomRecord> {
        let record = self.rooms().create(room).await?;
        self.keys().ensure_cells(record.id, cell_count).await?;
        debug!(room = record.room_number, address = record.controller_address, "room added");
        Ok(record)
    }

    /// Load a floor by port name with all its rooms and key cells.
    ///
    /// Missing key rows are created on the way, so every room comes back
    /// with exactly `cell_count` cells. Returns `None` if no floor uses the
    /// port.
    pub async fn load_floor(
        &self,
        port_name: &str,
        cell_count: u8,
    ) -> StorageResult<Option<FloorSnapshot>> {
        let Some(floor) = self.floors().find_by_port(port_name).await? else {
            return Ok(None);
        };

        let keys = self.keys();
        let mut rooms = Vec::new();
        for room in self.rooms().find_by_floor(floor.id).await? {
            keys.ensure_cells(room.id, cell_count).await?;
            let cells = keys
                .find_by_room(room.id)
                .await?
                .into_iter()
                .filter(|k| k.cell_index < i64::from(cell_count))
                .collect();
            rooms.push(RoomSnapshot { room, keys: cells });
        }

        Ok(Some(FloorSnapshot { floor, rooms }))
    }
}
