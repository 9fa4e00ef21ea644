//! SQLite persistence for the keybus gateway.
//!
//! The store holds the configuration the gateway polls from (floors and
//! their rooms) and the key tables it keeps in step with the controllers.
//!
//! - [`Database`] - connection pool with embedded migrations
//! - [`FloorRepository`], [`RoomRepository`], [`KeyRepository`] - data access traits
//! - [`Store`] - facade bundling the SQLite repositories
//!
//! ```no_run
//! use keybus_core::{ControllerAddress, StorageConfig};
//! use keybus_storage::{FloorRepository, NewRoom, Store};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(&StorageConfig::default()).await?;
//! let floor = store.floors().create("COM3", "First floor").await?;
//! store
//!     .add_room(&NewRoom::new(floor.id, 101, ControllerAddress::new(1)?), 12)
//!     .await?;
//!
//! let snapshot = store.load_floor("COM3", 12).await?.expect("configured");
//! assert_eq!(snapshot.rooms[0].keys.len(), 12);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{FloorRecord, KeyAssignment, KeyRecord, NewRoom, RoomRecord};
pub use repositories::{
    FloorRepository, KeyRepository, RoomRepository, SqliteFloorRepository, SqliteKeyRepository,
    SqliteRoomRepository,
};
pub use store::{FloorSnapshot, RoomSnapshot, Store};
