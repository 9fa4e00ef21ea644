pub mod floor;
pub mod key;
pub mod room;

pub use floor::{FloorRepository, SqliteFloorRepository};
pub use key::{KeyRepository, SqliteKeyRepository};
pub use room::{RoomRepository, SqliteRoomRepository};
