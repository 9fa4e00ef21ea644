//! Database models for floors, rooms and key cells.

pub mod floor;
pub mod key;
pub mod room;

pub use floor::FloorRecord;
pub use key::{KeyAssignment, KeyRecord};
pub use room::{NewRoom, RoomRecord};
