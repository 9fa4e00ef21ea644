use serde::{Deserialize, Serialize};

/// A floor: the set of rooms wired to one serial line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FloorRecord {
    pub id: i64,

    /// Serial port name, e.g. `COM3` or `/dev/ttyUSB0`. Unique per floor.
    pub port_name: String,

    /// Human-readable label.
    pub name: String,
}
