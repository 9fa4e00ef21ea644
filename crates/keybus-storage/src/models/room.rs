use crate::error::{StorageError, StorageResult};
use keybus_core::ControllerAddress;
use serde::{Deserialize, Serialize};

/// A room and its door controller.
///
/// `online` rooms are polled; `protected` rooms are polled on every sweep
/// and may raise alerts. Unprotected rooms are only polled periodically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomRecord {
    pub id: i64,
    pub floor_id: i64,
    pub room_number: i64,

    /// Bus address of the room's controller (1..=254).
    pub controller_address: i64,

    pub online: bool,
    pub protected: bool,

    /// Last light state commanded through the gateway.
    pub light_on: bool,
}

impl RoomRecord {
    /// The controller address as a validated domain type.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Validation`] if the stored value is outside
    /// the addressable range.
    pub fn address(&self) -> StorageResult<ControllerAddress> {
        let raw = u8::try_from(self.controller_address).map_err(|_| {
            StorageError::Validation(format!(
                "room {} has controller address {} out of range",
                self.id, self.controller_address
            ))
        })?;
        Ok(ControllerAddress::new(raw)?)
    }
}

/// Fields for inserting a room.
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub floor_id: i64,
    pub room_number: i64,
    pub controller_address: ControllerAddress,
    pub online: bool,
    pub protected: bool,
}

impl NewRoom {
    /// An online, unprotected room.
    pub fn new(floor_id: i64, room_number: i64, controller_address: ControllerAddress) -> Self {
        Self {
            floor_id,
            room_number,
            controller_address,
            online: true,
            protected: false,
        }
    }

    pub fn protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }
}
