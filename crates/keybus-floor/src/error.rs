use keybus_core::ControllerAddress;
use keybus_hardware::HardwareError;
use keybus_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by floor operations to the gateway.
#[derive(Debug, Error)]
pub enum FloorError {
    /// The line faulted while writing or reading a frame.
    #[error("Transport error: {0}")]
    Transport(#[from] HardwareError),

    /// The config/audit store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A request argument is out of range.
    #[error("Invalid argument: {0}")]
    Invalid(#[from] keybus_core::Error),

    #[error("Floor not found: {port}")]
    UnknownFloor { port: String },

    #[error("No room with controller address {address} on {port}")]
    UnknownRoom {
        port: String,
        address: ControllerAddress,
    },

    #[error("Controller address {address} is already used on {port}")]
    AddressInUse {
        port: String,
        address: ControllerAddress,
    },

    /// The controller did not report the assigned code back.
    #[error("Key in cell {cell} of controller {address} was not confirmed")]
    KeyNotConfirmed {
        address: ControllerAddress,
        cell: u8,
    },
}

impl FloorError {
    pub fn unknown_floor(port: impl Into<String>) -> Self {
        Self::UnknownFloor { port: port.into() }
    }

    pub fn unknown_room(port: impl Into<String>, address: ControllerAddress) -> Self {
        Self::UnknownRoom {
            port: port.into(),
            address,
        }
    }

    /// Whether this failure came from the store, leaving the floor's
    /// configuration unavailable.
    pub fn is_configuration_unavailable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, FloorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_unavailable_only_for_storage() {
        let storage = FloorError::from(StorageError::Configuration("locked".into()));
        assert!(storage.is_configuration_unavailable());
        assert!(!FloorError::unknown_floor("COM3").is_configuration_unavailable());
        assert!(!FloorError::from(HardwareError::timeout(500)).is_configuration_unavailable());
    }

    #[test]
    fn test_messages() {
        let address = ControllerAddress::new(7).unwrap();
        assert_eq!(
            FloorError::unknown_room("COM3", address).to_string(),
            "No room with controller address 7 on COM3"
        );
        assert_eq!(
            FloorError::KeyNotConfirmed { address, cell: 2 }.to_string(),
            "Key in cell 2 of controller 7 was not confirmed"
        );
    }
}
