use crate::{
    commands::CommandCode,
    frame::{ChecksumFramer, Frame},
    outputs::OutputBits,
};
use keybus_core::{CellIndex, ControllerAddress, Error, KeyCode, Result, constants::KEY_CODE_LENGTH};

/// A typed request addressed to one controller.
///
/// Requests are the only way the gateway produces frames, and the simulated
/// bus decodes written frames back into requests.
///
/// ```
/// use keybus_core::{CellIndex, ControllerAddress, KeyCode};
/// use keybus_protocol::Request;
///
/// let request = Request::AssignKey {
///     address: ControllerAddress::new(5).unwrap(),
///     cell: CellIndex::new(3, 12).unwrap(),
///     code: KeyCode::new([1, 2, 3, 4, 5]),
/// };
/// let frame = request.to_frame();
///
/// assert_eq!(frame.as_bytes(), &[5, 4, 3, 1, 2, 3, 4, 5, 27]);
/// assert_eq!(Request::from_frame(&frame, 12).unwrap(), request);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    AssignKey {
        address: ControllerAddress,
        cell: CellIndex,
        code: KeyCode,
    },
    RevokeKey {
        address: ControllerAddress,
        cell: CellIndex,
    },
    ChangeAddress {
        address: ControllerAddress,
        new_address: ControllerAddress,
    },
    SetOutputs {
        address: ControllerAddress,
        outputs: OutputBits,
    },
    ReadAllKeys {
        address: ControllerAddress,
    },
    ReadSensorAndLastKey {
        address: ControllerAddress,
    },
    GetLastKey {
        address: ControllerAddress,
    },
}

impl Request {
    pub fn address(&self) -> ControllerAddress {
        match *self {
            Request::AssignKey { address, .. }
            | Request::RevokeKey { address, .. }
            | Request::ChangeAddress { address, .. }
            | Request::SetOutputs { address, .. }
            | Request::ReadAllKeys { address }
            | Request::ReadSensorAndLastKey { address }
            | Request::GetLastKey { address } => address,
        }
    }

    pub fn command(&self) -> CommandCode {
        match self {
            Request::AssignKey { .. } => CommandCode::AssignKey,
            Request::RevokeKey { .. } => CommandCode::RevokeKey,
            Request::ChangeAddress { .. } => CommandCode::ChangeAddress,
            Request::SetOutputs { .. } => CommandCode::SetOutputs,
            Request::ReadAllKeys { .. } => CommandCode::ReadAllKeys,
            Request::ReadSensorAndLastKey { .. } => CommandCode::ReadSensorAndLastKey,
            Request::GetLastKey { .. } => CommandCode::GetLastKey,
        }
    }

    /// Encode the request as a checksum-terminated frame.
    pub fn to_frame(&self) -> Frame {
        let mut payload = [0u8; KEY_CODE_LENGTH + 1];
        let len = match self {
            Request::AssignKey { cell, code, .. } => {
                payload[0] = cell.as_u8();
                payload[1..].copy_from_slice(code.as_bytes());
                KEY_CODE_LENGTH + 1
            }
            Request::RevokeKey { cell, .. } => {
                payload[0] = cell.as_u8();
                1
            }
            Request::ChangeAddress { new_address, .. } => {
                payload[0] = new_address.as_u8();
                1
            }
            Request::SetOutputs { outputs, .. } => {
                payload[0] = outputs.bits();
                1
            }
            Request::ReadAllKeys { .. }
            | Request::ReadSensorAndLastKey { .. }
            | Request::GetLastKey { .. } => 0,
        };
        ChecksumFramer::build(self.address(), self.command(), &payload[..len])
    }

    /// Decode a validated frame. Cell indices are bounded by `cell_count`.
    ///
    /// # Errors
    /// Returns an error for unknown commands, payloads of the wrong size, or
    /// out-of-range addresses and cells.
    pub fn from_frame(frame: &Frame, cell_count: u8) -> Result<Self> {
        let address = ControllerAddress::new(frame.address_byte())?;
        let command = CommandCode::try_from(frame.command_byte())?;
        let payload = frame.payload();

        let expected = match command {
            CommandCode::AssignKey => KEY_CODE_LENGTH + 1,
            CommandCode::RevokeKey | CommandCode::ChangeAddress | CommandCode::SetOutputs => 1,
            CommandCode::ReadAllKeys
            | CommandCode::ReadSensorAndLastKey
            | CommandCode::GetLastKey => 0,
        };
        if payload.len() != expected {
            return Err(Error::InvalidPayload(format!(
                "{command} expects {expected} payload bytes, got {}",
                payload.len()
            )));
        }

        let request = match command {
            CommandCode::AssignKey => Request::AssignKey {
                address,
                cell: CellIndex::new(payload[0], cell_count)?,
                code: KeyCode::from_slice(&payload[1..])?,
            },
            CommandCode::RevokeKey => Request::RevokeKey {
                address,
                cell: CellIndex::new(payload[0], cell_count)?,
            },
            CommandCode::ChangeAddress => Request::ChangeAddress {
                address,
                new_address: ControllerAddress::new(payload[0])?,
            },
            CommandCode::SetOutputs => Request::SetOutputs {
                address,
                outputs: OutputBits::new(payload[0]),
            },
            CommandCode::ReadAllKeys => Request::ReadAllKeys { address },
            CommandCode::ReadSensorAndLastKey => Request::ReadSensorAndLastKey { address },
            CommandCode::GetLastKey => Request::GetLastKey { address },
        };
        Ok(request)
    }
}
