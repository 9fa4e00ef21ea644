//! Command codes of the door-controller bus.
//!
//! Every request starts with the controller address followed by one command
//! byte:
//!
//! ```text
//! [address][command][payload...][checksum]
//!           ^^^^^^^
//! ```
//!
//! | Command                | Code | Payload                  | Response           |
//! |------------------------|------|--------------------------|--------------------|
//! | `AssignKey`            | 4    | cell, 5-byte code        | none               |
//! | `ReadAllKeys`          | 5    | none                     | cells x 6 bytes    |
//! | `SetOutputs`           | 13   | output bits              | none               |
//! | `ChangeAddress`        | 39   | new address              | none               |
//! | `RevokeKey`            | 77   | cell                     | none               |
//! | `GetLastKey`           | 123  | none                     | 6 bytes            |
//! | `ReadSensorAndLastKey` | 243  | none                     | 3 bytes            |
//!
//! ```
//! use keybus_protocol::CommandCode;
//!
//! let cmd = CommandCode::try_from(243).unwrap();
//! assert_eq!(cmd, CommandCode::ReadSensorAndLastKey);
//! assert_eq!(cmd.response_len(12), Some(3));
//! assert!(CommandCode::try_from(99).is_err());
//! ```

use keybus_core::{Error, Result, constants::KEY_RECORD_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a sensor/last-key response: sensor byte, cell index, checksum.
pub const SENSOR_RESPONSE_LENGTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CommandCode {
    AssignKey = 4,
    ReadAllKeys = 5,
    SetOutputs = 13,
    ChangeAddress = 39,
    RevokeKey = 77,
    GetLastKey = 123,
    ReadSensorAndLastKey = 243,
}

impl CommandCode {
    /// Wire value of the command.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Bytes the controller answers with, or `None` for write-only commands.
    pub fn response_len(self, cell_count: u8) -> Option<usize> {
        match self {
            CommandCode::ReadAllKeys => Some(cell_count as usize * KEY_RECORD_LENGTH),
            CommandCode::GetLastKey => Some(KEY_RECORD_LENGTH),
            CommandCode::ReadSensorAndLastKey => Some(SENSOR_RESPONSE_LENGTH),
            CommandCode::AssignKey
            | CommandCode::SetOutputs
            | CommandCode::ChangeAddress
            | CommandCode::RevokeKey => None,
        }
    }

    /// Whether the command changes controller state.
    pub fn is_mutation(self) -> bool {
        self.response_len(0).is_none()
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            4 => Ok(CommandCode::AssignKey),
            5 => Ok(CommandCode::ReadAllKeys),
            13 => Ok(CommandCode::SetOutputs),
            39 => Ok(CommandCode::ChangeAddress),
            77 => Ok(CommandCode::RevokeKey),
            123 => Ok(CommandCode::GetLastKey),
            243 => Ok(CommandCode::ReadSensorAndLastKey),
            _ => Err(Error::UnknownCommand { code }),
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandCode::AssignKey => "AssignKey",
            CommandCode::ReadAllKeys => "ReadAllKeys",
            CommandCode::SetOutputs => "SetOutputs",
            CommandCode::ChangeAddress => "ChangeAddress",
            CommandCode::RevokeKey => "RevokeKey",
            CommandCode::GetLastKey => "GetLastKey",
            CommandCode::ReadSensorAndLastKey => "ReadSensorAndLastKey",
        };
        write!(f, "{name}({})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CommandCode::AssignKey, 4)]
    #[case(CommandCode::ReadAllKeys, 5)]
    #[case(CommandCode::SetOutputs, 13)]
    #[case(CommandCode::ChangeAddress, 39)]
    #[case(CommandCode::RevokeKey, 77)]
    #[case(CommandCode::GetLastKey, 123)]
    #[case(CommandCode::ReadSensorAndLastKey, 243)]
    fn test_command_codes(#[case] command: CommandCode, #[case] code: u8) {
        assert_eq!(command.code(), code);
        assert_eq!(CommandCode::try_from(code).unwrap(), command);
    }

    #[test]
    fn test_response_lengths() {
        assert_eq!(CommandCode::ReadAllKeys.response_len(12), Some(72));
        assert_eq!(CommandCode::GetLastKey.response_len(12), Some(6));
        assert_eq!(CommandCode::AssignKey.response_len(12), None);
        assert!(CommandCode::RevokeKey.is_mutation());
        assert!(!CommandCode::ReadAllKeys.is_mutation());
    }

    #[test]
    fn test_display() {
        assert_eq!(CommandCode::RevokeKey.to_string(), "RevokeKey(77)");
    }
}
