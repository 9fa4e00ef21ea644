use crate::{
    Result,
    constants::{KEY_CODE_LENGTH, MAX_CONTROLLER_ADDRESS, MIN_CONTROLLER_ADDRESS},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a door controller on a shared bus (1-254).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ControllerAddress(u8);

impl ControllerAddress {
    /// Create a new controller address with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidAddress` if the address is 0 or 255.
    pub fn new(address: u8) -> Result<Self> {
        if !(MIN_CONTROLLER_ADDRESS..=MAX_CONTROLLER_ADDRESS).contains(&address) {
            return Err(Error::InvalidAddress { address });
        }
        Ok(ControllerAddress(address))
    }

    /// Get the raw address as u8.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    /// Iterate every valid address in `from..=to`, clamped to the legal range.
    pub fn range(from: u8, to: u8) -> impl Iterator<Item = ControllerAddress> {
        let from = from.max(MIN_CONTROLLER_ADDRESS);
        let to = to.min(MAX_CONTROLLER_ADDRESS);
        (from..=to).map(ControllerAddress)
    }
}

impl fmt::Display for ControllerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for ControllerAddress {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        ControllerAddress::new(value)
    }
}

impl From<ControllerAddress> for u8 {
    fn from(address: ControllerAddress) -> Self {
        address.0
    }
}

impl std::str::FromStr for ControllerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("Invalid controller address: {s}")))?;
        ControllerAddress::new(value)
    }
}

/// Index of a key cell in a controller's EEPROM.
///
/// A cell index is only meaningful relative to the configured cell count,
/// so construction always takes that count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellIndex(u8);

impl CellIndex {
    /// Create a cell index bounded by `cell_count`.
    ///
    /// # Errors
    /// Returns `Error::InvalidCell` if `cell >= cell_count`.
    pub fn new(cell: u8, cell_count: u8) -> Result<Self> {
        if cell >= cell_count {
            return Err(Error::InvalidCell {
                cell,
                count: cell_count,
            });
        }
        Ok(CellIndex(cell))
    }

    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Every cell of a controller with `cell_count` cells, in order.
    pub fn all(cell_count: u8) -> impl Iterator<Item = CellIndex> {
        (0..cell_count).map(CellIndex)
    }
}

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 5-byte credential code stored in a key cell. The default is
/// [`KeyCode::EMPTY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyCode([u8; KEY_CODE_LENGTH]);

impl KeyCode {
    /// Code of a cell that holds no key.
    pub const EMPTY: KeyCode = KeyCode([0; KEY_CODE_LENGTH]);

    #[must_use]
    pub const fn new(bytes: [u8; KEY_CODE_LENGTH]) -> Self {
        KeyCode(bytes)
    }

    /// Build a key code from a slice.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyCode` unless the slice is exactly 5 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let code: [u8; KEY_CODE_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidKeyCode(format!(
                "expected {KEY_CODE_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(KeyCode(code))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_CODE_LENGTH] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Compact uppercase hex form used by the store (`0102030405`).
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse either the compact hex form or the dashed display form.
    ///
    /// # Errors
    /// Returns `Error::InvalidKeyCode` on non-hex input or wrong length.
    pub fn from_hex(s: &str) -> Result<Self> {
        let compact: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | ':' | ' '))
            .collect();
        let bytes = hex::decode(&compact)
            .map_err(|e| Error::InvalidKeyCode(format!("'{s}': {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e] = self.0;
        write!(f, "{a:02X}-{b:02X}-{c:02X}-{d:02X}-{e:02X}")
    }
}

impl std::str::FromStr for KeyCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KeyCode::from_hex(s)
    }
}

/// Electrical mode of a serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineMode {
    Rs232,
    #[default]
    Rs422,
    Rs485TwoWire,
    Rs485FourWire,
}

impl fmt::Display for LineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineMode::Rs232 => write!(f, "RS-232"),
            LineMode::Rs422 => write!(f, "RS-422"),
            LineMode::Rs485TwoWire => write!(f, "RS-485 2-wire"),
            LineMode::Rs485FourWire => write!(f, "RS-485 4-wire"),
        }
    }
}

impl std::str::FromStr for LineMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rs232" => Ok(LineMode::Rs232),
            "rs422" => Ok(LineMode::Rs422),
            "rs485-two-wire" | "rs485-2wire" => Ok(LineMode::Rs485TwoWire),
            "rs485-four-wire" | "rs485-4wire" => Ok(LineMode::Rs485FourWire),
            other => Err(Error::InvalidLineMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", 1)]
    #[case("15", 15)]
    #[case("254", 254)]
    fn test_controller_address_valid(#[case] input: &str, #[case] expected: u8) {
        let address: ControllerAddress = input.parse().unwrap();
        assert_eq!(address.as_u8(), expected);
    }

    #[rstest]
    #[case("0")]
    #[case("255")]
    #[case("abc")]
    fn test_controller_address_invalid(#[case] input: &str) {
        let result: Result<ControllerAddress> = input.parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_controller_address_range_is_clamped() {
        let all: Vec<u8> = ControllerAddress::range(0, 255).map(|a| a.as_u8()).collect();
        assert_eq!(all.len(), 254);
        assert_eq!(all.first(), Some(&1));
        assert_eq!(all.last(), Some(&254));
    }

    #[test]
    fn test_cell_index_bounds() {
        assert!(CellIndex::new(11, 12).is_ok());
        let err = CellIndex::new(12, 12).unwrap_err();
        assert!(matches!(err, Error::InvalidCell { cell: 12, count: 12 }));
        assert_eq!(CellIndex::all(12).count(), 12);
    }

    #[rstest]
    #[case("0102030405")]
    #[case("01-02-03-04-05")]
    #[case(" 01:02:03:04:05 ")]
    fn test_key_code_parse(#[case] input: &str) {
        let code: KeyCode = input.parse().unwrap();
        assert_eq!(code.as_bytes(), &[1, 2, 3, 4, 5]);
    }

    #[rstest]
    #[case("01020304")]
    #[case("010203040506")]
    #[case("zz02030405")]
    fn test_key_code_parse_invalid(#[case] input: &str) {
        assert!(KeyCode::from_hex(input).is_err());
    }

    #[test]
    fn test_key_code_formatting() {
        let code = KeyCode::new([0x0A, 0xFF, 0x00, 0x10, 0x01]);
        assert_eq!(code.to_string(), "0A-FF-00-10-01");
        assert_eq!(code.to_hex(), "0AFF001001");
        assert!(!code.is_empty());
        assert!(KeyCode::EMPTY.is_empty());
    }

    #[test]
    fn test_key_code_default_is_empty() {
        assert_eq!(KeyCode::default(), KeyCode::EMPTY);
        assert!(KeyCode::default().is_empty());
    }

    #[test]
    fn test_line_mode_parse() {
        assert_eq!("rs422".parse::<LineMode>().unwrap(), LineMode::Rs422);
        assert_eq!(
            "RS485-2wire".parse::<LineMode>().unwrap(),
            LineMode::Rs485TwoWire
        );
        assert!("rs999".parse::<LineMode>().is_err());
        assert_eq!(LineMode::default(), LineMode::Rs422);
    }
}
