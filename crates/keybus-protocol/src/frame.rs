use crate::commands::CommandCode;
use bytes::{BufMut, Bytes, BytesMut};
use keybus_core::{ControllerAddress, Error, Result};
use std::fmt;

/// Smallest valid request: address, command, checksum.
pub const MIN_REQUEST_LENGTH: usize = 3;

/// Builds and validates checksum-terminated frames.
///
/// The checksum is the 8-bit wrapping sum of every byte before it. The same
/// rule applies to requests (`[address][command][payload...][sum]`) and to
/// each fixed-size response record (`[data...][sum]`).
///
/// # Examples
/// ```
/// use keybus_core::ControllerAddress;
/// use keybus_protocol::{ChecksumFramer, CommandCode};
///
/// let address = ControllerAddress::new(5).unwrap();
/// let frame = ChecksumFramer::build(address, CommandCode::ReadAllKeys, &[]);
///
/// assert_eq!(frame.as_bytes(), &[5, 5, 10]);
/// assert!(ChecksumFramer::validate(frame.as_bytes()));
/// ```
pub struct ChecksumFramer;

impl ChecksumFramer {
    /// 8-bit wrapping sum of `bytes`.
    #[inline]
    pub fn checksum(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }

    /// Build a request frame and append its checksum.
    pub fn build(address: ControllerAddress, command: CommandCode, payload: &[u8]) -> Frame {
        let mut buf = BytesMut::with_capacity(payload.len() + MIN_REQUEST_LENGTH);
        buf.put_u8(address.as_u8());
        buf.put_u8(command.code());
        buf.put_slice(payload);
        let sum = Self::checksum(&buf);
        buf.put_u8(sum);
        Frame { data: buf.freeze() }
    }

    /// Whether the last byte of `frame` is the checksum of the bytes before it.
    ///
    /// An empty slice is never valid.
    pub fn validate(frame: &[u8]) -> bool {
        match frame.split_last() {
            Some((&sum, body)) => Self::checksum(body) == sum,
            None => false,
        }
    }
}

/// A checksum-validated request frame.
///
/// Frames only come out of [`ChecksumFramer::build`] or [`Frame::parse`], so
/// every `Frame` value carries a correct checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Parse raw bytes received from a line into a request frame.
    ///
    /// # Errors
    /// Returns `Error::FrameTooShort` for fewer than three bytes, or
    /// `Error::ChecksumMismatch` if the trailing checksum is wrong.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_REQUEST_LENGTH {
            return Err(Error::FrameTooShort {
                len: bytes.len(),
                min: MIN_REQUEST_LENGTH,
            });
        }
        let (&expected, body) = bytes
            .split_last()
            .ok_or(Error::FrameTooShort { len: 0, min: MIN_REQUEST_LENGTH })?;
        let calculated = ChecksumFramer::checksum(body);
        if calculated != expected {
            return Err(Error::ChecksumMismatch {
                expected,
                calculated,
            });
        }
        Ok(Frame {
            data: Bytes::copy_from_slice(bytes),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Raw address byte (byte 0).
    pub fn address_byte(&self) -> u8 {
        self.data[0]
    }

    /// Raw command byte (byte 1).
    pub fn command_byte(&self) -> u8 {
        self.data[1]
    }

    /// Bytes between the command and the checksum.
    pub fn payload(&self) -> &[u8] {
        &self.data[2..self.data.len() - 1]
    }

    pub fn checksum(&self) -> u8 {
        self.data[self.data.len() - 1]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex: Vec<String> = self.data.iter().map(|b| format!("{b:02X}")).collect();
        write!(f, "[{}]", hex.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn addr(n: u8) -> ControllerAddress {
        ControllerAddress::new(n).unwrap()
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(ChecksumFramer::checksum(&[]), 0);
        assert_eq!(ChecksumFramer::checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(ChecksumFramer::checksum(&[1, 2, 3, 4, 5]), 15);
    }

    #[test]
    fn test_build_assign_key() {
        let frame = ChecksumFramer::build(addr(5), CommandCode::AssignKey, &[3, 1, 2, 3, 4, 5]);
        assert_eq!(frame.as_bytes(), &[5, 4, 3, 1, 2, 3, 4, 5, 27]);
        assert_eq!(frame.address_byte(), 5);
        assert_eq!(frame.command_byte(), 4);
        assert_eq!(frame.payload(), &[3, 1, 2, 3, 4, 5]);
        assert_eq!(frame.checksum(), 27);
    }

    #[rstest]
    #[case(&[], false)]
    #[case(&[0], true)]
    #[case(&[5, 5, 10], true)]
    #[case(&[5, 5, 11], false)]
    #[case(&[200, 100, 44], true)]
    fn test_validate(#[case] bytes: &[u8], #[case] expected: bool) {
        assert_eq!(ChecksumFramer::validate(bytes), expected);
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(matches!(
            Frame::parse(&[5, 5]),
            Err(Error::FrameTooShort { len: 2, .. })
        ));
        assert!(matches!(
            Frame::parse(&[5, 5, 11]),
            Err(Error::ChecksumMismatch {
                expected: 11,
                calculated: 10
            })
        ));
    }

    #[test]
    fn test_parse_accepts_built_frame() {
        let built = ChecksumFramer::build(addr(17), CommandCode::SetOutputs, &[0x40]);
        let parsed = Frame::parse(built.as_bytes()).unwrap();
        assert_eq!(parsed, built);
    }

    #[test]
    fn test_display_is_hex() {
        let frame = ChecksumFramer::build(addr(10), CommandCode::ReadSensorAndLastKey, &[]);
        assert_eq!(frame.to_string(), "[0A F3 FD]");
    }
}
