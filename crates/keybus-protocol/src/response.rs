//! Controller responses.
//!
//! Responses carry no address or command byte. They are one or more
//! fixed-size records, each ending in the wrapping sum of its own data bytes:
//!
//! ```text
//! key record:     [c0][c1][c2][c3][c4][sum]
//! sensor reading: [sensor][last cell][sum]
//! ```
//!
//! A key table is `cell_count` key records back to back. Each record is
//! validated on its own, so one corrupt record leaves the others usable.

use crate::frame::ChecksumFramer;
use keybus_core::{
    CellIndex, KeyCode,
    constants::{KEY_CODE_LENGTH, KEY_RECORD_LENGTH, REED_SWITCH_BIT},
};
use serde::{Deserialize, Serialize};

/// Result of reading one key cell in one attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingOutcome {
    /// Nothing usable was received for the cell.
    #[default]
    Unknown,
    /// The record arrived but its checksum did not match.
    InvalidChecksum,
    /// The record validated.
    Valid(KeyCode),
}

impl ReadingOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ReadingOutcome::Valid(_))
    }

    pub fn code(&self) -> Option<KeyCode> {
        match self {
            ReadingOutcome::Valid(code) => Some(*code),
            _ => None,
        }
    }
}

/// Validate one 6-byte key record.
///
/// Records shorter than six bytes are `Unknown`; extra bytes are ignored.
///
/// ```
/// use keybus_core::KeyCode;
/// use keybus_protocol::{ReadingOutcome, parse_key_record};
///
/// let outcome = parse_key_record(&[1, 2, 3, 4, 5, 15]);
/// assert_eq!(outcome, ReadingOutcome::Valid(KeyCode::new([1, 2, 3, 4, 5])));
/// assert_eq!(parse_key_record(&[1, 2, 3, 4, 5, 16]), ReadingOutcome::InvalidChecksum);
/// ```
pub fn parse_key_record(record: &[u8]) -> ReadingOutcome {
    let Some(record) = record.get(..KEY_RECORD_LENGTH) else {
        return ReadingOutcome::Unknown;
    };
    if !ChecksumFramer::validate(record) {
        return ReadingOutcome::InvalidChecksum;
    }
    let mut code = [0u8; KEY_CODE_LENGTH];
    code.copy_from_slice(&record[..KEY_CODE_LENGTH]);
    ReadingOutcome::Valid(KeyCode::new(code))
}

/// Encode a key record the way a controller sends it.
pub fn encode_key_record(code: &KeyCode) -> [u8; KEY_RECORD_LENGTH] {
    let mut record = [0u8; KEY_RECORD_LENGTH];
    record[..KEY_CODE_LENGTH].copy_from_slice(code.as_bytes());
    record[KEY_CODE_LENGTH] = ChecksumFramer::checksum(code.as_bytes());
    record
}

/// Per-cell outcomes of one `ReadAllKeys` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReadout {
    outcomes: Vec<ReadingOutcome>,
}

impl KeyReadout {
    /// A readout where nothing was received.
    pub fn unknown(cell_count: u8) -> Self {
        Self {
            outcomes: vec![ReadingOutcome::Unknown; cell_count as usize],
        }
    }

    pub fn from_outcomes(outcomes: Vec<ReadingOutcome>) -> Self {
        Self { outcomes }
    }

    /// Split a bulk response into records and validate each.
    ///
    /// An undersized buffer yields an all-`Unknown` readout.
    pub fn parse(buf: &[u8], cell_count: u8) -> Self {
        let needed = cell_count as usize * KEY_RECORD_LENGTH;
        if buf.len() < needed {
            return Self::unknown(cell_count);
        }
        let outcomes = buf[..needed]
            .chunks_exact(KEY_RECORD_LENGTH)
            .map(parse_key_record)
            .collect();
        Self { outcomes }
    }

    pub fn cell_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn get(&self, cell: CellIndex) -> ReadingOutcome {
        self.outcomes
            .get(cell.as_usize())
            .copied()
            .unwrap_or_default()
    }

    /// Replace the outcome of one cell; out-of-range cells are ignored.
    pub fn set(&mut self, cell: CellIndex, outcome: ReadingOutcome) {
        if let Some(slot) = self.outcomes.get_mut(cell.as_usize()) {
            *slot = outcome;
        }
    }

    pub fn is_fully_valid(&self) -> bool {
        self.outcomes.iter().all(ReadingOutcome::is_valid)
    }

    pub fn valid_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_valid()).count()
    }

    /// Cells with a validated code, in cell order.
    pub fn valid_cells(&self) -> impl Iterator<Item = (CellIndex, KeyCode)> + '_ {
        CellIndex::all(self.outcomes.len() as u8)
            .zip(self.outcomes.iter())
            .filter_map(|(cell, outcome)| outcome.code().map(|code| (cell, code)))
    }

    /// Overwrite this readout's cells with every valid cell of `other`.
    ///
    /// Cells not valid in `other` are kept as they are.
    pub fn merge_valid(&mut self, other: &KeyReadout) {
        for (slot, outcome) in self.outcomes.iter_mut().zip(other.outcomes.iter()) {
            if outcome.is_valid() {
                *slot = *outcome;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReadingOutcome> {
        self.outcomes.iter()
    }
}

/// Parsed `ReadSensorAndLastKey` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor: u8,
    pub last_key_cell: u8,
}

impl SensorReading {
    /// Validate and parse a 3-byte sensor response.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let record = buf.get(..3)?;
        if !ChecksumFramer::validate(record) {
            return None;
        }
        Some(Self {
            sensor: record[0],
            last_key_cell: record[1],
        })
    }

    pub fn encode(&self) -> [u8; 3] {
        [
            self.sensor,
            self.last_key_cell,
            self.sensor.wrapping_add(self.last_key_cell),
        ]
    }

    /// State of the door reed switch.
    pub fn reed_switch(&self) -> bool {
        self.sensor & REED_SWITCH_BIT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(n: u8) -> CellIndex {
        CellIndex::new(n, 12).unwrap()
    }

    fn table(codes: &[[u8; 5]]) -> Vec<u8> {
        codes
            .iter()
            .flat_map(|c| encode_key_record(&KeyCode::new(*c)))
            .collect()
    }

    #[test]
    fn test_parse_full_table() {
        let mut codes = [[0u8; 5]; 12];
        codes[3] = [1, 2, 3, 4, 5];
        let readout = KeyReadout::parse(&table(&codes), 12);

        assert!(readout.is_fully_valid());
        assert_eq!(readout.cell_count(), 12);
        assert_eq!(
            readout.get(cell(3)),
            ReadingOutcome::Valid(KeyCode::new([1, 2, 3, 4, 5]))
        );
        assert_eq!(readout.get(cell(0)), ReadingOutcome::Valid(KeyCode::new([0; 5])));
    }

    #[test]
    fn test_corrupt_record_isolated() {
        let codes = [[7u8; 5]; 12];
        let mut buf = table(&codes);
        buf[2 * KEY_RECORD_LENGTH + 5] ^= 0x01;

        let readout = KeyReadout::parse(&buf, 12);
        assert!(!readout.is_fully_valid());
        assert_eq!(readout.get(cell(2)), ReadingOutcome::InvalidChecksum);
        assert_eq!(readout.valid_count(), 11);
    }

    #[test]
    fn test_undersized_buffer_is_unknown() {
        let buf = table(&[[1u8; 5]; 11]);
        let readout = KeyReadout::parse(&buf, 12);
        assert_eq!(readout.valid_count(), 0);
        assert!(readout.iter().all(|o| *o == ReadingOutcome::Unknown));
    }

    #[test]
    fn test_merge_valid_keeps_previous_cells() {
        let code_a = KeyCode::new([1; 5]);
        let code_b = KeyCode::new([2; 5]);
        let mut merged = KeyReadout::unknown(3);
        merged.merge_valid(&KeyReadout::from_outcomes(vec![
            ReadingOutcome::Valid(code_a),
            ReadingOutcome::InvalidChecksum,
            ReadingOutcome::Unknown,
        ]));
        merged.merge_valid(&KeyReadout::from_outcomes(vec![
            ReadingOutcome::InvalidChecksum,
            ReadingOutcome::Valid(code_b),
            ReadingOutcome::Unknown,
        ]));

        let valid: Vec<_> = merged.valid_cells().map(|(c, k)| (c.as_u8(), k)).collect();
        assert_eq!(valid, vec![(0, code_a), (1, code_b)]);
        assert!(!merged.is_fully_valid());
    }

    #[test]
    fn test_sensor_reading() {
        let reading = SensorReading::parse(&[0x80, 4, 0x84]).unwrap();
        assert!(reading.reed_switch());
        assert_eq!(reading.last_key_cell, 4);
        assert_eq!(reading.encode(), [0x80, 4, 0x84]);

        assert!(SensorReading::parse(&[0x80, 4, 0x85]).is_none());
        assert!(SensorReading::parse(&[0x80, 4]).is_none());
    }
}
