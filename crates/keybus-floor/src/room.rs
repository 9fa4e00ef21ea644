//! Per-controller state model.
//!
//! [`Room`] and [`RoomSet`] hold no I/O. The poller snapshots what to poll,
//! talks to the bus, then applies results back here.

use crate::error::Result;
use chrono::{DateTime, Utc};
use keybus_core::{CellIndex, ControllerAddress, KeyCode, constants::REED_SWITCH_BIT};
use keybus_protocol::{KeyReadout, SensorReading};
use keybus_storage::{KeyAssignment, KeyRecord, RoomRecord, RoomSnapshot};
use std::collections::BTreeMap;

/// Cached contents of one key cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySlot {
    pub code: KeyCode,
    pub holder_name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl KeySlot {
    fn from_record(record: &KeyRecord) -> Result<Self> {
        Ok(Self {
            code: record.code()?.unwrap_or(KeyCode::EMPTY),
            holder_name: record.holder_name.clone(),
            created_at: record.created_at,
            expires_at: record.expires_at,
            removed_at: record.removed_at,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.is_empty() && self.expires_at.is_some_and(|at| at < now)
    }
}

/// One door controller and what the gateway knows about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    id: i64,
    room_number: i64,
    address: ControllerAddress,
    online: bool,
    protected: bool,
    light_on: bool,
    keys: Vec<KeySlot>,
    previous_sensor: Option<u8>,
    current_sensor: Option<u8>,
    last_key_cell: Option<u8>,
    read_errors: u32,
}

impl Room {
    /// An online, unprotected room with empty cells.
    pub fn new(id: i64, room_number: i64, address: ControllerAddress, cell_count: u8) -> Self {
        Self {
            id,
            room_number,
            address,
            online: true,
            protected: false,
            light_on: false,
            keys: vec![KeySlot::default(); cell_count as usize],
            previous_sensor: None,
            current_sensor: None,
            last_key_cell: None,
            read_errors: 0,
        }
    }

    pub fn from_record(record: &RoomRecord, cell_count: u8) -> Result<Self> {
        let mut room = Self::new(record.id, record.room_number, record.address()?, cell_count);
        room.online = record.online;
        room.protected = record.protected;
        room.light_on = record.light_on;
        Ok(room)
    }

    /// Build a room from its stored row and key cells.
    pub fn from_snapshot(snapshot: &RoomSnapshot, cell_count: u8) -> Result<Self> {
        let mut room = Self::from_record(&snapshot.room, cell_count)?;
        for record in &snapshot.keys {
            if let Some(slot) = usize::try_from(record.cell_index)
                .ok()
                .and_then(|i| room.keys.get_mut(i))
            {
                *slot = KeySlot::from_record(record)?;
            }
        }
        Ok(room)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn room_number(&self) -> i64 {
        self.room_number
    }

    pub fn address(&self) -> ControllerAddress {
        self.address
    }

    pub fn is_online(&self) -> bool {
        self.online
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub fn set_protected(&mut self, protected: bool) {
        self.protected = protected;
    }

    pub fn is_light_on(&self) -> bool {
        self.light_on
    }

    pub fn set_light(&mut self, on: bool) {
        self.light_on = on;
    }

    pub fn cell_count(&self) -> u8 {
        self.keys.len() as u8
    }

    pub fn key(&self, cell: CellIndex) -> Option<&KeySlot> {
        self.keys.get(cell.as_usize())
    }

    pub fn keys(&self) -> &[KeySlot] {
        &self.keys
    }

    pub fn last_key_cell(&self) -> Option<u8> {
        self.last_key_cell
    }

    pub fn sensor(&self) -> Option<u8> {
        self.current_sensor
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors
    }

    /// Merge a key-table read into the cache.
    ///
    /// Only valid cells overwrite cached codes. Returns `true` when every
    /// cell of the readout was valid.
    pub fn apply_key_readout(&mut self, readout: &KeyReadout) -> bool {
        for (cell, code) in readout.valid_cells() {
            if let Some(slot) = self.keys.get_mut(cell.as_usize()) {
                slot.code = code;
            }
        }
        readout.is_fully_valid() && readout.cell_count() == self.keys.len()
    }

    /// Record a fresh sensor reading from a poll.
    pub fn apply_reading(&mut self, reading: SensorReading) {
        self.last_key_cell = Some(reading.last_key_cell);
        self.set_sensor_state(reading.sensor);
    }

    pub fn set_sensor_state(&mut self, sensor: u8) {
        self.previous_sensor = self.current_sensor;
        self.current_sensor = Some(sensor);
    }

    /// Whether the reed switch bit changed between the last two readings.
    pub fn edge_triggered(&self) -> bool {
        match (self.previous_sensor, self.current_sensor) {
            (Some(prev), Some(cur)) => (prev ^ cur) & REED_SWITCH_BIT != 0,
            _ => false,
        }
    }

    /// Count a failed poll. Returns `true` exactly once, on the poll that
    /// takes the counter past `max_errors`.
    pub fn record_read_error(&mut self, max_errors: u32) -> bool {
        self.read_errors = self.read_errors.saturating_add(1);
        self.read_errors == max_errors.saturating_add(1)
    }

    pub fn reset_read_error(&mut self) {
        self.read_errors = 0;
    }

    pub fn assign_key(&mut self, assignment: &KeyAssignment) {
        if let Some(slot) = self.keys.get_mut(assignment.cell.as_usize()) {
            *slot = KeySlot {
                code: assignment.code,
                holder_name: Some(assignment.holder_name.clone()),
                created_at: Some(assignment.created_at),
                expires_at: assignment.expires_at,
                removed_at: None,
            };
        }
    }

    pub fn clear_key(&mut self, cell: CellIndex, removed_at: DateTime<Utc>) {
        if let Some(slot) = self.keys.get_mut(cell.as_usize()) {
            *slot = KeySlot {
                removed_at: Some(removed_at),
                ..KeySlot::default()
            };
        }
    }

    /// Cells holding a key whose expiry is earlier than `now`.
    pub fn expired_cells(&self, now: DateTime<Utc>) -> Vec<CellIndex> {
        let count = self.cell_count();
        self.keys
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_expired(now))
            .filter_map(|(i, _)| CellIndex::new(i as u8, count).ok())
            .collect()
    }
}

/// Rooms of one floor, ordered by controller address.
#[derive(Debug, Clone, Default)]
pub struct RoomSet {
    rooms: BTreeMap<ControllerAddress, Room>,
}

impl RoomSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a room, replacing any room at the same address.
    pub fn insert(&mut self, room: Room) -> Option<Room> {
        self.rooms.insert(room.address(), room)
    }

    pub fn get(&self, address: ControllerAddress) -> Option<&Room> {
        self.rooms.get(&address)
    }

    pub fn get_mut(&mut self, address: ControllerAddress) -> Option<&mut Room> {
        self.rooms.get_mut(&address)
    }

    pub fn find_by_id(&self, id: i64) -> Option<&Room> {
        self.rooms.values().find(|r| r.id() == id)
    }

    pub fn contains(&self, address: ControllerAddress) -> bool {
        self.rooms.contains_key(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Room> {
        self.rooms.values_mut()
    }

    pub fn addresses(&self) -> Vec<ControllerAddress> {
        self.rooms.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.rooms.values().filter(|r| r.is_online()).count()
    }

    pub fn any_online_protected(&self) -> bool {
        self.rooms
            .values()
            .any(|r| r.is_online() && r.is_protected())
    }

    /// Move a room to a new address. Returns `false` if there is no room at
    /// `from` or `to` is taken.
    pub fn change_address(&mut self, from: ControllerAddress, to: ControllerAddress) -> bool {
        if self.rooms.contains_key(&to) {
            return false;
        }
        let Some(mut room) = self.rooms.remove(&from) else {
            return false;
        };
        room.address = to;
        self.rooms.insert(to, room);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use keybus_protocol::ReadingOutcome;
    use rstest::rstest;

    fn addr(n: u8) -> ControllerAddress {
        ControllerAddress::new(n).unwrap()
    }

    fn cell(n: u8) -> CellIndex {
        CellIndex::new(n, 12).unwrap()
    }

    fn room() -> Room {
        Room::new(1, 101, addr(5), 12)
    }

    #[test]
    fn test_first_observation_is_not_an_edge() {
        let mut room = room();
        room.set_sensor_state(0x80);
        assert!(!room.edge_triggered());
    }

    #[rstest]
    #[case(0x00, 0x80, true)]
    #[case(0x80, 0x00, true)]
    #[case(0x80, 0x80, false)]
    #[case(0x00, 0x7F, false)]
    #[case(0x81, 0x01, true)]
    fn test_edge_follows_reed_bit(#[case] prev: u8, #[case] cur: u8, #[case] edge: bool) {
        let mut room = room();
        room.set_sensor_state(prev);
        room.set_sensor_state(cur);
        assert_eq!(room.edge_triggered(), edge);
    }

    #[test]
    fn test_repeated_identical_states_do_not_edge() {
        let mut room = room();
        room.set_sensor_state(0x80);
        room.set_sensor_state(0x00);
        assert!(room.edge_triggered());
        room.set_sensor_state(0x00);
        assert!(!room.edge_triggered());
    }

    #[test]
    fn test_read_error_threshold_fires_once() {
        let mut room = room();
        let fired: Vec<bool> = (0..25).map(|_| room.record_read_error(20)).collect();

        assert_eq!(fired.iter().filter(|f| **f).count(), 1);
        assert!(fired[20]);
        assert_eq!(room.read_errors(), 25);

        room.reset_read_error();
        assert_eq!(room.read_errors(), 0);
    }

    #[test]
    fn test_apply_key_readout_keeps_invalid_cells() {
        let mut room = room();
        room.assign_key(&KeyAssignment::new(cell(1), KeyCode::new([1; 5]), "a"));

        let mut readout = KeyReadout::unknown(12);
        readout.set(cell(0), ReadingOutcome::Valid(KeyCode::new([7; 5])));
        readout.set(cell(1), ReadingOutcome::InvalidChecksum);

        assert!(!room.apply_key_readout(&readout));
        assert_eq!(room.key(cell(0)).unwrap().code, KeyCode::new([7; 5]));
        assert_eq!(room.key(cell(1)).unwrap().code, KeyCode::new([1; 5]));
    }

    #[test]
    fn test_apply_fully_valid_readout() {
        let mut room = room();
        let outcomes = vec![ReadingOutcome::Valid(KeyCode::EMPTY); 12];
        assert!(room.apply_key_readout(&KeyReadout::from_outcomes(outcomes)));
    }

    #[test]
    fn test_default_slot_holds_no_key() {
        let slot = KeySlot::default();
        assert!(slot.is_empty());
        assert!(!slot.is_expired(Utc::now()));
        assert_eq!(slot.code, KeyCode::EMPTY);
    }

    #[test]
    fn test_expired_cells() {
        let now = Utc::now();
        let mut room = room();
        room.assign_key(
            &KeyAssignment::new(cell(2), KeyCode::new([2; 5]), "past")
                .expires_at(now - Duration::minutes(5)),
        );
        room.assign_key(
            &KeyAssignment::new(cell(3), KeyCode::new([3; 5]), "future")
                .expires_at(now + Duration::minutes(5)),
        );
        room.assign_key(&KeyAssignment::new(cell(4), KeyCode::new([4; 5]), "forever"));

        assert_eq!(room.expired_cells(now), vec![cell(2)]);

        room.clear_key(cell(2), now);
        assert!(room.expired_cells(now).is_empty());
        let slot = room.key(cell(2)).unwrap();
        assert!(slot.is_empty());
        assert_eq!(slot.expires_at, None);
        assert_eq!(slot.removed_at, Some(now));
    }

    #[test]
    fn test_room_set_ordering_and_counts() {
        let mut set = RoomSet::new();
        let mut a = Room::new(1, 101, addr(9), 12);
        a.set_protected(true);
        let mut b = Room::new(2, 102, addr(3), 12);
        b.set_online(false);
        set.insert(a);
        set.insert(b);

        assert_eq!(set.addresses(), vec![addr(3), addr(9)]);
        assert_eq!(set.online_count(), 1);
        assert!(set.any_online_protected());
    }

    #[test]
    fn test_room_set_change_address() {
        let mut set = RoomSet::new();
        set.insert(Room::new(1, 101, addr(3), 12));
        set.insert(Room::new(2, 102, addr(4), 12));

        assert!(!set.change_address(addr(3), addr(4)));
        assert!(!set.change_address(addr(7), addr(8)));
        assert!(set.change_address(addr(3), addr(10)));
        assert_eq!(set.get(addr(10)).unwrap().id(), 1);
        assert!(!set.contains(addr(3)));
    }
}
