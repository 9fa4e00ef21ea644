//! One floor: a serial line, its driver and the rooms wired to it.
//!
//! Room state sits behind a [`RwLock`] that is never held across bus I/O.
//! Operations read what they need, release the lock, talk to the
//! controller, then lock again to apply the result.
//!
//! Mutations follow one rule: the frame goes out first and the cache and
//! store are only updated once the write succeeded.

use crate::alert::{Alert, AlertSink};
use crate::error::{FloorError, Result};
use crate::room::{Room, RoomSet};
use crate::schedule::{PollSchedule, SweepPlan};
use chrono::{DateTime, Utc};
use keybus_core::{CellIndex, ControllerAddress, GatewayConfig, KeyCode, PollingConfig};
use keybus_hardware::PortDriver;
use keybus_protocol::{KeyReadout, OutputBits, ReadingOutcome, SensorReading};
use keybus_storage::{
    FloorSnapshot, KeyAssignment, KeyRepository, NewRoom, RoomRepository, Store,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc::Receiver};
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct Floor {
    id: i64,
    name: String,
    port: String,
    driver: PortDriver,
    rooms: RwLock<RoomSet>,
    store: Store,
    polling: PollingConfig,
    response_delay: Duration,
    alerts: AlertSink,
    initialized: AtomicBool,
}

impl Floor {
    /// Build a floor from its stored definition and an opened line.
    ///
    /// # Errors
    ///
    /// Fails if a stored room or key row is malformed.
    pub fn new(
        snapshot: &FloorSnapshot,
        driver: PortDriver,
        store: Store,
        config: &GatewayConfig,
    ) -> Result<Self> {
        let mut rooms = RoomSet::new();
        for room in &snapshot.rooms {
            rooms.insert(Room::from_snapshot(room, config.polling.key_cells)?);
        }

        Ok(Self {
            id: snapshot.floor.id,
            name: snapshot.floor.name.clone(),
            port: snapshot.floor.port_name.clone(),
            driver,
            rooms: RwLock::new(rooms),
            store,
            polling: config.polling.clone(),
            response_delay: config.bus.response_delay(),
            alerts: AlertSink::new(),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port_name(&self) -> &str {
        &self.port
    }

    pub fn driver(&self) -> &PortDriver {
        &self.driver
    }

    pub fn polling(&self) -> &PollingConfig {
        &self.polling
    }

    pub fn response_delay(&self) -> Duration {
        self.response_delay
    }

    /// Subscribe to this floor's alerts, replacing any earlier subscriber.
    pub fn subscribe(&self) -> Receiver<Alert> {
        self.alerts.subscribe()
    }

    pub fn emit(&self, alert: Alert) {
        self.alerts.emit(alert);
    }

    pub async fn rooms(&self) -> RoomSet {
        self.rooms.read().await.clone()
    }

    pub async fn room(&self, address: ControllerAddress) -> Option<Room> {
        self.rooms.read().await.get(address).cloned()
    }

    pub async fn plan_sweep(&self, schedule: &mut PollSchedule) -> SweepPlan {
        schedule.next_sweep(&*self.rooms.read().await)
    }

    fn cell(&self, cell: u8) -> Result<CellIndex> {
        Ok(CellIndex::new(cell, self.polling.key_cells)?)
    }

    async fn room_id(&self, address: ControllerAddress) -> Result<i64> {
        self.rooms
            .read()
            .await
            .get(address)
            .map(Room::id)
            .ok_or_else(|| FloorError::unknown_room(&self.port, address))
    }

    /// Poll one room's sensor, retrying up to the configured repetitions,
    /// and apply the outcome to the room.
    pub async fn poll_room(&self, address: ControllerAddress) -> Option<SensorReading> {
        let reading = self.read_sensor(address).await;

        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(address) else {
            return reading;
        };

        match reading {
            Some(reading) => {
                room.reset_read_error();
                room.apply_reading(reading);
                if room.edge_triggered() {
                    info!(
                        port = %self.port,
                        address = %address,
                        sensor = reading.sensor,
                        protected = room.is_protected(),
                        "reed switch changed"
                    );
                    if room.is_protected() {
                        self.alerts.emit(Alert::SensorEdgeTriggered {
                            room_id: room.id(),
                            address,
                            sensor: reading.sensor,
                        });
                    }
                }
            }
            None => {
                debug!(port = %self.port, address = %address, "sensor poll unanswered");
                if room.record_read_error(self.polling.max_read_errors) {
                    warn!(
                        port = %self.port,
                        address = %address,
                        errors = room.read_errors(),
                        "controller unresponsive"
                    );
                    self.alerts.emit(Alert::ControllerUnresponsive {
                        port: self.port.clone(),
                        address,
                    });
                }
            }
        }
        reading
    }

    async fn read_sensor(&self, address: ControllerAddress) -> Option<SensorReading> {
        for attempt in 1..=self.polling.repetitions {
            match self.driver.read_sensor_and_last_key(address).await {
                Ok(Some(reading)) => return Some(reading),
                Ok(None) => {
                    debug!(port = %self.port, address = %address, attempt, "no valid sensor response");
                }
                Err(e) => {
                    warn!(port = %self.port, address = %address, error = %e, "sensor poll failed");
                }
            }
        }
        None
    }

    /// Read a controller's key table through the consistency loop.
    ///
    /// Up to `key_table_readings` bulk reads are made. The first fully
    /// valid read is returned as is; otherwise valid cells of all attempts
    /// are merged and the partial table is returned.
    pub async fn read_key_table(&self, address: ControllerAddress) -> KeyReadout {
        let mut merged = KeyReadout::unknown(self.polling.key_cells);
        for attempt in 1..=self.polling.key_table_readings {
            let readout = self.driver.read_all_keys(address).await;
            if readout.is_fully_valid() {
                debug!(port = %self.port, address = %address, attempt, "key table consistent");
                return readout;
            }
            merged.merge_valid(&readout);
        }

        warn!(
            port = %self.port,
            address = %address,
            valid = merged.valid_count(),
            cells = self.polling.key_cells,
            "key table not consistent after {} readings",
            self.polling.key_table_readings
        );
        merged
    }

    /// Read a room's key table and write its valid cells through to the
    /// cache and the store.
    ///
    /// # Errors
    ///
    /// Fails for an unknown room or when the store rejects the write.
    pub async fn get_all_keys(&self, address: ControllerAddress) -> Result<KeyReadout> {
        let room_id = self.room_id(address).await?;
        let readout = self.read_key_table(address).await;

        if let Some(room) = self.rooms.write().await.get_mut(address) {
            room.apply_key_readout(&readout);
        }

        let keys = self.store.keys();
        for (cell, code) in readout.valid_cells() {
            keys.record_code(room_id, cell, Some(code))
                .await
                .inspect_err(|e| {
                    error!(port = %self.port, address = %address, cell = %cell, error = %e, "key sync not stored");
                })?;
        }
        Ok(readout)
    }

    /// Check through the consistency loop that `cell` holds `code`.
    ///
    /// # Errors
    ///
    /// Returns [`FloorError::KeyNotConfirmed`] if the cell does not read back
    /// as `code`.
    pub async fn verify_key(
        &self,
        address: ControllerAddress,
        cell: CellIndex,
        code: KeyCode,
    ) -> Result<()> {
        let readout = self.read_key_table(address).await;
        if readout.get(cell) == ReadingOutcome::Valid(code) {
            Ok(())
        } else {
            Err(FloorError::KeyNotConfirmed {
                address,
                cell: cell.as_u8(),
            })
        }
    }

    /// Assign a key to a cell.
    ///
    /// Once the controller accepted the write, the key and its expiry are
    /// cached and stored before the read-back.
    ///
    /// # Errors
    ///
    /// Fails on an unknown room or cell, a transport error, a store failure
    /// or an unconfirmed key (when verification is enabled). Nothing is
    /// cached or stored unless the write succeeded.
    pub async fn set_key(
        &self,
        address: ControllerAddress,
        cell: u8,
        code: KeyCode,
        holder_name: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let cell = self.cell(cell)?;
        let room_id = self.room_id(address).await?;

        self.driver.assign_key(address, cell, code).await?;

        let mut assignment = KeyAssignment::new(cell, code, holder_name);
        assignment.expires_at = expires_at;
        if let Some(room) = self.rooms.write().await.get_mut(address) {
            room.assign_key(&assignment);
        }
        self.store
            .keys()
            .assign(room_id, &assignment)
            .await
            .inspect_err(|e| {
                error!(port = %self.port, address = %address, cell = %cell, error = %e, "key assignment not stored");
            })?;

        info!(port = %self.port, address = %address, cell = %cell, "key assigned");

        if self.polling.verify_assigned_keys {
            self.verify_key(address, cell, code).await.inspect_err(|e| {
                warn!(port = %self.port, address = %address, cell = %cell, error = %e, "assigned key not confirmed");
            })?;
        }
        Ok(())
    }

    /// Revoke the key in a cell.
    ///
    /// # Errors
    ///
    /// Fails on an unknown room or cell, a transport error or a store
    /// failure.
    pub async fn unset_key(&self, address: ControllerAddress, cell: u8) -> Result<()> {
        let cell = self.cell(cell)?;
        self.revoke(address, cell).await
    }

    async fn revoke(&self, address: ControllerAddress, cell: CellIndex) -> Result<()> {
        let room_id = self.room_id(address).await?;
        self.driver.revoke_key(address, cell).await?;

        let removed_at = Utc::now();
        if let Some(room) = self.rooms.write().await.get_mut(address) {
            room.clear_key(cell, removed_at);
        }
        self.store
            .keys()
            .clear(room_id, cell, removed_at)
            .await
            .inspect_err(|e| {
                error!(port = %self.port, address = %address, cell = %cell, error = %e, "key removal not stored");
            })?;

        info!(port = %self.port, address = %address, cell = %cell, "key revoked");
        Ok(())
    }

    /// Read the key last presented to a controller.
    ///
    /// The controller need not belong to a configured room, so a desk
    /// reader on the line can be used to capture new keys.
    ///
    /// # Errors
    ///
    /// Fails only on a transport fault; silence yields
    /// [`ReadingOutcome::Unknown`].
    pub async fn read_key(&self, address: ControllerAddress) -> Result<ReadingOutcome> {
        let mut outcome = ReadingOutcome::Unknown;
        for _ in 0..self.polling.repetitions {
            outcome = self.driver.get_last_key(address).await?;
            if outcome.is_valid() {
                break;
            }
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Fails on an unknown room or a store failure.
    pub async fn set_protected(&self, address: ControllerAddress, protected: bool) -> Result<()> {
        let room_id = self.room_id(address).await?;
        self.store.rooms().set_protected(room_id, protected).await?;
        if let Some(room) = self.rooms.write().await.get_mut(address) {
            room.set_protected(protected);
        }
        info!(port = %self.port, address = %address, protected, "room protection changed");
        Ok(())
    }

    /// Take a room in or out of service. Offline rooms are skipped by the
    /// poller and the start-up key sync.
    ///
    /// # Errors
    ///
    /// Fails on an unknown room or a store failure.
    pub async fn set_online(&self, address: ControllerAddress, online: bool) -> Result<()> {
        let room_id = self.room_id(address).await?;
        self.store.rooms().set_online(room_id, online).await?;
        if let Some(room) = self.rooms.write().await.get_mut(address) {
            room.set_online(online);
        }
        info!(port = %self.port, address = %address, online, "room service changed");
        Ok(())
    }

    /// Switch a room's light output.
    ///
    /// # Errors
    ///
    /// Fails on an unknown room, a transport error or a store failure.
    pub async fn set_light(&self, address: ControllerAddress, on: bool) -> Result<()> {
        let room_id = self.room_id(address).await?;
        self.driver.set_outputs(address, OutputBits::light(on)).await?;

        if let Some(room) = self.rooms.write().await.get_mut(address) {
            room.set_light(on);
        }
        self.store.rooms().set_light(room_id, on).await?;
        debug!(port = %self.port, address = %address, on, "light switched");
        Ok(())
    }

    /// Move a controller to a new bus address.
    ///
    /// # Errors
    ///
    /// Fails on an unknown room, a taken target address, a transport error
    /// or a store failure.
    pub async fn change_address(
        &self,
        address: ControllerAddress,
        new_address: ControllerAddress,
    ) -> Result<()> {
        let room_id = self.room_id(address).await?;
        if self.rooms.read().await.contains(new_address) {
            return Err(FloorError::AddressInUse {
                port: self.port.clone(),
                address: new_address,
            });
        }

        self.driver.change_address(address, new_address).await?;
        self.rooms.write().await.change_address(address, new_address);
        self.store.rooms().set_address(room_id, new_address).await?;

        info!(port = %self.port, from = %address, to = %new_address, "controller readdressed");
        Ok(())
    }

    /// Add a room to this floor and its store.
    ///
    /// # Errors
    ///
    /// Fails if the address is taken or the store rejects the room.
    pub async fn add_room(
        &self,
        room_number: i64,
        address: ControllerAddress,
        protected: bool,
    ) -> Result<Room> {
        if self.rooms.read().await.contains(address) {
            return Err(FloorError::AddressInUse {
                port: self.port.clone(),
                address,
            });
        }

        let room = self.insert_room(room_number, address, protected).await?;
        self.emit(Alert::RoomsChanged {
            port: self.port.clone(),
        });
        Ok(room)
    }

    async fn insert_room(
        &self,
        room_number: i64,
        address: ControllerAddress,
        protected: bool,
    ) -> Result<Room> {
        let cells = self.polling.key_cells;
        let new_room = NewRoom::new(self.id, room_number, address).protected(protected);
        let record = self.store.add_room(&new_room, cells).await?;
        let room = Room::from_record(&record, cells)?;
        self.rooms.write().await.insert(room.clone());

        info!(port = %self.port, room = room_number, address = %address, "room added");
        Ok(room)
    }

    /// Probe addresses with no configured room and add the controllers
    /// that answer.
    ///
    /// A single key-table read is made per address; any valid cell means a
    /// controller is present. Discovered rooms are online and unprotected.
    ///
    /// # Errors
    ///
    /// Fails when the store rejects a discovered room.
    pub async fn scan(&self, addresses: &[ControllerAddress]) -> Result<Vec<ControllerAddress>> {
        let mut discovered = Vec::new();
        for &address in addresses {
            if self.rooms.read().await.contains(address) {
                continue;
            }
            let readout = self.driver.read_all_keys(address).await;
            if readout.valid_count() == 0 {
                continue;
            }
            self.insert_room(i64::from(address.as_u8()), address, false)
                .await?;
            discovered.push(address);
        }

        if !discovered.is_empty() {
            info!(port = %self.port, count = discovered.len(), "controllers discovered");
            self.emit(Alert::RoomsChanged {
                port: self.port.clone(),
            });
        }
        Ok(discovered)
    }

    /// Read every online room's key table into the cache and store.
    ///
    /// # Errors
    ///
    /// Fails when the store rejects a write.
    pub async fn sync_keys(&self) -> Result<()> {
        let addresses: Vec<ControllerAddress> = self
            .rooms
            .read()
            .await
            .iter()
            .filter(|r| r.is_online())
            .map(Room::address)
            .collect();

        for address in addresses {
            let readout = self.get_all_keys(address).await?;
            debug!(port = %self.port, address = %address, valid = readout.valid_count(), "key table synced");
        }
        Ok(())
    }

    /// Discover controllers and sync key tables, as configured.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be written.
    pub async fn initialize(&self) -> Result<()> {
        let range = self.polling.scan_range();
        if !range.is_empty() {
            self.scan(&range).await?;
        }
        if self.polling.sync_keys_on_start {
            self.sync_keys().await?;
        }
        Ok(())
    }

    /// Run [`Floor::initialize`] unless it already succeeded once.
    ///
    /// # Errors
    ///
    /// Fails when the store cannot be written; the next call tries again.
    pub async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        self.initialize().await?;
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Revoke every key whose expiry is earlier than `now`.
    ///
    /// Expired cells are collected from the cache and from the store, so a
    /// key whose expiry was only persisted is revoked as well. Each
    /// revocation raises a key-unset alert. A failed revocation is logged
    /// and retried on the next sweep. Returns the number revoked.
    pub async fn sweep_expired_keys(&self, now: DateTime<Utc>) -> usize {
        let stored = self
            .store
            .keys()
            .find_expired(self.id, now)
            .await
            .inspect_err(|e| {
                warn!(port = %self.port, error = %e, "stored expiries not read");
            })
            .unwrap_or_default();

        let expired: BTreeSet<(ControllerAddress, CellIndex)> = {
            let rooms = self.rooms.read().await;
            let cached = rooms.iter().flat_map(|room| {
                room.expired_cells(now)
                    .into_iter()
                    .map(move |cell| (room.address(), cell))
            });
            let persisted = stored.iter().filter_map(|record| {
                let room = rooms.find_by_id(record.room_id)?;
                let cell = u8::try_from(record.cell_index).ok()?;
                let cell = CellIndex::new(cell, room.cell_count()).ok()?;
                Some((room.address(), cell))
            });
            cached.chain(persisted).collect()
        };

        let mut revoked = 0;
        for (address, cell) in expired {
            match self.revoke(address, cell).await {
                Ok(()) => {
                    revoked += 1;
                    self.emit(Alert::KeyUnset {
                        port: self.port.clone(),
                        address,
                        cell: cell.as_u8(),
                    });
                }
                Err(e) => {
                    warn!(port = %self.port, address = %address, cell = %cell, error = %e, "expired key not revoked");
                }
            }
        }

        if revoked > 0 {
            info!(port = %self.port, revoked, "expired keys revoked");
        }
        revoked
    }
}
