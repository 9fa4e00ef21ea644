//! Protocol driver for one physical line.
//!
//! A [`PortDriver`] is the only owner of its line's transport. Every
//! operation takes the driver's mutex for its whole write/read exchange, so
//! at most one request is ever outstanding on the wire and responses are
//! read back in request order.
//!
//! Reads distinguish two kinds of failure:
//!
//! - silence or a bad checksum is an ordinary outcome (`None`,
//!   `ReadingOutcome::Unknown`/`InvalidChecksum`) and drives the caller's
//!   repetition policy;
//! - a hard transport fault is a [`HardwareError`](crate::HardwareError).
//!
//! Nothing is retried here. Callers decide how many times to repeat a read.

use crate::devices::AnyTransport;
use crate::error::Result;
use crate::traits::BusTransport;
use keybus_core::{BusConfig, CellIndex, ControllerAddress, KeyCode, constants::KEY_RECORD_LENGTH};
use keybus_protocol::{
    ChecksumFramer, Frame, KeyReadout, OutputBits, ReadingOutcome, Request, SensorReading,
    commands::SENSOR_RESPONSE_LENGTH, parse_key_record,
};
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Serialized access to the controllers on one line.
#[derive(Debug)]
pub struct PortDriver {
    name: String,
    transport: Mutex<AnyTransport>,
    bus: BusConfig,
    cell_count: u8,
    in_flight: AtomicU8,
    last_responded: AtomicU8,
}

impl PortDriver {
    pub fn new(transport: AnyTransport, bus: BusConfig, cell_count: u8) -> Self {
        Self {
            name: transport.port_name().to_string(),
            transport: Mutex::new(transport),
            bus,
            cell_count,
            in_flight: AtomicU8::new(0),
            last_responded: AtomicU8::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell_count(&self) -> u8 {
        self.cell_count
    }

    pub async fn is_open(&self) -> bool {
        self.transport.lock().await.is_open()
    }

    /// Address of the last request put on the wire.
    pub fn in_flight_address(&self) -> Option<ControllerAddress> {
        ControllerAddress::new(self.in_flight.load(Ordering::Acquire)).ok()
    }

    /// Address of the most recent controller whose response validated.
    pub fn last_responded_address(&self) -> Option<ControllerAddress> {
        ControllerAddress::new(self.last_responded.load(Ordering::Acquire)).ok()
    }

    /// Write one frame.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the write faults or times out. The
    /// write is not retried.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let mut transport = self.transport.lock().await;
        self.write_locked(&mut transport, frame).await
    }

    /// Read exactly `len` bytes and validate their trailing checksum.
    ///
    /// Returns `Ok(None)` on timeout, short read or checksum mismatch.
    ///
    /// # Errors
    ///
    /// Returns an error only on a hard transport fault.
    pub async fn read_fixed(&self, len: usize) -> Result<Option<Vec<u8>>> {
        let mut transport = self.transport.lock().await;
        self.read_fixed_locked(&mut transport, len).await
    }

    /// Poll a controller's sensor byte and last presented key cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be written or the line faults.
    pub async fn read_sensor_and_last_key(
        &self,
        address: ControllerAddress,
    ) -> Result<Option<SensorReading>> {
        let frame = Request::ReadSensorAndLastKey { address }.to_frame();
        let mut transport = self.transport.lock().await;
        self.write_locked(&mut transport, &frame).await?;
        tokio::time::sleep(self.bus.response_delay()).await;

        let reading = self
            .read_fixed_locked(&mut transport, SENSOR_RESPONSE_LENGTH)
            .await?
            .and_then(|buf| SensorReading::parse(&buf));
        if reading.is_some() {
            self.mark_responded();
        }
        Ok(reading)
    }

    /// Read a controller's whole key table in one bulk response.
    ///
    /// Never fails: a write failure, line fault or short read yields an
    /// all-`Unknown` readout. Each record is validated independently.
    pub async fn read_all_keys(&self, address: ControllerAddress) -> KeyReadout {
        match self.try_read_all_keys(address).await {
            Ok(readout) => readout,
            Err(e) => {
                warn!(port = %self.name, address = %address, error = %e, "key table read failed");
                KeyReadout::unknown(self.cell_count)
            }
        }
    }

    async fn try_read_all_keys(&self, address: ControllerAddress) -> Result<KeyReadout> {
        let frame = Request::ReadAllKeys { address }.to_frame();
        let len = self.cell_count as usize * KEY_RECORD_LENGTH;

        let mut transport = self.transport.lock().await;
        self.write_locked(&mut transport, &frame).await?;
        tokio::time::sleep(self.bus.bulk_response_delay()).await;

        let Some(buf) = self.read_raw_locked(&mut transport, len).await? else {
            return Ok(KeyReadout::unknown(self.cell_count));
        };
        let readout = KeyReadout::parse(&buf, self.cell_count);
        debug!(
            port = %self.name,
            address = %address,
            valid = readout.valid_count(),
            cells = self.cell_count,
            "key table read"
        );
        if readout.valid_count() > 0 {
            self.mark_responded();
        }
        Ok(readout)
    }

    /// Read the code of the key last presented to a controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be written or the line faults.
    pub async fn get_last_key(&self, address: ControllerAddress) -> Result<ReadingOutcome> {
        let frame = Request::GetLastKey { address }.to_frame();
        let mut transport = self.transport.lock().await;
        self.write_locked(&mut transport, &frame).await?;
        tokio::time::sleep(self.bus.response_delay()).await;

        let outcome = match self.read_raw_locked(&mut transport, KEY_RECORD_LENGTH).await? {
            Some(buf) => parse_key_record(&buf),
            None => ReadingOutcome::Unknown,
        };
        if outcome.is_valid() {
            self.mark_responded();
        }
        Ok(outcome)
    }

    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn assign_key(
        &self,
        address: ControllerAddress,
        cell: CellIndex,
        code: KeyCode,
    ) -> Result<()> {
        self.write_frame(&Request::AssignKey { address, cell, code }.to_frame())
            .await
    }

    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn revoke_key(&self, address: ControllerAddress, cell: CellIndex) -> Result<()> {
        self.write_frame(&Request::RevokeKey { address, cell }.to_frame())
            .await
    }

    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn change_address(
        &self,
        address: ControllerAddress,
        new_address: ControllerAddress,
    ) -> Result<()> {
        self.write_frame(
            &Request::ChangeAddress {
                address,
                new_address,
            }
            .to_frame(),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns the transport error if the write fails.
    pub async fn set_outputs(&self, address: ControllerAddress, outputs: OutputBits) -> Result<()> {
        self.write_frame(&Request::SetOutputs { address, outputs }.to_frame())
            .await
    }

    async fn write_locked(&self, transport: &mut AnyTransport, frame: &Frame) -> Result<()> {
        tokio::time::sleep(self.bus.pre_write_delay()).await;
        self.in_flight.store(frame.address_byte(), Ordering::Release);
        debug!(port = %self.name, frame = %frame, "write");

        transport
            .write_all(frame.as_bytes(), self.bus.write_timeout())
            .await
            .inspect_err(|e| {
                warn!(port = %self.name, frame = %frame, error = %e, "write failed");
            })
    }

    async fn read_raw_locked(
        &self,
        transport: &mut AnyTransport,
        len: usize,
    ) -> Result<Option<Vec<u8>>> {
        match transport.read_exact(len, self.bus.read_timeout()).await {
            Ok(buf) => Ok(Some(buf)),
            Err(e) if e.is_timeout() => {
                debug!(port = %self.name, expected = len, "no response");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_fixed_locked(
        &self,
        transport: &mut AnyTransport,
        len: usize,
    ) -> Result<Option<Vec<u8>>> {
        let Some(buf) = self.read_raw_locked(transport, len).await? else {
            return Ok(None);
        };
        if ChecksumFramer::validate(&buf) {
            Ok(Some(buf))
        } else {
            debug!(port = %self.name, "checksum mismatch");
            Ok(None)
        }
    }

    fn mark_responded(&self) {
        let address = self.in_flight.load(Ordering::Acquire);
        self.last_responded.store(address, Ordering::Release);
    }
}
