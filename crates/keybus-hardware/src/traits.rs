//! Line abstractions.
//!
//! A [`BusTransport`] moves raw bytes over one serial line. It knows nothing
//! about frames or controllers; the [`PortDriver`](crate::PortDriver) layers
//! the protocol on top of it.
//!
//! [`LineOpener`] and [`LineModeConfigurator`] are the two capabilities the
//! floor supervisor needs to bring a line up. Both are synchronous and
//! object-safe so that they can live in a shared context as trait objects.
//!
//! `BusTransport` uses native `async fn` (Rust 1.90 + Edition 2024 RPITIT)
//! and is dispatched through the [`AnyTransport`](crate::AnyTransport) enum.

#![allow(async_fn_in_trait)]

use crate::devices::AnyTransport;
use crate::error::Result;
use keybus_core::{BusConfig, LineMode};
use std::time::Duration;

/// Byte transport over one half-duplex line.
pub trait BusTransport: Send + Sync {
    /// Name of the underlying line (`/dev/ttyS3`, `COM4`, ...).
    fn port_name(&self) -> &str;

    /// Whether the line is usable.
    fn is_open(&self) -> bool;

    /// Write every byte of `bytes` within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is closed, the write faults, or it does
    /// not complete in time. Writes are never retried here.
    async fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<()>;

    /// Read exactly `len` bytes within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Timeout` if fewer than `len` bytes arrived in
    /// time, or another error on a hard fault.
    async fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;
}

/// Applies the electrical mode of a line before it is opened.
///
/// Switching a multi-protocol port between RS-232, RS-422 and RS-485 is a
/// one-time, vendor-specific operation.
pub trait LineModeConfigurator: Send + Sync {
    /// # Errors
    ///
    /// Returns `HardwareError::ConfigurationError` if the mode cannot be set.
    fn configure(&self, port: &str, mode: LineMode) -> Result<()>;
}

/// Opens lines by name.
pub trait LineOpener: Send + Sync {
    /// Open `port` with the given bus settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not exist, is busy, or cannot be
    /// configured. Callers retry later.
    fn open(&self, port: &str, bus: &BusConfig) -> Result<AnyTransport>;
}
