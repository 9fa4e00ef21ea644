//! Serial-line layer of the keybus gateway.
//!
//! This crate turns a physical (or simulated) serial line into typed
//! controller operations:
//!
//! - [`BusTransport`] moves raw bytes with per-call timeouts. Implemented by
//!   [`SerialTransport`](serial::SerialTransport) and
//!   [`MockBus`](mock::MockBus), dispatched through [`AnyTransport`].
//! - [`PortDriver`] owns one transport and serializes every exchange on the
//!   line under a single mutex.
//! - [`LineOpener`] and [`LineModeConfigurator`] bring lines up; the floor
//!   supervisor retries [`LineOpener::open`] until it succeeds.
//!
//! # Example
//!
//! ```
//! use keybus_core::{BusConfig, CellIndex, ControllerAddress, KeyCode};
//! use keybus_hardware::{AnyTransport, PortDriver};
//! use keybus_hardware::mock::MockBus;
//!
//! #[tokio::main]
//! async fn main() -> keybus_hardware::Result<()> {
//!     let (bus, handle) = MockBus::new("COM3");
//!     let address = ControllerAddress::new(5).unwrap();
//!     handle.add_controller(address).await;
//!
//!     let driver = PortDriver::new(AnyTransport::Mock(bus), BusConfig::default().without_delays(), 12);
//!     let cell = CellIndex::new(3, 12).unwrap();
//!     driver.assign_key(address, cell, KeyCode::new([1, 2, 3, 4, 5])).await?;
//!
//!     let readout = driver.read_all_keys(address).await;
//!     assert_eq!(readout.get(cell).code(), Some(KeyCode::new([1, 2, 3, 4, 5])));
//!     Ok(())
//! }
//! ```

pub mod devices;
pub mod driver;
pub mod error;
pub mod line_mode;
pub mod mock;
pub mod serial;
pub mod traits;

pub use devices::AnyTransport;
pub use driver::PortDriver;
pub use error::{HardwareError, Result};
pub use line_mode::{ExternallyManagedLineMode, RecordingLineMode};
pub use serial::{SerialOpener, SerialTransport};
pub use traits::{BusTransport, LineModeConfigurator, LineOpener};
