//! Core constants for the door-controller bus protocol.
//!
//! This module defines the protocol-level constants shared by the framer,
//! the port driver and the floor poller. Timing and retry defaults live here
//! too so that [`GatewayConfig`](crate::GatewayConfig) and the tests agree on
//! a single set of values.
//!
//! # Frame Structure
//!
//! Every request sent to a controller has the same shape:
//!
//! ```text
//! [address][command][payload...][checksum]
//! ```
//!
//! Where the checksum is the 8-bit wrapping sum of every byte before it.
//! Responses have no address or command byte; they are one or more fixed-size
//! records, each terminated by its own checksum.
//!
//! # Usage
//!
//! ```
//! use keybus_core::constants::*;
//!
//! fn is_valid_address(addr: u8) -> bool {
//!     (MIN_CONTROLLER_ADDRESS..=MAX_CONTROLLER_ADDRESS).contains(&addr)
//! }
//!
//! assert!(is_valid_address(5));
//! assert!(!is_valid_address(0));
//! assert_eq!(KEY_RECORD_LENGTH, KEY_CODE_LENGTH + 1);
//! ```

// ============================================================================
// Addressing
// ============================================================================

/// Lowest address a door controller may carry on a bus.
pub const MIN_CONTROLLER_ADDRESS: u8 = 1;

/// Highest address a door controller may carry on a bus.
///
/// 0 and 255 are reserved, so a single line carries at most 254 controllers.
pub const MAX_CONTROLLER_ADDRESS: u8 = 254;

// ============================================================================
// Keys
// ============================================================================

/// Length of a credential code in bytes.
pub const KEY_CODE_LENGTH: usize = 5;

/// Length of one key record in a key-table response (code + checksum).
pub const KEY_RECORD_LENGTH: usize = KEY_CODE_LENGTH + 1;

/// Default number of key cells in a controller's EEPROM.
pub const DEFAULT_KEY_CELLS: u8 = 12;

// ============================================================================
// Sensors and outputs
// ============================================================================

/// Bit of the sensor byte wired to the door reed switch.
///
/// Alerts are raised on transitions of this bit, never on its level.
pub const REED_SWITCH_BIT: u8 = 0x80;

/// Output bits that drive a relay contact on the X3 connector.
///
/// | Bit | Contact |
/// |-----|---------|
/// | 6   | X3.2    |
/// | 4   | X3.4    |
/// | 3   | X3.6    |
/// | 2   | X3.8    |
///
/// Every other bit is ignored by the controller.
pub const MEANINGFUL_OUTPUT_BITS: u8 = 0b0101_1100;

/// Output bit that switches the room light.
///
/// Field confirmation pending: the wiring documentation marks this as
/// unverified. Keep every light decision routed through this constant.
pub const LIGHT_OUTPUT_BIT: u8 = 0x40;

// ============================================================================
// Serial line
// ============================================================================

/// Baud rate of the controller bus.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout for a single bus read (milliseconds).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;

/// Default write timeout for a single bus write (milliseconds).
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 500;

/// Settle delay before each write, letting the previous responder release
/// the half-duplex line (milliseconds).
pub const DEFAULT_PRE_WRITE_DELAY_MS: u64 = 100;

/// Delay between a request and reading its response (milliseconds).
///
/// Also the per-room unit of the polling sweep budget.
pub const DEFAULT_RESPONSE_DELAY_MS: u64 = 200;

/// Delay between a key-table request and reading the bulk response
/// (milliseconds).
pub const DEFAULT_BULK_RESPONSE_DELAY_MS: u64 = 500;

// ============================================================================
// Polling policy
// ============================================================================

/// Attempts of the key-table consistency loop.
pub const DEFAULT_KEY_TABLE_READINGS: u8 = 5;

/// Attempts of a single sensor poll before it counts as a read error.
pub const DEFAULT_REPETITIONS: u8 = 3;

/// Consecutive read errors tolerated before a controller is reported as
/// unresponsive.
pub const DEFAULT_MAX_READ_ERRORS: u32 = 20;

/// Sweeps between two polls of an unprotected room.
pub const DEFAULT_NON_PROTECTED_INTERVAL: u32 = 100;

/// Back-off when a floor has no online room (seconds).
pub const DEFAULT_IDLE_BACKOFF_SECS: u64 = 15;

/// Cadence of the key-expiry sweep (seconds).
pub const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 600;

/// Interval between attempts to open an unavailable line (milliseconds).
pub const DEFAULT_PORT_RETRY_MS: u64 = 1800;
