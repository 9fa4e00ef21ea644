//! Enum dispatch over the available transports.
//!
//! Native `async fn` in traits is not object-safe, so a `Box<dyn
//! BusTransport>` is not possible. [`AnyTransport`] provides concrete
//! dispatch instead.
//!
//! ```
//! use keybus_hardware::devices::AnyTransport;
//! use keybus_hardware::mock::MockBus;
//! use keybus_hardware::BusTransport;
//!
//! let (bus, _handle) = MockBus::new("COM3");
//! let transport = AnyTransport::Mock(bus);
//! assert_eq!(transport.port_name(), "COM3");
//! ```

use crate::Result;
use crate::mock::MockBus;
use crate::serial::SerialTransport;
use crate::traits::BusTransport;
use std::time::Duration;

#[derive(Debug)]
#[non_exhaustive]
pub enum AnyTransport {
    /// Physical serial line.
    Serial(SerialTransport),
    /// Simulated controller bus.
    Mock(MockBus),
}

impl BusTransport for AnyTransport {
    fn port_name(&self) -> &str {
        match self {
            Self::Serial(t) => t.port_name(),
            Self::Mock(t) => t.port_name(),
        }
    }

    fn is_open(&self) -> bool {
        match self {
            Self::Serial(t) => t.is_open(),
            Self::Mock(t) => t.is_open(),
        }
    }

    async fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        match self {
            Self::Serial(t) => t.write_all(bytes, timeout).await,
            Self::Mock(t) => t.write_all(bytes, timeout).await,
        }
    }

    async fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        match self {
            Self::Serial(t) => t.read_exact(len, timeout).await,
            Self::Mock(t) => t.read_exact(len, timeout).await,
        }
    }
}
