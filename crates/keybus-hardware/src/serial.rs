//! Serial line transport backed by the `serialport` crate.
//!
//! The blocking port handle lives behind an `Arc<Mutex<..>>` and every read
//! or write runs on the blocking thread pool, so the async poller never
//! stalls a runtime worker on line I/O.

use crate::devices::AnyTransport;
use crate::error::{HardwareError, Result};
use crate::line_mode::ExternallyManagedLineMode;
use crate::traits::{BusTransport, LineModeConfigurator, LineOpener};
use keybus_core::BusConfig;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// An open serial line: 8 data bits, no parity, 1 stop bit, RTS asserted.
pub struct SerialTransport {
    name: String,
    port: SharedPort,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open `name` with the line settings from `bus`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::Serial` if the port cannot be opened.
    pub fn open(name: &str, bus: &BusConfig) -> Result<Self> {
        let mut port = serialport::new(name, bus.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(bus.read_timeout())
            .open()?;
        port.write_request_to_send(true)?;
        port.clear(ClearBuffer::All)?;

        info!(port = %name, baud = bus.baud_rate, "serial line opened");
        Ok(Self {
            name: name.to_string(),
            port: Arc::new(Mutex::new(port)),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn SerialPort>) -> Result<T> + Send + 'static,
    {
        let port = Arc::clone(&self.port);
        tokio::task::spawn_blocking(move || {
            let mut guard = port
                .lock()
                .map_err(|_| HardwareError::communication("serial port lock poisoned"))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| HardwareError::other(format!("serial I/O task failed: {e}")))?
    }
}

impl BusTransport for SerialTransport {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        true
    }

    async fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        let bytes = bytes.to_vec();
        self.blocking(move |port| {
            // Drop anything a previous responder left on the line.
            port.clear(ClearBuffer::Input)?;
            port.set_timeout(timeout)?;
            port.write_all(&bytes).map_err(|e| match e.kind() {
                ErrorKind::TimedOut => HardwareError::timeout(timeout.as_millis() as u64),
                _ => HardwareError::Io(e),
            })?;
            port.flush()?;
            Ok(())
        })
        .await
    }

    async fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let name = self.name.clone();
        self.blocking(move |port| {
            let deadline = Instant::now() + timeout;
            let mut buf = vec![0u8; len];
            let mut filled = 0;

            while filled < len {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                port.set_timeout(remaining)?;
                match port.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::TimedOut => break,
                    Err(e) => return Err(HardwareError::Io(e)),
                }
            }

            if filled < len {
                debug!(port = %name, expected = len, received = filled, "short read");
                return Err(HardwareError::timeout(timeout.as_millis() as u64));
            }
            Ok(buf)
        })
        .await
    }
}

/// Opens physical serial lines, applying the line mode first.
pub struct SerialOpener {
    configurator: Box<dyn LineModeConfigurator>,
}

impl SerialOpener {
    pub fn new(configurator: Box<dyn LineModeConfigurator>) -> Self {
        Self { configurator }
    }
}

impl Default for SerialOpener {
    fn default() -> Self {
        Self::new(Box::new(ExternallyManagedLineMode))
    }
}

impl LineOpener for SerialOpener {
    fn open(&self, port: &str, bus: &BusConfig) -> Result<AnyTransport> {
        self.configurator.configure(port, bus.line_mode)?;
        SerialTransport::open(port, bus).map(AnyTransport::Serial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_port_fails() {
        let opener = SerialOpener::default();
        let result = opener.open("/dev/keybus-does-not-exist", &BusConfig::default());
        assert!(result.is_err());
    }
}
