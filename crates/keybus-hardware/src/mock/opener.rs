//! Line opener over simulated buses.

use super::bus::{MockBus, MockBusHandle};
use crate::devices::AnyTransport;
use crate::error::{HardwareError, Result};
use crate::line_mode::RecordingLineMode;
use crate::traits::{LineModeConfigurator, LineOpener};
use keybus_core::BusConfig;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug)]
struct MockLine {
    handle: MockBusHandle,
    available: bool,
    opens: u32,
}

/// Opens registered [`MockBus`] lines.
///
/// Lines can be made unavailable to exercise the retry path of the floor
/// supervisor; opening an unavailable or unknown line fails.
///
/// ```
/// use keybus_core::BusConfig;
/// use keybus_hardware::mock::MockOpener;
/// use keybus_hardware::LineOpener;
///
/// let opener = MockOpener::new();
/// let _handle = opener.add_line("COM3", 12);
///
/// opener.set_available("COM3", false);
/// assert!(opener.open("COM3", &BusConfig::default()).is_err());
///
/// opener.set_available("COM3", true);
/// assert!(opener.open("COM3", &BusConfig::default()).is_ok());
/// assert_eq!(opener.open_count("COM3"), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockOpener {
    lines: Mutex<HashMap<String, MockLine>>,
    line_modes: RecordingLineMode,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an available line and return its control handle.
    pub fn add_line(&self, name: &str, cell_count: u8) -> MockBusHandle {
        let (_bus, handle) = MockBus::with_cells(name, cell_count);
        if let Ok(mut lines) = self.lines.lock() {
            lines.insert(
                name.to_string(),
                MockLine {
                    handle: handle.clone(),
                    available: true,
                    opens: 0,
                },
            );
        }
        handle
    }

    pub fn set_available(&self, name: &str, available: bool) {
        if let Ok(mut lines) = self.lines.lock()
            && let Some(line) = lines.get_mut(name)
        {
            line.available = available;
        }
    }

    /// Successful opens of `name` so far.
    pub fn open_count(&self, name: &str) -> u32 {
        self.lines
            .lock()
            .ok()
            .and_then(|lines| lines.get(name).map(|line| line.opens))
            .unwrap_or(0)
    }

    /// Line modes applied on open, oldest first.
    pub fn line_modes(&self) -> &RecordingLineMode {
        &self.line_modes
    }
}

impl LineOpener for MockOpener {
    fn open(&self, port: &str, bus: &BusConfig) -> Result<AnyTransport> {
        let mut lines = self
            .lines
            .lock()
            .map_err(|_| HardwareError::other("mock opener lock poisoned"))?;
        let line = lines
            .get_mut(port)
            .ok_or_else(|| HardwareError::initialization_failed(format!("no such line: {port}")))?;
        if !line.available {
            return Err(HardwareError::initialization_failed(format!(
                "line busy: {port}"
            )));
        }

        self.line_modes.configure(port, bus.line_mode)?;
        line.opens += 1;
        Ok(AnyTransport::Mock(line.handle.connect()))
    }
}
