//! Line mode configurators.

use crate::error::{HardwareError, Result};
use crate::traits::LineModeConfigurator;
use keybus_core::LineMode;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Configurator for lines whose mode is fixed by hardware or set by the
/// operating system ahead of time. It only records the expectation in the
/// log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExternallyManagedLineMode;

impl LineModeConfigurator for ExternallyManagedLineMode {
    fn configure(&self, port: &str, mode: LineMode) -> Result<()> {
        info!(port = %port, mode = %mode, "line mode is managed externally");
        Ok(())
    }
}

/// Configurator that remembers every request. Used by simulated lines.
#[derive(Debug, Default, Clone)]
pub struct RecordingLineMode {
    applied: Arc<Mutex<Vec<(String, LineMode)>>>,
}

impl RecordingLineMode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(port, mode)` pair applied so far, oldest first.
    pub fn applied(&self) -> Vec<(String, LineMode)> {
        self.applied
            .lock()
            .map(|applied| applied.clone())
            .unwrap_or_default()
    }
}

impl LineModeConfigurator for RecordingLineMode {
    fn configure(&self, port: &str, mode: LineMode) -> Result<()> {
        debug!(port = %port, mode = %mode, "recording line mode");
        self.applied
            .lock()
            .map_err(|_| HardwareError::configuration(format!("line mode of {port} not recorded")))?
            .push((port.to_string(), mode));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_line_mode() {
        let configurator = RecordingLineMode::new();
        let shared = configurator.clone();

        configurator.configure("COM3", LineMode::Rs422).unwrap();
        configurator
            .configure("COM4", LineMode::Rs485TwoWire)
            .unwrap();

        assert_eq!(
            shared.applied(),
            vec![
                ("COM3".to_string(), LineMode::Rs422),
                ("COM4".to_string(), LineMode::Rs485TwoWire),
            ]
        );
    }

    #[test]
    fn test_poisoned_recorder_reports_configuration_error() {
        let configurator = RecordingLineMode::new();
        let shared = configurator.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.applied.lock().unwrap();
            panic!("poison the log");
        })
        .join();

        let err = configurator.configure("COM3", LineMode::Rs422).unwrap_err();
        assert!(matches!(err, HardwareError::ConfigurationError { .. }));
        assert!(configurator.applied().is_empty());
    }

    #[test]
    fn test_externally_managed_accepts_every_mode() {
        let configurator = ExternallyManagedLineMode;
        for mode in [
            LineMode::Rs232,
            LineMode::Rs422,
            LineMode::Rs485TwoWire,
            LineMode::Rs485FourWire,
        ] {
            assert!(configurator.configure("COM1", mode).is_ok());
        }
    }
}
