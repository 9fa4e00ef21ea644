//! Gateway configuration.
//!
//! A single [`GatewayConfig`] is built once at startup (from defaults or a
//! TOML file) and handed to every component that needs it. Every field has
//! a default, so a config file only lists what it overrides:
//!
//! ```
//! use keybus_core::GatewayConfig;
//!
//! let config = GatewayConfig::from_toml_str(
//!     r#"
//!     [polling]
//!     key_cells = 16
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.polling.key_cells, 16);
//! assert_eq!(config.polling.repetitions, 3);
//! ```

use crate::constants::*;
use crate::types::{ControllerAddress, LineMode};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bus: BusConfig,
    pub polling: PollingConfig,
    pub storage: StorageConfig,
}

/// Serial line settings and per-call timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub baud_rate: u32,
    pub line_mode: LineMode,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub pre_write_delay_ms: u64,
    pub response_delay_ms: u64,
    pub bulk_response_delay_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            line_mode: LineMode::default(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            pre_write_delay_ms: DEFAULT_PRE_WRITE_DELAY_MS,
            response_delay_ms: DEFAULT_RESPONSE_DELAY_MS,
            bulk_response_delay_ms: DEFAULT_BULK_RESPONSE_DELAY_MS,
        }
    }
}

impl BusConfig {
    /// Zero every delay. Used by tests and by simulated lines.
    pub fn without_delays(mut self) -> Self {
        self.pre_write_delay_ms = 0;
        self.response_delay_ms = 0;
        self.bulk_response_delay_ms = 0;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn pre_write_delay(&self) -> Duration {
        Duration::from_millis(self.pre_write_delay_ms)
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.response_delay_ms)
    }

    pub fn bulk_response_delay(&self) -> Duration {
        Duration::from_millis(self.bulk_response_delay_ms)
    }
}

/// Polling, retry and discovery policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Key cells per controller.
    pub key_cells: u8,
    /// Attempts of the key-table consistency loop.
    pub key_table_readings: u8,
    /// Attempts of each sensor poll / last-key read.
    pub repetitions: u8,
    /// Consecutive failures before a controller is reported unresponsive.
    pub max_read_errors: u32,
    /// Sweeps between two polls of an unprotected room.
    pub non_protected_interval: u32,
    pub idle_backoff_secs: u64,
    pub expiry_sweep_secs: u64,
    pub port_retry_ms: u64,
    /// First address probed at floor start, if discovery is enabled.
    pub scan_from: Option<u8>,
    /// Last address probed at floor start, if discovery is enabled.
    pub scan_to: Option<u8>,
    /// Read every room's key table when its floor starts.
    pub sync_keys_on_start: bool,
    /// Confirm a freshly assigned key through the consistency loop.
    pub verify_assigned_keys: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            key_cells: DEFAULT_KEY_CELLS,
            key_table_readings: DEFAULT_KEY_TABLE_READINGS,
            repetitions: DEFAULT_REPETITIONS,
            max_read_errors: DEFAULT_MAX_READ_ERRORS,
            non_protected_interval: DEFAULT_NON_PROTECTED_INTERVAL,
            idle_backoff_secs: DEFAULT_IDLE_BACKOFF_SECS,
            expiry_sweep_secs: DEFAULT_EXPIRY_SWEEP_SECS,
            port_retry_ms: DEFAULT_PORT_RETRY_MS,
            scan_from: None,
            scan_to: None,
            sync_keys_on_start: true,
            verify_assigned_keys: true,
        }
    }
}

impl PollingConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs)
    }

    pub fn port_retry_interval(&self) -> Duration {
        Duration::from_millis(self.port_retry_ms)
    }

    /// Addresses probed at floor start; empty when discovery is disabled.
    pub fn scan_range(&self) -> Vec<ControllerAddress> {
        match (self.scan_from, self.scan_to) {
            (Some(from), Some(to)) if from <= to => ControllerAddress::range(from, to).collect(),
            _ => Vec::new(),
        }
    }
}

/// Config/audit store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "keybus.db".to_string(),
            max_connections: 5,
        }
    }
}

impl GatewayConfig {
    /// Parse a configuration from TOML text and validate it.
    ///
    /// # Errors
    /// Returns `Error::Config` on malformed TOML or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: GatewayConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    ///
    /// # Errors
    /// Returns `Error::Io` if the file cannot be read, `Error::Config` if it
    /// is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let polling = &self.polling;
        if polling.key_cells == 0 {
            return Err(Error::Config("polling.key_cells must be at least 1".into()));
        }
        if polling.repetitions == 0 {
            return Err(Error::Config("polling.repetitions must be at least 1".into()));
        }
        if polling.key_table_readings == 0 {
            return Err(Error::Config(
                "polling.key_table_readings must be at least 1".into(),
            ));
        }
        if polling.non_protected_interval == 0 {
            return Err(Error::Config(
                "polling.non_protected_interval must be at least 1".into(),
            ));
        }
        match (polling.scan_from, polling.scan_to) {
            (Some(from), Some(to)) if from > to => {
                return Err(Error::Config(format!(
                    "polling.scan_from ({from}) is greater than polling.scan_to ({to})"
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::Config(
                    "polling.scan_from and polling.scan_to must be set together".into(),
                ));
            }
            _ => {}
        }
        if self.bus.baud_rate == 0 {
            return Err(Error::Config("bus.baud_rate must be positive".into()));
        }
        Ok(())
    }

    /// Set the number of key cells per controller.
    pub fn key_cells(mut self, cells: u8) -> Self {
        self.polling.key_cells = cells;
        self
    }

    /// Set the database path.
    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.storage.database_path = path.into();
        self
    }

    /// Enable discovery of controllers in `from..=to` at floor start.
    pub fn scan_range(mut self, from: u8, to: u8) -> Self {
        self.polling.scan_from = Some(from);
        self.polling.scan_to = Some(to);
        self
    }

    /// Zero every bus delay.
    pub fn without_bus_delays(mut self) -> Self {
        self.bus = self.bus.without_delays();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_constants() {
        let config = GatewayConfig::default();

        assert_eq!(config.bus.baud_rate, 9600);
        assert_eq!(config.bus.line_mode, LineMode::Rs422);
        assert_eq!(config.polling.key_cells, 12);
        assert_eq!(config.polling.key_table_readings, 5);
        assert_eq!(config.polling.repetitions, 3);
        assert_eq!(config.polling.max_read_errors, 20);
        assert_eq!(config.polling.non_protected_interval, 100);
        assert_eq!(config.polling.idle_backoff(), Duration::from_secs(15));
        assert_eq!(
            config.polling.expiry_sweep_interval(),
            Duration::from_secs(600)
        );
        assert_eq!(
            config.polling.port_retry_interval(),
            Duration::from_millis(1800)
        );
        assert!(config.polling.scan_range().is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
            [bus]
            line_mode = "rs485-two-wire"
            read_timeout_ms = 800

            [storage]
            database_path = "/var/lib/keybus/keybus.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.line_mode, LineMode::Rs485TwoWire);
        assert_eq!(config.bus.read_timeout(), Duration::from_millis(800));
        assert_eq!(config.bus.write_timeout(), Duration::from_millis(500));
        assert_eq!(config.storage.database_path, "/var/lib/keybus/keybus.db");
        assert_eq!(config.polling.key_cells, 12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(GatewayConfig::from_toml_str("[polling]\nkey_cells = 0").is_err());
        assert!(GatewayConfig::from_toml_str("[polling]\nrepetitions = 0").is_err());
        assert!(
            GatewayConfig::from_toml_str("[polling]\nscan_from = 10\nscan_to = 2").is_err()
        );
        assert!(GatewayConfig::from_toml_str("[polling]\nscan_from = 10").is_err());
        assert!(GatewayConfig::from_toml_str("[bus]\nline_mode = \"rs999\"").is_err());
    }

    #[test]
    fn test_scan_range() {
        let config = GatewayConfig::default().scan_range(3, 6);
        let addresses: Vec<u8> = config
            .polling
            .scan_range()
            .iter()
            .map(|a| a.as_u8())
            .collect();
        assert_eq!(addresses, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[polling]\nmax_read_errors = 7").unwrap();

        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(config.polling.max_read_errors, 7);
    }

    #[test]
    fn test_load_missing_file() {
        let err = GatewayConfig::load("/nonexistent/keybus.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_without_bus_delays() {
        let config = GatewayConfig::default().without_bus_delays();
        assert_eq!(config.bus.pre_write_delay(), Duration::ZERO);
        assert_eq!(config.bus.response_delay(), Duration::ZERO);
        assert_eq!(config.bus.bulk_response_delay(), Duration::ZERO);
        assert_eq!(config.bus.read_timeout(), Duration::from_millis(500));
    }
}
