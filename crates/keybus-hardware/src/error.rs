//! Error types for bus transport operations.
//!
//! Only hard transport faults become errors. A controller that stays silent
//! or answers with a bad checksum is an ordinary read outcome and is reported
//! through `Option`/`ReadingOutcome` values by the driver, never through
//! [`HardwareError`].

pub type Result<T> = std::result::Result<T, HardwareError>;

/// Faults of a serial line or its opener.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The line is not open or has been closed.
    #[error("Line disconnected: {port}")]
    Disconnected { port: String },

    /// A read or write did not complete within its timeout.
    #[error("No response within {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The line reported a fault during a write or read.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// The line could not be opened or configured.
    #[error("Line not opened: {message}")]
    InitializationFailed { message: String },

    /// Electrical line mode could not be applied.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl HardwareError {
    pub fn disconnected(port: impl Into<String>) -> Self {
        Self::Disconnected { port: port.into() }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether the error only means "nothing arrived in time".
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}
