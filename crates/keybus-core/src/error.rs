use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Addressing errors
    #[error("Invalid controller address: {address}")]
    InvalidAddress { address: u8 },

    #[error("Cell index {cell} out of range (controller has {count} cells)")]
    InvalidCell { cell: u8, count: u8 },

    #[error("Invalid key code: {0}")]
    InvalidKeyCode(String),

    #[error("Invalid line mode: {0}")]
    InvalidLineMode(String),

    // Framing errors
    #[error("Frame too short: {len} bytes (minimum {min})")]
    FrameTooShort { len: usize, min: usize },

    #[error("Checksum mismatch: expected {expected:#04X}, calculated {calculated:#04X}")]
    ChecksumMismatch { expected: u8, calculated: u8 },

    #[error("Unknown command code: {code}")]
    UnknownCommand { code: u8 },

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
