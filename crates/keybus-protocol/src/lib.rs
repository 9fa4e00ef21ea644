pub mod commands;
pub mod frame;
pub mod outputs;
pub mod request;
pub mod response;

pub use commands::CommandCode;
pub use frame::{ChecksumFramer, Frame};
pub use outputs::OutputBits;
pub use request::Request;
pub use response::{KeyReadout, ReadingOutcome, SensorReading, encode_key_record, parse_key_record};
