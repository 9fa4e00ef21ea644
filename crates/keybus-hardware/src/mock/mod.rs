//! Simulated lines for development and testing.

pub mod bus;
pub mod opener;

pub use bus::{MockBus, MockBusHandle};
pub use opener::MockOpener;
