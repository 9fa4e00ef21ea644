//! Shared fixtures: an in-memory store and a floor over a simulated bus.

#![allow(dead_code)]

use keybus_core::{CellIndex, ControllerAddress, GatewayConfig};
use keybus_floor::Floor;
use keybus_hardware::mock::{MockBus, MockBusHandle};
use keybus_hardware::{AnyTransport, PortDriver};
use keybus_storage::{FloorRepository, NewRoom, Store};
use std::sync::Arc;

pub const PORT: &str = "COM3";

pub fn addr(n: u8) -> ControllerAddress {
    ControllerAddress::new(n).unwrap()
}

pub fn cell(n: u8) -> CellIndex {
    CellIndex::new(n, 12).unwrap()
}

/// Defaults with every bus delay zeroed and no start-up sync.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default().without_bus_delays();
    config.polling.sync_keys_on_start = false;
    config
}

pub struct Fixture {
    pub floor: Arc<Floor>,
    pub bus: MockBusHandle,
    pub store: Store,
}

/// A floor on [`PORT`] with the given `(address, protected)` rooms, each
/// backed by a simulated controller.
pub async fn floor_with(rooms: &[(u8, bool)], config: &GatewayConfig) -> Fixture {
    let store = Store::in_memory().await.unwrap();
    let record = store.floors().create(PORT, "First floor").await.unwrap();

    let (bus, handle) = MockBus::new(PORT);
    for &(a, protected) in rooms {
        store
            .add_room(
                &NewRoom::new(record.id, 100 + i64::from(a), addr(a)).protected(protected),
                config.polling.key_cells,
            )
            .await
            .unwrap();
        handle.add_controller(addr(a)).await;
    }

    let snapshot = store
        .load_floor(PORT, config.polling.key_cells)
        .await
        .unwrap()
        .unwrap();
    let driver = PortDriver::new(
        AnyTransport::Mock(bus),
        config.bus.clone(),
        config.polling.key_cells,
    );
    let floor = Floor::new(&snapshot, driver, store.clone(), config).unwrap();

    Fixture {
        floor: Arc::new(floor),
        bus: handle,
        store,
    }
}
