//! Integration tests for `PortDriver` over a simulated bus.

use keybus_core::{BusConfig, CellIndex, ControllerAddress, KeyCode, LineMode};
use keybus_hardware::mock::{MockBus, MockBusHandle, MockOpener};
use keybus_hardware::{AnyTransport, HardwareError, LineOpener, PortDriver};
use keybus_protocol::{ChecksumFramer, CommandCode, OutputBits, ReadingOutcome, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn addr(n: u8) -> ControllerAddress {
    ControllerAddress::new(n).unwrap()
}

fn cell(n: u8) -> CellIndex {
    CellIndex::new(n, 12).unwrap()
}

async fn driver_with(addresses: &[u8]) -> (PortDriver, MockBusHandle) {
    let (bus, handle) = MockBus::new("COM3");
    for a in addresses {
        handle.add_controller(addr(*a)).await;
    }
    let driver = PortDriver::new(AnyTransport::Mock(bus), BusConfig::default(), 12);
    (driver, handle)
}

#[tokio::test(start_paused = true)]
async fn assign_key_then_read_all_keys() {
    let (driver, handle) = driver_with(&[5]).await;
    let code = KeyCode::new([1, 2, 3, 4, 5]);

    driver.assign_key(addr(5), cell(3), code).await.unwrap();
    let readout = driver.read_all_keys(addr(5)).await;

    assert!(readout.is_fully_valid());
    assert_eq!(readout.get(cell(3)), ReadingOutcome::Valid(code));
    assert_eq!(handle.cells(addr(5)).await.unwrap()[3], code);
    assert_eq!(driver.last_responded_address(), Some(addr(5)));
}

#[tokio::test(start_paused = true)]
async fn revoke_key_empties_cell() {
    let (driver, handle) = driver_with(&[5]).await;
    handle.set_cell(addr(5), cell(1), KeyCode::new([9; 5])).await;

    driver.revoke_key(addr(5), cell(1)).await.unwrap();

    assert!(handle.cells(addr(5)).await.unwrap()[1].is_empty());
}

#[tokio::test(start_paused = true)]
async fn read_all_keys_isolates_corrupt_records() {
    let (driver, handle) = driver_with(&[5]).await;
    handle.corrupt_key_reads(addr(5), vec![vec![2, 9]]).await;

    let readout = driver.read_all_keys(addr(5)).await;

    assert_eq!(readout.valid_count(), 10);
    assert_eq!(readout.get(cell(2)), ReadingOutcome::InvalidChecksum);
    assert_eq!(readout.get(cell(9)), ReadingOutcome::InvalidChecksum);
}

#[tokio::test(start_paused = true)]
async fn read_all_keys_never_fails() {
    let (driver, handle) = driver_with(&[5]).await;

    // Silent controller.
    let readout = driver.read_all_keys(addr(7)).await;
    assert_eq!(readout.cell_count(), 12);
    assert!(readout.iter().all(|o| *o == ReadingOutcome::Unknown));

    // Write failure.
    handle.set_fail_writes(true).await;
    let readout = driver.read_all_keys(addr(5)).await;
    assert_eq!(readout.valid_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn sensor_poll_returns_none_when_silent() {
    let (driver, handle) = driver_with(&[5]).await;
    handle.set_sensor(addr(5), 0x80).await;
    handle.drop_sensor_polls(addr(5), 1).await;

    assert_eq!(driver.read_sensor_and_last_key(addr(5)).await.unwrap(), None);

    let reading = driver
        .read_sensor_and_last_key(addr(5))
        .await
        .unwrap()
        .unwrap();
    assert!(reading.reed_switch());
}

#[tokio::test(start_paused = true)]
async fn get_last_key_reads_presented_key() {
    let (driver, handle) = driver_with(&[5]).await;
    let code = KeyCode::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
    handle.present_key(addr(5), cell(4), code).await;

    assert_eq!(
        driver.get_last_key(addr(5)).await.unwrap(),
        ReadingOutcome::Valid(code)
    );
    assert_eq!(
        driver.get_last_key(addr(6)).await.unwrap(),
        ReadingOutcome::Unknown
    );
}

#[tokio::test(start_paused = true)]
async fn set_outputs_and_change_address() {
    let (driver, handle) = driver_with(&[5]).await;

    driver
        .set_outputs(addr(5), OutputBits::light(true))
        .await
        .unwrap();
    assert!(handle.outputs(addr(5)).await.unwrap().is_light_on());

    driver.change_address(addr(5), addr(6)).await.unwrap();
    assert_eq!(handle.controller_addresses().await, vec![6]);
}

#[tokio::test(start_paused = true)]
async fn write_failure_is_reported() {
    let (driver, handle) = driver_with(&[5]).await;
    handle.set_fail_writes(true).await;

    let err = driver
        .assign_key(addr(5), cell(0), KeyCode::new([1; 5]))
        .await
        .unwrap_err();
    assert!(matches!(err, HardwareError::CommunicationError { .. }));

    handle.set_fail_writes(false).await;
    handle.set_open(false).await;
    assert!(driver.read_sensor_and_last_key(addr(5)).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn write_frame_and_read_fixed() {
    let (driver, handle) = driver_with(&[5]).await;
    handle.set_sensor(addr(5), 0x10).await;

    let frame = ChecksumFramer::build(addr(5), CommandCode::ReadSensorAndLastKey, &[]);
    driver.write_frame(&frame).await.unwrap();
    assert_eq!(driver.in_flight_address(), Some(addr(5)));

    let buf = driver.read_fixed(3).await.unwrap().unwrap();
    assert_eq!(buf, vec![0x10, 0, 0x10]);
    assert_eq!(driver.read_fixed(3).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn exchanges_honour_configured_delays() {
    let (driver, _handle) = driver_with(&[5]).await;

    let start = Instant::now();
    driver.read_sensor_and_last_key(addr(5)).await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_millis(100 + 200));

    let start = Instant::now();
    driver.read_all_keys(addr(5)).await;
    assert_eq!(start.elapsed(), Duration::from_millis(100 + 500));
}

#[tokio::test(start_paused = true)]
async fn concurrent_exchanges_never_interleave() {
    let (driver, handle) = driver_with(&[1, 2]).await;
    handle.set_sensor(addr(1), 0x80).await;
    handle.set_sensor(addr(2), 0x00).await;
    let driver = Arc::new(driver);

    let mut tasks = Vec::new();
    for i in 0..20u8 {
        let driver = Arc::clone(&driver);
        let a = if i % 2 == 0 { 1 } else { 2 };
        tasks.push(tokio::spawn(async move {
            let reading = driver.read_sensor_and_last_key(addr(a)).await.unwrap();
            (a, reading)
        }));
    }

    for task in tasks {
        let (a, reading) = task.await.unwrap();
        let reading = reading.expect("every controller answers");
        assert_eq!(reading.reed_switch(), a == 1);
    }

    let requests = handle.requests().await;
    assert_eq!(requests.len(), 20);
    assert!(
        requests
            .iter()
            .all(|r| matches!(r, Request::ReadSensorAndLastKey { .. }))
    );
}

#[test]
fn mock_opener_applies_line_mode() {
    let opener = MockOpener::new();
    opener.add_line("COM4", 12);

    let bus = BusConfig {
        line_mode: LineMode::Rs485FourWire,
        ..BusConfig::default()
    };
    opener.open("COM4", &bus).unwrap();

    assert_eq!(
        opener.line_modes().applied(),
        vec![("COM4".to_string(), LineMode::Rs485FourWire)]
    );
    assert!(opener.open("COM9", &bus).is_err());
}
