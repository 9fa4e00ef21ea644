//! Simulated controller bus for testing and development.
//!
//! [`MockBus`] behaves like a serial line with door controllers attached.
//! Frames written to it are decoded, applied to the simulated controllers,
//! and any response is queued for the next read. A [`MockBusHandle`] shares
//! the same state and lets tests inspect controllers and inject faults.

use crate::{Result, error::HardwareError, traits::BusTransport};
use keybus_core::{CellIndex, ControllerAddress, KeyCode, constants::DEFAULT_KEY_CELLS};
use keybus_protocol::{Frame, OutputBits, Request, SensorReading, encode_key_record};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

/// State of one simulated door controller.
#[derive(Debug, Clone)]
struct SimController {
    cells: Vec<KeyCode>,
    sensor: u8,
    last_key_cell: u8,
    last_key: KeyCode,
    outputs: OutputBits,
    responsive: bool,
    /// Cells whose record checksum is corrupted, one entry per upcoming
    /// `ReadAllKeys`.
    corrupt_reads: VecDeque<Vec<u8>>,
    /// Upcoming sensor polls that go unanswered.
    silent_polls: u32,
}

impl SimController {
    fn new(cell_count: u8) -> Self {
        Self {
            cells: vec![KeyCode::EMPTY; cell_count as usize],
            sensor: 0,
            last_key_cell: 0,
            last_key: KeyCode::EMPTY,
            outputs: OutputBits::NONE,
            responsive: true,
            corrupt_reads: VecDeque::new(),
            silent_polls: 0,
        }
    }
}

#[derive(Debug)]
struct BusState {
    name: String,
    cell_count: u8,
    open: bool,
    fail_writes: bool,
    controllers: BTreeMap<u8, SimController>,
    pending: VecDeque<u8>,
    requests: Vec<Request>,
}

impl BusState {
    fn apply(&mut self, request: Request) {
        self.requests.push(request);
        let address = request.address().as_u8();
        let Some(controller) = self.controllers.get_mut(&address) else {
            trace!(port = %self.name, address, "no controller at address");
            return;
        };
        if !controller.responsive {
            return;
        }

        match request {
            Request::AssignKey { cell, code, .. } => {
                controller.cells[cell.as_usize()] = code;
            }
            Request::RevokeKey { cell, .. } => {
                controller.cells[cell.as_usize()] = KeyCode::EMPTY;
            }
            Request::SetOutputs { outputs, .. } => {
                controller.outputs = outputs;
            }
            Request::ChangeAddress { new_address, .. } => {
                if let Some(moved) = self.controllers.remove(&address) {
                    self.controllers.insert(new_address.as_u8(), moved);
                }
            }
            Request::ReadAllKeys { .. } => {
                let corrupt = controller.corrupt_reads.pop_front().unwrap_or_default();
                for (i, code) in controller.cells.iter().enumerate() {
                    let mut record = encode_key_record(code);
                    if corrupt.contains(&(i as u8)) {
                        record[record.len() - 1] ^= 0xFF;
                    }
                    self.pending.extend(record);
                }
            }
            Request::ReadSensorAndLastKey { .. } => {
                if controller.silent_polls > 0 {
                    controller.silent_polls -= 1;
                    return;
                }
                let reading = SensorReading {
                    sensor: controller.sensor,
                    last_key_cell: controller.last_key_cell,
                };
                self.pending.extend(reading.encode());
            }
            Request::GetLastKey { .. } => {
                self.pending.extend(encode_key_record(&controller.last_key));
            }
        }
    }
}

/// Simulated serial line with door controllers attached.
///
/// # Examples
///
/// ```
/// use keybus_core::{CellIndex, ControllerAddress, KeyCode};
/// use keybus_hardware::mock::MockBus;
///
/// #[tokio::main]
/// async fn main() {
///     let (_bus, handle) = MockBus::new("COM3");
///     let address = ControllerAddress::new(5).unwrap();
///
///     handle.add_controller(address).await;
///     handle
///         .set_cell(address, CellIndex::new(3, 12).unwrap(), KeyCode::new([1, 2, 3, 4, 5]))
///         .await;
///
///     let cells = handle.cells(address).await.unwrap();
///     assert_eq!(cells[3], KeyCode::new([1, 2, 3, 4, 5]));
/// }
/// ```
#[derive(Debug)]
pub struct MockBus {
    name: String,
    cell_count: u8,
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    /// Create a bus with the default number of key cells per controller.
    pub fn new(name: impl Into<String>) -> (Self, MockBusHandle) {
        Self::with_cells(name, DEFAULT_KEY_CELLS)
    }

    pub fn with_cells(name: impl Into<String>, cell_count: u8) -> (Self, MockBusHandle) {
        let name = name.into();
        let state = Arc::new(Mutex::new(BusState {
            name: name.clone(),
            cell_count,
            open: true,
            fail_writes: false,
            controllers: BTreeMap::new(),
            pending: VecDeque::new(),
            requests: Vec::new(),
        }));

        let handle = MockBusHandle {
            name,
            cell_count,
            state,
        };
        (handle.connect(), handle)
    }
}

impl BusTransport for MockBus {
    fn port_name(&self) -> &str {
        &self.name
    }

    fn is_open(&self) -> bool {
        self.state.try_lock().map(|s| s.open).unwrap_or(true)
    }

    async fn write_all(&mut self, bytes: &[u8], _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(HardwareError::disconnected(&self.name));
        }
        if state.fail_writes {
            return Err(HardwareError::communication("simulated write failure"));
        }

        state.pending.clear();
        let request = Frame::parse(bytes).and_then(|frame| Request::from_frame(&frame, self.cell_count));
        match request {
            Ok(request) => state.apply(request),
            Err(e) => trace!(port = %self.name, error = %e, "controllers ignored frame"),
        }
        Ok(())
    }

    async fn read_exact(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(HardwareError::disconnected(&self.name));
        }
        if state.pending.len() < len {
            state.pending.clear();
            return Err(HardwareError::timeout(timeout.as_millis() as u64));
        }
        Ok(state.pending.drain(..len).collect())
    }
}

/// Handle for controlling a [`MockBus`].
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    name: String,
    cell_count: u8,
    state: Arc<Mutex<BusState>>,
}

impl MockBusHandle {
    /// A new transport attached to the same simulated line.
    pub fn connect(&self) -> MockBus {
        MockBus {
            name: self.name.clone(),
            cell_count: self.cell_count,
            state: Arc::clone(&self.state),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.name
    }

    /// Attach a responsive controller with empty key cells.
    pub async fn add_controller(&self, address: ControllerAddress) {
        let mut state = self.state.lock().await;
        let cell_count = state.cell_count;
        state
            .controllers
            .insert(address.as_u8(), SimController::new(cell_count));
    }

    pub async fn remove_controller(&self, address: ControllerAddress) {
        self.state.lock().await.controllers.remove(&address.as_u8());
    }

    /// Addresses of every attached controller, ascending.
    pub async fn controller_addresses(&self) -> Vec<u8> {
        self.state.lock().await.controllers.keys().copied().collect()
    }

    /// Make a controller stop (or resume) answering.
    pub async fn set_responsive(&self, address: ControllerAddress, responsive: bool) {
        self.with_controller(address, |c| c.responsive = responsive)
            .await;
    }

    pub async fn set_sensor(&self, address: ControllerAddress, sensor: u8) {
        self.with_controller(address, |c| c.sensor = sensor).await;
    }

    /// Simulate a key being presented to the controller's reader.
    pub async fn present_key(&self, address: ControllerAddress, cell: CellIndex, code: KeyCode) {
        self.with_controller(address, |c| {
            c.last_key_cell = cell.as_u8();
            c.last_key = code;
        })
        .await;
    }

    pub async fn set_cell(&self, address: ControllerAddress, cell: CellIndex, code: KeyCode) {
        self.with_controller(address, |c| {
            if let Some(slot) = c.cells.get_mut(cell.as_usize()) {
                *slot = code;
            }
        })
        .await;
    }

    pub async fn cells(&self, address: ControllerAddress) -> Option<Vec<KeyCode>> {
        let state = self.state.lock().await;
        state.controllers.get(&address.as_u8()).map(|c| c.cells.clone())
    }

    pub async fn outputs(&self, address: ControllerAddress) -> Option<OutputBits> {
        let state = self.state.lock().await;
        state.controllers.get(&address.as_u8()).map(|c| c.outputs)
    }

    /// Queue corrupted cells for the controller's next key-table reads.
    ///
    /// Each entry of `reads` applies to one `ReadAllKeys`, in order.
    pub async fn corrupt_key_reads(&self, address: ControllerAddress, reads: Vec<Vec<u8>>) {
        self.with_controller(address, |c| c.corrupt_reads.extend(reads))
            .await;
    }

    /// Leave the next `count` sensor polls of a controller unanswered.
    pub async fn drop_sensor_polls(&self, address: ControllerAddress, count: u32) {
        self.with_controller(address, |c| c.silent_polls = count)
            .await;
    }

    /// Make every write fail with a communication error.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    /// Close or reopen the line.
    pub async fn set_open(&self, open: bool) {
        self.state.lock().await.open = open;
    }

    /// Every request decoded so far, oldest first.
    pub async fn requests(&self) -> Vec<Request> {
        self.state.lock().await.requests.clone()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }

    async fn with_controller(&self, address: ControllerAddress, f: impl FnOnce(&mut SimController)) {
        let mut state = self.state.lock().await;
        if let Some(controller) = state.controllers.get_mut(&address.as_u8()) {
            f(controller);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keybus_protocol::{KeyReadout, ReadingOutcome};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn addr(n: u8) -> ControllerAddress {
        ControllerAddress::new(n).unwrap()
    }

    fn cell(n: u8) -> CellIndex {
        CellIndex::new(n, 12).unwrap()
    }

    async fn send(bus: &mut MockBus, request: Request) {
        bus.write_all(request.to_frame().as_bytes(), TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_assign_then_read_all_keys() {
        let (mut bus, handle) = MockBus::new("COM1");
        handle.add_controller(addr(5)).await;

        let code = KeyCode::new([1, 2, 3, 4, 5]);
        send(
            &mut bus,
            Request::AssignKey {
                address: addr(5),
                cell: cell(3),
                code,
            },
        )
        .await;
        send(&mut bus, Request::ReadAllKeys { address: addr(5) }).await;

        let buf = bus.read_exact(72, TIMEOUT).await.unwrap();
        let readout = KeyReadout::parse(&buf, 12);
        assert!(readout.is_fully_valid());
        assert_eq!(readout.get(cell(3)), ReadingOutcome::Valid(code));
    }

    #[tokio::test]
    async fn test_unknown_address_times_out() {
        let (mut bus, _handle) = MockBus::new("COM1");
        send(&mut bus, Request::ReadSensorAndLastKey { address: addr(9) }).await;

        let err = bus.read_exact(3, TIMEOUT).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_corrupt_reads_apply_once() {
        let (mut bus, handle) = MockBus::new("COM1");
        handle.add_controller(addr(2)).await;
        handle.corrupt_key_reads(addr(2), vec![vec![0, 7]]).await;

        send(&mut bus, Request::ReadAllKeys { address: addr(2) }).await;
        let first = KeyReadout::parse(&bus.read_exact(72, TIMEOUT).await.unwrap(), 12);
        assert_eq!(first.get(cell(0)), ReadingOutcome::InvalidChecksum);
        assert_eq!(first.get(cell(7)), ReadingOutcome::InvalidChecksum);
        assert_eq!(first.valid_count(), 10);

        send(&mut bus, Request::ReadAllKeys { address: addr(2) }).await;
        let second = KeyReadout::parse(&bus.read_exact(72, TIMEOUT).await.unwrap(), 12);
        assert!(second.is_fully_valid());
    }

    #[tokio::test]
    async fn test_change_address_moves_controller() {
        let (mut bus, handle) = MockBus::new("COM1");
        handle.add_controller(addr(1)).await;

        send(
            &mut bus,
            Request::ChangeAddress {
                address: addr(1),
                new_address: addr(40),
            },
        )
        .await;

        assert_eq!(handle.controller_addresses().await, vec![40]);
    }

    #[tokio::test]
    async fn test_fail_writes_and_closed_line() {
        let (mut bus, handle) = MockBus::new("COM1");
        handle.set_fail_writes(true).await;
        let frame = Request::ReadAllKeys { address: addr(1) }.to_frame();
        assert!(bus.write_all(frame.as_bytes(), TIMEOUT).await.is_err());

        handle.set_fail_writes(false).await;
        handle.set_open(false).await;
        let err = bus.write_all(frame.as_bytes(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, HardwareError::Disconnected { .. }));
        assert!(!bus.is_open());
    }

    #[tokio::test]
    async fn test_garbage_is_ignored() {
        let (mut bus, handle) = MockBus::new("COM1");
        handle.add_controller(addr(1)).await;

        bus.write_all(&[1, 5, 99], TIMEOUT).await.unwrap();
        assert!(handle.requests().await.is_empty());
        assert!(bus.read_exact(72, TIMEOUT).await.is_err());
    }
}
