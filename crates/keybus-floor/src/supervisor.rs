//! Floor discovery, line retry and poller lifecycle.
//!
//! At startup every floor in the store is brought up: its line is opened,
//! its rooms loaded, and its poller started. Key sync and address scans run
//! inside each floor's poller task. A floor whose
//! line will not open, or whose configuration cannot be read, is queued.
//! The retry loop walks the queue on a fixed interval for as long as the
//! supervisor runs. Floors added at runtime join the same queue.

use crate::alert::Alert;
use crate::context::GatewayContext;
use crate::error::{FloorError, Result};
use crate::floor::Floor;
use crate::poller::{FloorPoller, PollerHandle, PollerState};
use keybus_hardware::PortDriver;
use keybus_storage::{FloorRecord, FloorRepository};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct RunningFloor {
    floor: Arc<Floor>,
    poller: Option<PollerHandle>,
}

#[derive(Debug)]
pub struct FloorsSupervisor {
    ctx: Arc<GatewayContext>,
    floors: RwLock<BTreeMap<String, RunningFloor>>,
    pending: Mutex<BTreeSet<String>>,
    cancel: CancellationToken,
}

impl FloorsSupervisor {
    pub fn new(ctx: Arc<GatewayContext>) -> Self {
        Self {
            ctx,
            floors: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(BTreeSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn context(&self) -> &GatewayContext {
        &self.ctx
    }

    /// Bring up every stored floor, queueing the ones that fail.
    ///
    /// # Errors
    ///
    /// Fails only if the floor list itself cannot be read.
    pub async fn start(&self) -> Result<()> {
        let floors = self.ctx.store().floors().find_all().await?;
        info!(count = floors.len(), "floors configured");

        for floor in floors {
            if let Err(e) = self.bring_up(&floor.port_name).await {
                self.queue(&floor.port_name, &e).await;
            }
        }
        Ok(())
    }

    async fn queue(&self, port: &str, cause: &FloorError) {
        if cause.is_configuration_unavailable() {
            warn!(port, error = %cause, "floor configuration unavailable, queued");
        } else {
            warn!(port, error = %cause, "floor not opened, queued");
        }
        self.pending.lock().await.insert(port.to_string());
    }

    /// Open a floor's line, load its rooms, and register it without
    /// starting its poller or touching the bus. Returns the running floor
    /// if it is already up.
    ///
    /// # Errors
    ///
    /// Fails if the line does not open, the floor is not configured or its
    /// configuration cannot be read.
    pub async fn open_floor(&self, port: &str) -> Result<Arc<Floor>> {
        if let Some(floor) = self.floor(port).await {
            return Ok(floor);
        }

        let config = self.ctx.config();
        let transport = self.ctx.opener().open(port, &config.bus)?;
        let driver = PortDriver::new(transport, config.bus.clone(), config.polling.key_cells);

        let snapshot = self
            .ctx
            .store()
            .load_floor(port, config.polling.key_cells)
            .await?
            .ok_or_else(|| FloorError::unknown_floor(port))?;
        let floor = Arc::new(Floor::new(
            &snapshot,
            driver,
            self.ctx.store().clone(),
            config,
        )?);

        let mut floors = self.floors.write().await;
        let entry = floors
            .entry(port.to_string())
            .or_insert_with(|| RunningFloor {
                floor: Arc::clone(&floor),
                poller: None,
            });
        info!(port, name = %entry.floor.name(), rooms = snapshot.rooms.len(), "floor opened");
        Ok(Arc::clone(&entry.floor))
    }

    async fn bring_up(&self, port: &str) -> Result<Arc<Floor>> {
        let floor = self.open_floor(port).await?;
        self.start_polling(port).await?;
        Ok(floor)
    }

    /// Start (or restart) a running floor's poller.
    ///
    /// # Errors
    ///
    /// Fails if the floor is not running.
    pub async fn start_polling(&self, port: &str) -> Result<()> {
        let mut floors = self.floors.write().await;
        let running = floors
            .get_mut(port)
            .ok_or_else(|| FloorError::unknown_floor(port))?;

        if running.poller.as_ref().is_some_and(|p| !p.is_finished()) {
            debug!(port, "poller already running");
            return Ok(());
        }
        let poller = FloorPoller::new(Arc::clone(&running.floor), self.cancel.child_token());
        running.poller = Some(poller.spawn());
        Ok(())
    }

    /// Stop a floor's poller and wait for its current sweep to finish.
    ///
    /// # Errors
    ///
    /// Fails if the floor is not running.
    pub async fn stop_polling(&self, port: &str) -> Result<()> {
        let handle = {
            let mut floors = self.floors.write().await;
            let running = floors
                .get_mut(port)
                .ok_or_else(|| FloorError::unknown_floor(port))?;
            running.poller.take()
        };
        if let Some(handle) = handle {
            handle.stop_and_wait().await;
        }
        Ok(())
    }

    pub async fn poller_state(&self, port: &str) -> Option<PollerState> {
        let floors = self.floors.read().await;
        let running = floors.get(port)?;
        Some(
            running
                .poller
                .as_ref()
                .map_or(PollerState::Stopped, PollerHandle::state),
        )
    }

    pub async fn floor(&self, port: &str) -> Option<Arc<Floor>> {
        self.floors
            .read()
            .await
            .get(port)
            .map(|running| Arc::clone(&running.floor))
    }

    pub async fn running_ports(&self) -> Vec<String> {
        self.floors.read().await.keys().cloned().collect()
    }

    pub async fn pending_ports(&self) -> Vec<String> {
        self.pending.lock().await.iter().cloned().collect()
    }

    /// Store a new floor, tell every running floor's subscriber, and queue
    /// the floor for opening.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the floor.
    pub async fn add_floor(&self, port: &str, name: &str) -> Result<FloorRecord> {
        let record = self.ctx.store().floors().create(port, name).await?;
        info!(port, name, "floor added");

        for running in self.floors.read().await.values() {
            running.floor.emit(Alert::FloorsChanged {
                port: port.to_string(),
            });
        }
        self.pending.lock().await.insert(port.to_string());
        Ok(record)
    }

    /// One pass over the queue. Returns how many floors came up.
    pub async fn retry_pending(&self) -> usize {
        let ports = self.pending_ports().await;
        let mut opened = 0;
        for port in ports {
            match self.bring_up(&port).await {
                Ok(_) => {
                    self.pending.lock().await.remove(&port);
                    opened += 1;
                }
                Err(e) => debug!(port = %port, error = %e, "floor still unavailable"),
            }
        }
        opened
    }

    /// Retry queued floors every `port_retry_ms` until shutdown.
    pub async fn run_retry_loop(&self) {
        let interval = self.ctx.config().polling.port_retry_interval();
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
            let opened = self.retry_pending().await;
            if opened > 0 {
                info!(opened, "queued floors opened");
            }
        }
    }

    pub fn spawn_retry_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move { supervisor.run_retry_loop().await })
    }

    /// Stop the retry loop and every poller, waiting for each to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<PollerHandle> = self
            .floors
            .write()
            .await
            .values_mut()
            .filter_map(|running| running.poller.take())
            .collect();
        for handle in handles {
            handle.stop_and_wait().await;
        }
        info!("supervisor stopped");
    }
}
