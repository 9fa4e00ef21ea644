//! Operations exposed to building-management sessions.
//!
//! Every call names the floor by its port. Operations on a floor require it
//! to be running; [`Gateway::add_floor`] is the only way to name a port that
//! is not.

use crate::alert::Alert;
use crate::error::{FloorError, Result};
use crate::floor::Floor;
use crate::room::Room;
use crate::supervisor::FloorsSupervisor;
use chrono::{DateTime, Utc};
use keybus_core::{ControllerAddress, KeyCode};
use keybus_protocol::{KeyReadout, ReadingOutcome};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;

#[derive(Debug, Clone)]
pub struct Gateway {
    supervisor: Arc<FloorsSupervisor>,
}

impl Gateway {
    pub fn new(supervisor: Arc<FloorsSupervisor>) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Arc<FloorsSupervisor> {
        &self.supervisor
    }

    async fn floor(&self, port: &str) -> Result<Arc<Floor>> {
        self.supervisor
            .floor(port)
            .await
            .ok_or_else(|| FloorError::unknown_floor(port))
    }

    pub async fn set_key(
        &self,
        port: &str,
        address: ControllerAddress,
        cell: u8,
        code: KeyCode,
        holder_name: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.floor(port)
            .await?
            .set_key(address, cell, code, holder_name, expires_at)
            .await
    }

    pub async fn unset_key(&self, port: &str, address: ControllerAddress, cell: u8) -> Result<()> {
        self.floor(port).await?.unset_key(address, cell).await
    }

    pub async fn read_key(&self, port: &str, address: ControllerAddress) -> Result<ReadingOutcome> {
        self.floor(port).await?.read_key(address).await
    }

    pub async fn get_all_keys(
        &self,
        port: &str,
        address: ControllerAddress,
    ) -> Result<KeyReadout> {
        self.floor(port).await?.get_all_keys(address).await
    }

    pub async fn set_room_to_protect(
        &self,
        port: &str,
        address: ControllerAddress,
        protected: bool,
    ) -> Result<()> {
        self.floor(port)
            .await?
            .set_protected(address, protected)
            .await
    }

    pub async fn set_room_online(
        &self,
        port: &str,
        address: ControllerAddress,
        online: bool,
    ) -> Result<()> {
        self.floor(port).await?.set_online(address, online).await
    }

    pub async fn set_light(&self, port: &str, address: ControllerAddress, on: bool) -> Result<()> {
        self.floor(port).await?.set_light(address, on).await
    }

    pub async fn change_address(
        &self,
        port: &str,
        address: ControllerAddress,
        new_address: ControllerAddress,
    ) -> Result<()> {
        self.floor(port)
            .await?
            .change_address(address, new_address)
            .await
    }

    /// Subscribe to a running floor's alerts. A later join replaces the
    /// earlier subscriber.
    pub async fn join(&self, port: &str) -> Result<Receiver<Alert>> {
        Ok(self.floor(port).await?.subscribe())
    }

    pub async fn add_room(
        &self,
        port: &str,
        room_number: i64,
        address: ControllerAddress,
        protected: bool,
    ) -> Result<Room> {
        self.floor(port)
            .await?
            .add_room(room_number, address, protected)
            .await
    }

    pub async fn add_floor(&self, port: &str, name: &str) -> Result<()> {
        self.supervisor.add_floor(port, name).await.map(|_| ())
    }

    pub async fn start_polling(&self, port: &str) -> Result<()> {
        self.supervisor.start_polling(port).await
    }

    pub async fn stop_polling(&self, port: &str) -> Result<()> {
        self.supervisor.stop_polling(port).await
    }
}
