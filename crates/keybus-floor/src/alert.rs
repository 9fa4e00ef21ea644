//! Outbound notifications and their per-floor delivery slot.

use keybus_core::ControllerAddress;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::trace;

/// Capacity of a subscriber's alert channel.
pub const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Notification raised by a floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// A controller failed more consecutive polls than allowed.
    ControllerUnresponsive {
        port: String,
        address: ControllerAddress,
    },

    /// The reed switch of a protected room changed state.
    SensorEdgeTriggered {
        room_id: i64,
        address: ControllerAddress,
        sensor: u8,
    },

    /// An expired key was revoked.
    KeyUnset {
        port: String,
        address: ControllerAddress,
        cell: u8,
    },

    RoomsChanged { port: String },

    FloorsChanged { port: String },
}

/// Delivers alerts to at most one subscriber.
///
/// Delivery never blocks: with no subscriber, a full channel or a dropped
/// receiver the alert is discarded.
#[derive(Debug, Default)]
pub struct AlertSink {
    subscriber: Mutex<Option<Sender<Alert>>>,
}

impl AlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current subscriber with a fresh channel.
    pub fn subscribe(&self) -> Receiver<Alert> {
        let (tx, rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);
        if let Ok(mut slot) = self.subscriber.lock() {
            *slot = Some(tx);
        }
        rx
    }

    pub fn has_subscriber(&self) -> bool {
        self.subscriber
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }

    pub fn emit(&self, alert: Alert) {
        let Ok(mut slot) = self.subscriber.lock() else {
            return;
        };
        let Some(tx) = slot.as_ref() else {
            trace!(?alert, "no subscriber, alert dropped");
            return;
        };
        match tx.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(alert)) => {
                trace!(?alert, "subscriber channel full, alert dropped");
            }
            Err(TrySendError::Closed(_)) => {
                *slot = None;
            }
        }
    }
}
