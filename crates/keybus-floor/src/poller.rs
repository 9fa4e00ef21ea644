//! Per-floor polling loop.
//!
//! # States
//!
//! - `Idle`: no online rooms; the loop backs off before looking again
//! - `Polling`: sweeping online rooms
//! - `Stopped`: cancelled; terminal
//!
//! Before the first sweep the loop discovers controllers and syncs key
//! tables, once per floor, so a slow floor never delays another.
//!
//! The loop never stops on its own. Cancellation is checked once per
//! iteration and interrupts the rest between sweeps; a sweep already in
//! progress runs to completion under the driver's per-call timeouts.

use crate::floor::Floor;
use crate::schedule::PollSchedule;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest rest between two sweeps.
const MIN_SWEEP_REST: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Polling,
    Stopped,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Polling => write!(f, "Polling"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Drives one floor's sweeps, expiry checks and alerts.
#[derive(Debug)]
pub struct FloorPoller {
    floor: Arc<Floor>,
    cancel: CancellationToken,
    state: watch::Sender<PollerState>,
}

impl FloorPoller {
    pub fn new(floor: Arc<Floor>, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            floor,
            cancel,
            state,
        }
    }

    /// Start the loop on the runtime.
    pub fn spawn(self) -> PollerHandle {
        let cancel = self.cancel.clone();
        let state = self.state.subscribe();
        let task = tokio::spawn(self.run());
        PollerHandle {
            cancel,
            state,
            task,
        }
    }

    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    fn set_state(&self, next: PollerState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            debug!(port = %self.floor.port_name(), state = %next, "poller state");
        }
    }

    pub async fn run(self) {
        let port = self.floor.port_name().to_string();
        let polling = self.floor.polling().clone();
        let mut schedule = PollSchedule::new(polling.non_protected_interval);
        let mut next_expiry_sweep = Instant::now();

        info!(port = %port, "polling started");
        tokio::select! {
            () = self.cancel.cancelled() => {}
            result = self.floor.ensure_initialized() => {
                if let Err(e) = result {
                    warn!(port = %port, error = %e, "floor initialization failed");
                }
            }
        }

        while !self.cancel.is_cancelled() {
            if Instant::now() >= next_expiry_sweep {
                self.floor.sweep_expired_keys(Utc::now()).await;
                next_expiry_sweep = Instant::now() + polling.expiry_sweep_interval();
            }

            let plan = self.floor.plan_sweep(&mut schedule).await;
            let rest = if plan.is_idle() {
                self.set_state(PollerState::Idle);
                info!(port = %port, "no online rooms");
                polling.idle_backoff()
            } else {
                self.set_state(PollerState::Polling);
                for address in &plan.addresses {
                    self.floor.poll_room(*address).await;
                }
                plan.pace(self.floor.response_delay()).max(MIN_SWEEP_REST)
            };

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(rest) => {}
            }
        }

        self.set_state(PollerState::Stopped);
        info!(port = %port, "polling stopped");
    }
}

/// Control side of a spawned [`FloorPoller`].
#[derive(Debug)]
pub struct PollerHandle {
    cancel: CancellationToken,
    state: watch::Receiver<PollerState>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request a stop; the current sweep finishes first.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Request a stop and wait for the loop to exit.
    pub async fn stop_and_wait(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "poller task ended abnormally");
        }
    }

    /// Wait until the poller reports `target`.
    pub async fn wait_for(&mut self, target: PollerState) {
        // The sender lives as long as the task; an error means it is gone.
        let _ = self.state.wait_for(|state| *state == target).await;
    }
}
