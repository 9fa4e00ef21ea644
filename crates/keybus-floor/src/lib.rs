//! Floors, rooms and polling for the keybus gateway.
//!
//! A floor is one serial line and the door controllers on it. This crate
//! keeps per-room state, runs each floor's polling loop, revokes expired
//! keys, raises alerts, and supervises lines that are not yet available.
//!
//! - [`Room`] / [`RoomSet`] - pure per-controller state
//! - [`Floor`] - bus operations with store write-through
//! - [`FloorPoller`] - adaptive sweep loop with cooperative cancellation
//! - [`FloorsSupervisor`] - line opening, retry queue, poller lifecycle
//! - [`Gateway`] - session-facing operations keyed by port
//!
//! ```no_run
//! use keybus_core::GatewayConfig;
//! use keybus_floor::{FloorsSupervisor, Gateway, GatewayContext};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = GatewayContext::open(GatewayConfig::default()).await?;
//! let supervisor = Arc::new(FloorsSupervisor::new(Arc::new(ctx)));
//! supervisor.start().await?;
//! let retry = supervisor.spawn_retry_loop();
//!
//! let gateway = Gateway::new(Arc::clone(&supervisor));
//! let mut alerts = gateway.join("COM3").await?;
//! while let Some(alert) = alerts.recv().await {
//!     println!("{alert:?}");
//! }
//!
//! supervisor.shutdown().await;
//! retry.await?;
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod context;
pub mod error;
pub mod floor;
pub mod gateway;
pub mod poller;
pub mod room;
pub mod schedule;
pub mod supervisor;

pub use alert::{Alert, AlertSink};
pub use context::GatewayContext;
pub use error::{FloorError, Result};
pub use floor::Floor;
pub use gateway::Gateway;
pub use poller::{FloorPoller, PollerHandle, PollerState};
pub use room::{KeySlot, Room, RoomSet};
pub use schedule::{PollSchedule, SweepPlan};
pub use supervisor::FloorsSupervisor;
