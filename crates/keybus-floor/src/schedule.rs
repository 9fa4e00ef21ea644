//! Which rooms a polling sweep visits and how long it then rests.

use crate::room::RoomSet;
use keybus_core::ControllerAddress;
use std::time::Duration;

/// Rooms selected for one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    /// Online rooms to poll, in address order.
    pub addresses: Vec<ControllerAddress>,
    pub online: usize,
    pub total: usize,
}

impl SweepPlan {
    pub fn is_idle(&self) -> bool {
        self.online == 0
    }

    /// Rest after the sweep: `response_delay * total / online`, so the
    /// sweep time per online room stays the same as the floor shrinks.
    pub fn pace(&self, response_delay: Duration) -> Duration {
        if self.online == 0 {
            return Duration::ZERO;
        }
        let total = u32::try_from(self.total).unwrap_or(u32::MAX);
        let online = u32::try_from(self.online).unwrap_or(u32::MAX);
        response_delay.saturating_mul(total) / online
    }
}

/// Rolling sweep counter biasing polls toward protected rooms.
///
/// Protected rooms are visited on every sweep. Unprotected rooms are
/// visited on one sweep out of every `interval`, or on every sweep while no
/// online room is protected.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: u32,
    sweep: u32,
}

impl PollSchedule {
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            sweep: 0,
        }
    }

    /// Plan the next sweep and advance the counter.
    pub fn next_sweep(&mut self, rooms: &RoomSet) -> SweepPlan {
        let include_unprotected = self.sweep == 0 || !rooms.any_online_protected();
        self.sweep = (self.sweep + 1) % self.interval;

        let addresses = rooms
            .iter()
            .filter(|r| r.is_online())
            .filter(|r| r.is_protected() || include_unprotected)
            .map(|r| r.address())
            .collect();

        SweepPlan {
            addresses,
            online: rooms.online_count(),
            total: rooms.len(),
        }
    }
}
