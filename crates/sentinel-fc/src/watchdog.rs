use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::InterfaceError;

#[derive(Debug, Clone, PartialEq)]
pub enum FcEvent {
    /// Raised once per episode.
    Fault(InterfaceError),
    Recovered,
}

/// Counts expected-but-missing autopilot heartbeats. The clock starts at
/// construction so an autopilot that never speaks is also caught.
#[derive(Debug)]
pub struct HeartbeatWatchdog {
    period: Duration,
    missed_limit: u32,
    last_seen: Instant,
    tripped: bool,
}

impl HeartbeatWatchdog {
    pub fn new(period: Duration, missed_limit: u32, now: Instant) -> Self {
        Self { period, missed_limit: missed_limit.max(1), last_seen: now, tripped: false }
    }

    pub fn missed(&self, now: Instant) -> u32 {
        let gap = now.saturating_duration_since(self.last_seen);
        (gap.as_secs_f64() / self.period.as_secs_f64()).floor() as u32
    }

    pub fn on_heartbeat(&mut self, now: Instant) -> Option<FcEvent> {
        self.last_seen = now;
        if self.tripped {
            self.tripped = false;
            info!("autopilot heartbeat back");
            return Some(FcEvent::Recovered);
        }
        None
    }

    pub fn check(&mut self, now: Instant) -> Option<FcEvent> {
        let missed = self.missed(now);
        if self.tripped || missed < self.missed_limit {
            return None;
        }
        self.tripped = true;
        warn!("autopilot unresponsive: {} heartbeats missed", missed);
        Some(FcEvent::Fault(InterfaceError::AutopilotUnresponsive { missed }))
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}
