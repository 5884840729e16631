//! Autonomy level as a function of link connectivity.
//!
//! ```text
//! CONNECTED --link lost--> DEGRADED --hold timeout--> HOLDING
//!     ^                                                  |
//!     |                                     return timeout
//!     +--- link restored (from any state) --- RETURNING <+
//!                                                              |
//!                                                     return complete --> LANDED
//! ```
//!
//! The disconnection timer starts at detected loss and is carried across
//! states; it is only reset by reconnection. At most one edge is taken per
//! evaluation so no state is ever skipped. A segment still in flight does
//! not delay HOLDING; it only runs out the DEGRADED window if it finishes
//! first.

use std::time::{Duration, Instant};
use tracing::{info, warn};

use sentinel_proto::runtime::RuntimeConfig;
use sentinel_proto::vehicle::ConnectivityState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailSafeTimeouts {
    /// Elapsed disconnection after which DEGRADED escalates to HOLDING.
    pub hold: Duration,
    /// Elapsed disconnection after which HOLDING escalates to RETURNING.
    pub ret: Duration,
}

impl From<&RuntimeConfig> for FailSafeTimeouts {
    fn from(rc: &RuntimeConfig) -> Self {
        Self { hold: rc.hold_timeout, ret: rc.return_timeout }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FailSafeInput {
    pub link_up: bool,
    pub return_complete: bool,
    /// Latched autopilot loss; escalates one edge per evaluation and
    /// suppresses reconnection until cleared.
    pub autopilot_fault: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: ConnectivityState,
    pub to: ConnectivityState,
    pub reason: &'static str,
    pub disconnected: Duration,
}

#[derive(Debug, Clone)]
pub struct FailSafe {
    state: ConnectivityState,
    disconnected_since: Option<Instant>,
}

impl Default for FailSafe {
    fn default() -> Self {
        Self::new()
    }
}

impl FailSafe {
    pub fn new() -> Self {
        Self { state: ConnectivityState::Connected, disconnected_since: None }
    }

    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn disconnected_for(&self, now: Instant) -> Duration {
        self.disconnected_since
            .map(|t0| now.saturating_duration_since(t0))
            .unwrap_or_default()
    }

    pub fn evaluate(&mut self, input: FailSafeInput, timeouts: FailSafeTimeouts, now: Instant) -> Option<Transition> {
        // Reconnection always wins.
        if input.link_up && !input.autopilot_fault {
            let elapsed = self.disconnected_for(now);
            self.disconnected_since = None;
            if self.state == ConnectivityState::Connected {
                return None;
            }
            return Some(self.shift(ConnectivityState::Connected, "link restored", elapsed));
        }

        if !input.link_up && self.disconnected_since.is_none() {
            self.disconnected_since = Some(now);
        }
        let elapsed = self.disconnected_for(now);
        let forced = input.autopilot_fault;

        let (to, reason) = match self.state {
            ConnectivityState::Connected if forced => (ConnectivityState::Degraded, "autopilot unresponsive"),
            ConnectivityState::Connected => (ConnectivityState::Degraded, "link lost"),
            ConnectivityState::Degraded if forced => (ConnectivityState::Holding, "autopilot unresponsive"),
            ConnectivityState::Degraded if elapsed >= timeouts.hold => {
                (ConnectivityState::Holding, "hold timeout reached")
            }
            ConnectivityState::Holding if forced => (ConnectivityState::Returning, "autopilot unresponsive"),
            ConnectivityState::Holding if elapsed >= timeouts.ret => {
                (ConnectivityState::Returning, "return timeout reached")
            }
            ConnectivityState::Returning if input.return_complete => (ConnectivityState::Landed, "return complete"),
            _ => return None,
        };
        Some(self.shift(to, reason, elapsed))
    }

    fn shift(&mut self, to: ConnectivityState, reason: &'static str, disconnected: Duration) -> Transition {
        let from = self.state;
        self.state = to;
        if to == ConnectivityState::Connected {
            info!("failsafe: {} -> {} ({}, after {:.1}s)", from, to, reason, disconnected.as_secs_f32());
        } else {
            warn!("failsafe: {} -> {} ({}, disconnected {:.1}s)", from, to, reason, disconnected.as_secs_f32());
        }
        Transition { from, to, reason, disconnected }
    }
}
