use std::time::{Duration, Instant};

/// Inbound-silence detector. Any traffic from the remote side counts.
#[derive(Debug, Clone)]
pub(crate) struct Liveness {
    window: Duration,
    last_rx: Instant,
}

impl Liveness {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self { window, last_rx: now }
    }

    pub fn on_inbound(&mut self, now: Instant) {
        self.last_rx = now;
    }

    /// Instant at which the link is declared lost absent further traffic.
    pub fn deadline(&self) -> Instant {
        self.last_rx + self.window
    }

    pub fn expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }
}
