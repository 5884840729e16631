use std::time::{Duration, Instant};

use sentinel_proto::vehicle::NavCommand;

/// Holds at most one command per source. Avoidance overrides win over the
/// mission; a newer command on a source simply replaces the older one.
#[derive(Debug)]
pub struct CommandArbiter {
    mission: Option<NavCommand>,
    override_cmd: Option<NavCommand>,
    last_sent: Option<(NavCommand, Instant)>,
    refresh: Duration,
}

impl CommandArbiter {
    pub fn new(refresh: Duration) -> Self {
        Self { mission: None, override_cmd: None, last_sent: None, refresh }
    }

    pub fn set_mission(&mut self, cmd: Option<NavCommand>) {
        self.mission = cmd;
    }

    pub fn set_override(&mut self, cmd: Option<NavCommand>) {
        self.override_cmd = cmd;
    }

    pub fn effective(&self) -> Option<NavCommand> {
        self.override_cmd.or(self.mission)
    }

    /// Command to put on the wire now: a changed effective command, or the
    /// same one again once the refresh interval has passed.
    pub fn due(&self, now: Instant) -> Option<NavCommand> {
        let eff = self.effective()?;
        match self.last_sent {
            Some((prev, at)) if prev == eff && now.saturating_duration_since(at) < self.refresh => None,
            _ => Some(eff),
        }
    }

    pub fn mark_sent(&mut self, cmd: NavCommand, now: Instant) {
        self.last_sent = Some((cmd, now));
    }
}
