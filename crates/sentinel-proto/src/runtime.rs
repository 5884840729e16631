use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote request to change the tunables below. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub telemetry_hz: Option<f32>,
    pub capture_interval_s: Option<f32>,
    pub hold_timeout_s: Option<u64>,
    pub return_timeout_s: Option<u64>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("telemetry rate {0} Hz outside 0.1..=50")]
    TelemetryRate(f32),
    #[error("capture interval {0}s outside 0.5..=600")]
    CaptureInterval(f32),
    #[error("return timeout ({ret}s) must exceed hold timeout ({hold}s)")]
    Timeouts { hold: u64, ret: u64 },
}

/// Tunables the remote side may change in flight. Shared as `Arc<RuntimeConfig>`
/// and replaced wholesale, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub telemetry_hz: f32,
    pub capture_interval: Duration,
    pub hold_timeout: Duration,
    pub return_timeout: Duration,
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.1..=50.0).contains(&self.telemetry_hz) {
            return Err(ConfigError::TelemetryRate(self.telemetry_hz));
        }
        let cap = self.capture_interval.as_secs_f32();
        if !(0.5..=600.0).contains(&cap) {
            return Err(ConfigError::CaptureInterval(cap));
        }
        if self.return_timeout <= self.hold_timeout {
            return Err(ConfigError::Timeouts {
                hold: self.hold_timeout.as_secs(),
                ret: self.return_timeout.as_secs(),
            });
        }
        Ok(())
    }

    pub fn apply(&self, upd: &ConfigUpdate) -> Result<Self, ConfigError> {
        // Duration::from_secs_f32 panics on negative or non-finite input.
        if let Some(s) = upd.capture_interval_s {
            if !(0.5..=600.0).contains(&s) {
                return Err(ConfigError::CaptureInterval(s));
            }
        }
        let next = Self {
            telemetry_hz: upd.telemetry_hz.unwrap_or(self.telemetry_hz),
            capture_interval: upd
                .capture_interval_s
                .map(Duration::from_secs_f32)
                .unwrap_or(self.capture_interval),
            hold_timeout: upd.hold_timeout_s.map(Duration::from_secs).unwrap_or(self.hold_timeout),
            return_timeout: upd.return_timeout_s.map(Duration::from_secs).unwrap_or(self.return_timeout),
        };
        next.validate()?;
        Ok(next)
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.telemetry_hz)
    }
}
