pub mod arbiter;
pub mod doctor;
pub mod error;
pub mod mav;
pub mod probe;
pub mod runner;
pub mod transport;
pub mod watchdog;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub use error::InterfaceError;
pub use runner::FlightInterface;
pub use watchdog::FcEvent;

#[derive(Debug, Clone, Deserialize)]
pub struct FcConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Full mavlink connection string, e.g. "udpin:0.0.0.0:14550" for SITL.
    /// Takes precedence over serial_dev/baud.
    pub url: Option<String>,
    pub serial_dev: Option<String>,
    pub baud: Option<u32>,

    /// MAVLink ids we use (companion side)
    #[serde(default = "default_sys_id")]
    pub sys_id: u8,
    #[serde(default = "default_comp_id")]
    pub comp_id: u8,

    /// target system/component (FC side). 1/1 is common for ArduPilot.
    #[serde(default = "default_target")]
    pub target_sys: u8,
    #[serde(default = "default_target")]
    pub target_comp: u8,

    /// Require seeing FC heartbeat before sending commands
    #[serde(default = "default_true")]
    pub require_heartbeat: bool,

    /// Companion heartbeat rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// Rate the autopilot is expected to emit HEARTBEAT at.
    pub autopilot_heartbeat_hz: Option<f32>,

    /// Consecutive missing autopilot heartbeats before it is declared unresponsive.
    #[serde(default = "default_missed")]
    pub missed_heartbeats: u32,

    /// Re-send interval for the effective command.
    #[serde(default = "default_refresh_ms")]
    pub command_refresh_ms: u64,

    /// Rate asked of the autopilot for position and status streams once it
    /// is heard; 0 leaves its stream setup alone.
    #[serde(default = "default_stream_rate")]
    pub stream_rate_hz: u16,

    /// Heartbeat wait for `fc probe`
    pub heartbeat_timeout_ms: Option<u64>,
}

fn default_true() -> bool { true }
fn default_sys_id() -> u8 { 1 }
fn default_comp_id() -> u8 { 191 }
fn default_target() -> u8 { 1 }
fn default_missed() -> u32 { 3 }
fn default_refresh_ms() -> u64 { 1000 }
fn default_stream_rate() -> u16 { 4 }

impl FcConfig {
    pub fn connection_url(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let dev = self.serial_dev.as_deref().context("fc.serial_dev missing (no fc.url)")?;
        let baud = self.baud.context("fc.baud missing (no fc.url)")?;
        Ok(format!("serial:{}:{}", dev, baud))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.send_heartbeat_hz.unwrap_or(1.0).max(1.0))
    }

    pub fn autopilot_heartbeat_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.autopilot_heartbeat_hz.unwrap_or(1.0).clamp(0.2, 50.0))
    }

    pub fn command_refresh(&self) -> Duration {
        Duration::from_millis(self.command_refresh_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(3000))
    }
}
