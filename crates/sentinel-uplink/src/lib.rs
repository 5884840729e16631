pub mod buffer;
pub mod doctor;
mod backoff;
mod liveness;
mod manager;
mod transport;

pub use buffer::OutboundBuffer;
pub use manager::{spawn, Directive, LinkManager, Reporter};
pub use transport::Endpoint;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct UplinkConfig {
    /// `tcp://host:port` or `tls://host:port`.
    pub endpoint: String,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    /// Silence from the remote side longer than this declares the link down.
    /// Every fail-safe timer starts counting from that moment.
    #[serde(default = "default_loss_window_ms")]
    pub loss_window_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_buffer_max_records")]
    pub buffer_max_records: usize,
    #[serde(default = "default_buffer_max_age_s")]
    pub buffer_max_age_s: u64,
}

fn default_heartbeat_ms() -> u64 { 1000 }
fn default_loss_window_ms() -> u64 { 3000 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_backoff_min_ms() -> u64 { 500 }
fn default_backoff_max_ms() -> u64 { 30_000 }
fn default_buffer_max_records() -> usize { 1000 }
fn default_buffer_max_age_s() -> u64 { 3600 }

impl UplinkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            heartbeat_ms: default_heartbeat_ms(),
            loss_window_ms: default_loss_window_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            buffer_max_records: default_buffer_max_records(),
            buffer_max_age_s: default_buffer_max_age_s(),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn loss_window(&self) -> Duration {
        Duration::from_millis(self.loss_window_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn buffer_max_age(&self) -> Duration {
        Duration::from_secs(self.buffer_max_age_s)
    }
}
