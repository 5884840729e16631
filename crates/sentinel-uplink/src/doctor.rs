use anyhow::Result;

use crate::transport::Endpoint;
use crate::UplinkConfig;

pub fn check_uplink(cfg: &UplinkConfig) -> Result<()> {
    Endpoint::parse(&cfg.endpoint)?;
    anyhow::ensure!(cfg.heartbeat_ms >= 100, "uplink.heartbeat_ms too small; set >= 100");
    anyhow::ensure!(
        cfg.loss_window_ms >= 2 * cfg.heartbeat_ms,
        "uplink.loss_window_ms must cover at least two heartbeats"
    );
    anyhow::ensure!(cfg.backoff_min_ms >= 10, "uplink.backoff_min_ms too small");
    anyhow::ensure!(cfg.backoff_max_ms >= cfg.backoff_min_ms, "uplink.backoff_max_ms below backoff_min_ms");
    anyhow::ensure!(cfg.buffer_max_records >= 16, "uplink.buffer_max_records too small; set >= 16");
    anyhow::ensure!(cfg.buffer_max_age_s >= 1, "uplink.buffer_max_age_s must be at least 1");
    Ok(())
}
