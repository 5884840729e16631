use anyhow::Result;
use std::net::SocketAddr;

use crate::AvoidConfig;

pub fn check_avoid(cfg: &AvoidConfig) -> Result<()> {
    if !cfg.enable {
        return Ok(());
    }
    anyhow::ensure!(cfg.rate_hz >= 10.0 && cfg.rate_hz <= 100.0, "avoid.rate_hz should be 10..100");
    anyhow::ensure!(cfg.detection_range_m > 0.0, "avoid.detection_range_m must be positive");
    anyhow::ensure!((0.0..=1.0).contains(&cfg.min_confidence), "avoid.min_confidence should be 0..1");
    anyhow::ensure!(cfg.clearance_buffer_m >= 0.0, "avoid.clearance_buffer_m must not be negative");
    anyhow::ensure!(cfg.default_clearance_m > 0.0, "avoid.default_clearance_m must be positive");
    anyhow::ensure!(cfg.avoid_speed_mps > 0.0, "avoid.avoid_speed_mps must be positive");
    anyhow::ensure!(cfg.resume_clear_cycles >= 1, "avoid.resume_clear_cycles must be at least 1");
    anyhow::ensure!(cfg.grace_cycles <= 1, "avoid.grace_cycles must be 0 or 1");
    if let Some(addr) = &cfg.depth_listen {
        anyhow::ensure!(addr.parse::<SocketAddr>().is_ok(), "avoid.depth_listen must be host:port");
    }
    Ok(())
}
