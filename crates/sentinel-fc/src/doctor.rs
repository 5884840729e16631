use anyhow::Result;

use crate::FcConfig;

pub fn check_fc(fc: &FcConfig) -> Result<()> {
    if !fc.enable {
        return Ok(());
    }
    let url = fc.connection_url()?;
    anyhow::ensure!(
        ["serial:", "udpin:", "udpout:", "udpbcast:", "tcpin:", "tcpout:"].iter().any(|p| url.starts_with(p)),
        "fc connection '{}' has an unknown scheme",
        url
    );
    anyhow::ensure!(fc.send_heartbeat_hz.unwrap_or(1.0) >= 1.0, "fc.send_heartbeat_hz must be >= 1");
    anyhow::ensure!(fc.missed_heartbeats >= 1, "fc.missed_heartbeats must be >= 1");
    anyhow::ensure!(fc.command_refresh_ms >= 100, "fc.command_refresh_ms too small");
    Ok(())
}
