use anyhow::Result;

use crate::executor::MissionConfig;
use crate::geofence::GeofenceConfig;

pub fn check_geofence(fence: &GeofenceConfig) -> Result<()> {
    anyhow::ensure!(
        fence.home.lat.abs() <= 90.0 && fence.home.lon.abs() <= 180.0,
        "geofence.home coordinates invalid"
    );
    anyhow::ensure!(fence.max_radius_m >= 50.0, "geofence.max_radius_m too small");
    anyhow::ensure!(fence.max_alt_m > fence.min_alt_m, "geofence.max_alt_m must exceed min_alt_m");
    anyhow::ensure!(fence.min_alt_m >= 0.0, "geofence.min_alt_m must not be negative");
    anyhow::ensure!(
        fence.polygon.is_empty() || fence.polygon.len() >= 3,
        "geofence.polygon needs >= 3 points"
    );
    Ok(())
}

pub fn check_mission(m: &MissionConfig) -> Result<()> {
    anyhow::ensure!(m.arrival_radius_m > 0.0 && m.arrival_radius_m <= 20.0, "mission.arrival_radius_m should be 0..20");
    anyhow::ensure!(m.arrival_speed_mps > 0.0, "mission.arrival_speed_mps must be positive");
    anyhow::ensure!(m.tick_hz >= 1.0 && m.tick_hz <= 50.0, "mission.tick_hz should be 1..50");
    anyhow::ensure!(m.hold_timeout_s >= 1, "mission.hold_timeout_s must be at least 1");
    anyhow::ensure!(
        m.return_timeout_s > m.hold_timeout_s,
        "mission.return_timeout_s must exceed hold_timeout_s"
    );
    anyhow::ensure!(m.stale_max_speed_mps > 0.0, "mission.stale_max_speed_mps must be positive");
    Ok(())
}
