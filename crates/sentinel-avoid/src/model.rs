use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sentinel_proto::telemetry::AvoidanceKind;

/// One return from the depth sensor, relative to the vehicle nose
/// (bearing 0 = straight ahead, positive clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub bearing_deg: f32,
    pub range_m: f32,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
}

fn full_confidence() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthFrame {
    pub ts_unix_ms: i64,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

/// Severity by distance as a fraction of the detection range.
pub fn severity(range_m: f32, detection_range_m: f32) -> Severity {
    if detection_range_m <= 0.0 {
        return Severity::None;
    }
    match range_m / detection_range_m {
        r if r <= 0.2 => Severity::Critical,
        r if r <= 0.4 => Severity::High,
        r if r <= 0.6 => Severity::Medium,
        r if r <= 0.8 => Severity::Low,
        _ => Severity::None,
    }
}

/// Observations from the most recent frame only; each frame replaces the
/// previous set outright.
#[derive(Debug, Clone)]
pub struct ObstacleModel {
    observations: Vec<Observation>,
    missed: u32,
    grace_cycles: u32,
    stale: bool,
}

impl ObstacleModel {
    /// `grace_cycles` above one is capped: stale returns never outlive a
    /// single missed frame.
    pub fn new(grace_cycles: u32) -> Self {
        Self { observations: Vec::new(), missed: 0, grace_cycles: grace_cycles.min(1), stale: false }
    }

    /// Feeds one loop cycle's worth of input. Returns a sensor-health change
    /// when there is one.
    pub fn update(&mut self, frame: Option<DepthFrame>) -> Option<AvoidanceKind> {
        match frame {
            Some(f) => {
                self.observations = f.observations;
                self.missed = 0;
                if self.stale {
                    self.stale = false;
                    info!("depth frames back");
                    return Some(AvoidanceKind::SensorRecovered);
                }
                None
            }
            None => {
                self.missed = self.missed.saturating_add(1);
                if self.missed > self.grace_cycles && !self.stale {
                    warn!("no depth frame for {} cycles, obstacle model cleared", self.missed);
                    self.observations.clear();
                    self.stale = true;
                    return Some(AvoidanceKind::SensorStale);
                }
                None
            }
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(range_m: f32) -> DepthFrame {
        DepthFrame { ts_unix_ms: 0, observations: vec![Observation { bearing_deg: 0.0, range_m, confidence: 1.0 }] }
    }

    #[test]
    fn frames_replace_rather_than_merge() {
        let mut m = ObstacleModel::new(1);
        m.update(Some(frame(5.0)));
        m.update(Some(frame(8.0)));
        assert_eq!(m.observations().len(), 1);
        assert_eq!(m.observations()[0].range_m, 8.0);
        m.update(Some(DepthFrame { ts_unix_ms: 1, observations: vec![] }));
        assert!(m.observations().is_empty());
    }

    #[test]
    fn dropout_keeps_last_frame_for_one_cycle_then_goes_stale() {
        let mut m = ObstacleModel::new(crate::AvoidConfig::default().grace_cycles);
        m.update(Some(frame(5.0)));
        assert_eq!(m.update(None), None);
        assert_eq!(m.observations().len(), 1);
        assert_eq!(m.update(None), Some(AvoidanceKind::SensorStale));
        assert!(m.is_stale());
        assert!(m.observations().is_empty());
        assert_eq!(m.update(None), None);
        assert_eq!(m.update(Some(frame(9.0))), Some(AvoidanceKind::SensorRecovered));
        assert!(!m.is_stale());
    }

    #[test]
    fn longer_grace_is_capped_at_one_cycle() {
        let mut m = ObstacleModel::new(3);
        m.update(Some(frame(5.0)));
        assert_eq!(m.update(None), None);
        assert_eq!(m.update(None), Some(AvoidanceKind::SensorStale));
    }

    #[test]
    fn zero_grace_clears_on_the_first_miss() {
        let mut m = ObstacleModel::new(0);
        m.update(Some(frame(5.0)));
        assert_eq!(m.update(None), Some(AvoidanceKind::SensorStale));
        assert!(m.observations().is_empty());
    }

    #[test]
    fn severity_bands() {
        assert_eq!(severity(1.0, 10.0), Severity::Critical);
        assert_eq!(severity(3.0, 10.0), Severity::High);
        assert_eq!(severity(5.0, 10.0), Severity::Medium);
        assert_eq!(severity(7.5, 10.0), Severity::Low);
        assert_eq!(severity(9.0, 10.0), Severity::None);
    }

    #[test]
    fn frame_json_defaults_confidence() {
        let f: DepthFrame =
            serde_json::from_str(r#"{"ts_unix_ms":3,"observations":[{"bearing_deg":-20.0,"range_m":4.5}]}"#).unwrap();
        assert_eq!(f.observations[0].confidence, 1.0);
    }
}
