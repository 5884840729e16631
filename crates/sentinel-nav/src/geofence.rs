use serde::Deserialize;

use sentinel_proto::mission::{MissionSegment, Waypoint, MAX_SPEED_MPS, MIN_SPEED_MPS};

use crate::geo::{haversine_m, point_in_polygon, Point};

#[derive(Debug, Clone, Deserialize)]
pub struct GeofenceConfig {
    /// Centre of the radius check.
    pub home: Point,
    pub max_radius_m: f64,
    #[serde(default)]
    pub min_alt_m: f32,
    pub max_alt_m: f32,
    /// Optional operating polygon; empty means radius-only.
    #[serde(default)]
    pub polygon: Vec<Point>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FenceViolation {
    #[error("coordinates out of range ({lat}, {lon})")]
    Coordinates { lat: f64, lon: f64 },
    #[error("altitude {alt}m outside {min}..={max}m")]
    Altitude { alt: f32, min: f32, max: f32 },
    #[error("{dist:.0}m from home exceeds {max:.0}m")]
    Radius { dist: f64, max: f64 },
    #[error("outside operating polygon")]
    Polygon,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SegmentError {
    #[error("segment has no waypoints")]
    Empty,
    #[error("min_clearance_m must be positive, got {0}")]
    Clearance(f32),
    #[error("waypoint {index}: {source}")]
    Fence { index: usize, source: FenceViolation },
    #[error("waypoint {index}: speed {speed} m/s outside 0.5..=20")]
    Speed { index: usize, speed: f32 },
    #[error("waypoint {index}: land/return is only allowed on the last waypoint")]
    TerminalNotLast { index: usize },
    #[error("autopilot unresponsive, segment refused")]
    AutopilotFault,
}

impl SegmentError {
    pub fn reason(&self) -> &'static str {
        match self {
            SegmentError::Empty => "empty_segment",
            SegmentError::Clearance(_) => "invalid_clearance",
            SegmentError::Fence { .. } => "geofence",
            SegmentError::Speed { .. } => "invalid_speed",
            SegmentError::TerminalNotLast { .. } => "terminal_not_last",
            SegmentError::AutopilotFault => "autopilot_unresponsive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Geofence {
    cfg: GeofenceConfig,
}

impl Geofence {
    pub fn new(cfg: GeofenceConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &GeofenceConfig {
        &self.cfg
    }

    pub fn check(&self, wp: &Waypoint) -> Result<(), FenceViolation> {
        if !wp.lat.is_finite() || !wp.lon.is_finite() || wp.lat.abs() > 90.0 || wp.lon.abs() > 180.0 {
            return Err(FenceViolation::Coordinates { lat: wp.lat, lon: wp.lon });
        }
        if !(self.cfg.min_alt_m..=self.cfg.max_alt_m).contains(&wp.alt_m) {
            return Err(FenceViolation::Altitude { alt: wp.alt_m, min: self.cfg.min_alt_m, max: self.cfg.max_alt_m });
        }
        let dist = haversine_m(self.cfg.home.lat, self.cfg.home.lon, wp.lat, wp.lon);
        if dist > self.cfg.max_radius_m {
            return Err(FenceViolation::Radius { dist, max: self.cfg.max_radius_m });
        }
        if !self.cfg.polygon.is_empty() && !point_in_polygon(&self.cfg.polygon, wp.lat, wp.lon) {
            return Err(FenceViolation::Polygon);
        }
        Ok(())
    }

    /// Ingestion check for a whole assignment. Any bad waypoint rejects the
    /// segment; nothing is partially applied.
    pub fn validate_segment(&self, seg: &MissionSegment) -> Result<(), SegmentError> {
        if seg.waypoints.is_empty() {
            return Err(SegmentError::Empty);
        }
        if !(seg.min_clearance_m > 0.0) {
            return Err(SegmentError::Clearance(seg.min_clearance_m));
        }
        let last = seg.waypoints.len() - 1;
        for (index, wp) in seg.waypoints.iter().enumerate() {
            self.check(wp).map_err(|source| SegmentError::Fence { index, source })?;
            if !(MIN_SPEED_MPS..=MAX_SPEED_MPS).contains(&wp.speed_mps) {
                return Err(SegmentError::Speed { index, speed: wp.speed_mps });
            }
            if wp.action.is_terminal() && index != last {
                return Err(SegmentError::TerminalNotLast { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_proto::mission::{OnComplete, WaypointAction};

    fn fence() -> Geofence {
        Geofence::new(GeofenceConfig {
            home: Point { lat: 47.0, lon: 8.0 },
            max_radius_m: 500.0,
            min_alt_m: 5.0,
            max_alt_m: 120.0,
            polygon: vec![],
        })
    }

    fn wp(lat: f64, lon: f64, alt_m: f32) -> Waypoint {
        Waypoint { lat, lon, alt_m, speed_mps: 5.0, action: WaypointAction::Navigate, loiter_s: 0 }
    }

    fn segment(waypoints: Vec<Waypoint>) -> MissionSegment {
        MissionSegment {
            segment_id: "s".into(),
            mission_id: "m".into(),
            waypoints,
            on_complete: OnComplete::Hold,
            min_clearance_m: 5.0,
        }
    }

    #[test]
    fn accepts_waypoints_inside_bounds() {
        assert!(fence().validate_segment(&segment(vec![wp(47.001, 8.0, 30.0)])).is_ok());
    }

    #[test]
    fn rejects_altitude_and_radius_violations() {
        let f = fence();
        assert!(matches!(f.check(&wp(47.001, 8.0, 200.0)), Err(FenceViolation::Altitude { .. })));
        assert!(matches!(f.check(&wp(47.01, 8.0, 30.0)), Err(FenceViolation::Radius { .. })));
        assert!(matches!(f.check(&wp(f64::NAN, 8.0, 30.0)), Err(FenceViolation::Coordinates { .. })));
    }

    #[test]
    fn one_bad_waypoint_rejects_the_segment() {
        let err = fence()
            .validate_segment(&segment(vec![wp(47.001, 8.0, 30.0), wp(47.001, 8.0, 500.0)]))
            .unwrap_err();
        assert!(matches!(err, SegmentError::Fence { index: 1, .. }));
        assert_eq!(err.reason(), "geofence");
    }

    #[test]
    fn terminal_action_must_be_last() {
        let mut land = wp(47.001, 8.0, 30.0);
        land.action = WaypointAction::Land;
        let err = fence().validate_segment(&segment(vec![land.clone(), wp(47.001, 8.0, 30.0)])).unwrap_err();
        assert_eq!(err, SegmentError::TerminalNotLast { index: 0 });
        assert!(fence().validate_segment(&segment(vec![wp(47.001, 8.0, 30.0), land])).is_ok());
    }

    #[test]
    fn polygon_restricts_area() {
        let mut cfg = fence().config().clone();
        cfg.polygon = vec![
            Point { lat: 46.999, lon: 7.999 },
            Point { lat: 46.999, lon: 8.001 },
            Point { lat: 47.001, lon: 8.001 },
            Point { lat: 47.001, lon: 7.999 },
        ];
        let f = Geofence::new(cfg);
        assert!(f.check(&wp(47.0005, 8.0, 30.0)).is_ok());
        assert_eq!(f.check(&wp(47.002, 8.0, 30.0)), Err(FenceViolation::Polygon));
    }
}
