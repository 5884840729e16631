//! Path threat test and detour placement in a local east/north frame
//! centred on the vehicle.

use sentinel_nav::geo::{from_local, to_local};
use tracing::debug;
use sentinel_proto::mission::Position;
use sentinel_proto::vehicle::NavCommand;

use crate::model::Observation;
use crate::AvoidConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Local {
    east: f64,
    north: f64,
}

impl Local {
    fn dot(self, o: Local) -> f64 {
        self.east * o.east + self.north * o.north
    }

    fn dist(self, o: Local) -> f64 {
        (self.east - o.east).hypot(self.north - o.north)
    }

    /// Distance to the closest point of the segment `a`..`b`.
    fn seg_dist(self, a: Local, b: Local) -> f64 {
        let ab = Local { east: b.east - a.east, north: b.north - a.north };
        let len2 = ab.dot(ab);
        if len2 < 1e-12 {
            return self.dist(a);
        }
        let ap = Local { east: self.east - a.east, north: self.north - a.north };
        let t = (ap.dot(ab) / len2).clamp(0.0, 1.0);
        self.dist(Local { east: a.east + ab.east * t, north: a.north + ab.north * t })
    }
}

const ORIGIN: Local = Local { east: 0.0, north: 0.0 };

/// Whether flying straight from the vehicle to `to` keeps `c` from
/// `obstacle`, endpoint included. An obstacle already inside `c` only has
/// to not come any closer along the way.
fn leg_clear(obstacle: Local, to: Local, c: f64) -> bool {
    let limit = c.min(obstacle.dist(ORIGIN));
    obstacle.dist(to) >= c && obstacle.seg_dist(ORIGIN, to) >= limit - 1e-9
}

/// An observation projected onto the commanded path.
#[derive(Debug, Clone, Copy)]
struct Projected {
    at: Local,
    along: f64,
    cross: f64,
    weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// Observations inside the clearance corridor ahead.
    pub threats: usize,
    pub nearest_m: Option<f32>,
}

pub struct Planner {
    detection_range_m: f32,
    min_confidence: f32,
    buffer_m: f64,
    avoid_speed_mps: f32,
}

impl Planner {
    pub fn new(cfg: &AvoidConfig) -> Self {
        Self {
            detection_range_m: cfg.detection_range_m,
            min_confidence: cfg.min_confidence,
            buffer_m: f64::from(cfg.clearance_buffer_m),
            avoid_speed_mps: cfg.avoid_speed_mps,
        }
    }

    /// Usable observations as local points with their repulsion weight.
    fn relevant(&self, heading_deg: f32, obs: &[Observation]) -> Vec<(Local, f64)> {
        obs.iter()
            .filter(|o| o.confidence >= self.min_confidence && o.range_m > 0.0 && o.range_m <= self.detection_range_m)
            .map(|o| {
                let b = f64::from(heading_deg + o.bearing_deg).to_radians();
                let r = f64::from(o.range_m);
                (Local { east: r * b.sin(), north: r * b.cos() }, f64::from(o.confidence) / r)
            })
            .collect()
    }

    fn project(&self, heading_deg: f32, obs: &[Observation], dir: Local) -> Vec<Projected> {
        // Right-hand normal of the path direction.
        let right = Local { east: dir.north, north: -dir.east };
        self.relevant(heading_deg, obs)
            .into_iter()
            .map(|(at, weight)| Projected { at, along: at.dot(dir), cross: at.dot(right), weight })
            .collect()
    }

    /// Counts observations lying ahead on the segment from `vehicle` to
    /// `target` within `clearance` of it.
    pub fn assess(&self, vehicle: &Position, heading_deg: f32, target: &Position, clearance: f32, obs: &[Observation]) -> Assessment {
        let (e, n) = to_local(vehicle, target);
        let len = e.hypot(n);
        let nearest_m = obs
            .iter()
            .filter(|o| o.confidence >= self.min_confidence && o.range_m <= self.detection_range_m)
            .map(|o| o.range_m)
            .reduce(f32::min);
        if len < 1e-3 {
            return Assessment { threats: 0, nearest_m };
        }
        let dir = Local { east: e / len, north: n / len };
        let c = f64::from(clearance);
        let threats = self
            .project(heading_deg, obs, dir)
            .iter()
            .filter(|p| p.along >= 0.0 && p.along <= len + c && p.cross.abs() < c)
            .count();
        Assessment { threats, nearest_m }
    }

    /// Substitute command for a threatened path. Sidesteps towards the side
    /// with less summed repulsion, far enough that every threat keeps
    /// clearance plus buffer from the new target, and keeps as much forward
    /// progress as the nearest threat allows. The straight leg to the detour
    /// must keep clearance from every observation too; if it does not, the
    /// other side is tried, then Hold.
    pub fn plan(
        &self,
        vehicle: &Position,
        heading_deg: f32,
        target: &Position,
        speed_mps: f32,
        clearance: f32,
        obs: &[Observation],
    ) -> NavCommand {
        let (e, n) = to_local(vehicle, target);
        let len = e.hypot(n);
        if len < 1e-3 {
            return NavCommand::Hold;
        }
        let dir = Local { east: e / len, north: n / len };
        let right = Local { east: dir.north, north: -dir.east };
        let c = f64::from(clearance);
        let all = self.project(heading_deg, obs, dir);
        let threats: Vec<&Projected> =
            all.iter().filter(|p| p.along >= 0.0 && p.along <= len + c && p.cross.abs() < c).collect();
        if threats.is_empty() {
            return NavCommand::Navigate { target: *target, speed_mps };
        }

        // Repulsion pushes away from each obstacle; its cross component picks the side.
        let push: f64 = all.iter().map(|p| -p.weight * p.cross / p.at.dist(ORIGIN)).sum();
        let preferred = if push >= 0.0 { 1.0 } else { -1.0 };

        let min_along = threats.iter().map(|p| p.along).fold(f64::INFINITY, f64::min);
        let forward = (min_along - c).clamp(0.0, len);

        for side in [preferred, -preferred] {
            let offset = threats.iter().map(|p| side * p.cross + c + self.buffer_m).fold(0.0, f64::max);
            let detour = Local {
                east: dir.east * forward + right.east * side * offset,
                north: dir.north * forward + right.north * side * offset,
            };
            if all.iter().all(|p| leg_clear(p.at, detour, c)) {
                return NavCommand::Navigate {
                    target: from_local(vehicle, detour.east, detour.north, vehicle.alt_m),
                    speed_mps: speed_mps.min(self.avoid_speed_mps),
                };
            }
            debug!("detour at {:.1}E {:.1}N breaks clearance", detour.east, detour.north);
        }
        NavCommand::Hold
    }

    /// Whether the leg from `vehicle` to `target` keeps `clearance` from
    /// every observation.
    pub fn target_clear(&self, vehicle: &Position, heading_deg: f32, target: &Position, clearance: f32, obs: &[Observation]) -> bool {
        let (e, n) = to_local(vehicle, target);
        let t = Local { east: e, north: n };
        let c = f64::from(clearance);
        self.relevant(heading_deg, obs).iter().all(|(p, _)| leg_clear(*p, t, c))
    }
}
