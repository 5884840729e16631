use tracing::{info, warn};

use sentinel_proto::mission::Position;
use sentinel_proto::telemetry::{AvoidanceEvent, AvoidanceKind};
use sentinel_proto::vehicle::{NavCommand, SensedState};

use crate::model::{severity, DepthFrame, ObstacleModel};
use crate::planner::Planner;
use crate::AvoidConfig;

pub struct CycleInput<'a> {
    pub frame: Option<DepthFrame>,
    pub sensed: &'a SensedState,
    /// Latest mission intent, the path being protected.
    pub mission: Option<NavCommand>,
    pub home: Option<Position>,
    pub clearance_m: f32,
}

#[derive(Debug, Default)]
pub struct CycleOutput {
    /// `Some(Some(cmd))` engage or replan, `Some(None)` release, `None` no change.
    pub publish: Option<Option<NavCommand>>,
    pub events: Vec<AvoidanceEvent>,
    pub stale: bool,
}

pub struct Avoider {
    cfg: AvoidConfig,
    planner: Planner,
    model: ObstacleModel,
    engaged: Option<NavCommand>,
    clear_cycles: u32,
}

impl Avoider {
    pub fn new(cfg: AvoidConfig) -> Self {
        Self {
            planner: Planner::new(&cfg),
            model: ObstacleModel::new(cfg.grace_cycles),
            engaged: None,
            clear_cycles: 0,
            cfg,
        }
    }

    pub fn engaged(&self) -> Option<NavCommand> {
        self.engaged
    }

    pub fn cycle(&mut self, input: CycleInput<'_>) -> CycleOutput {
        let mut out = CycleOutput::default();
        if let Some(kind) = self.model.update(input.frame) {
            out.events.push(AvoidanceEvent { kind, obstacles: 0, nearest_m: None, target: None });
        }
        out.stale = self.model.is_stale();

        let s = input.sensed;
        let path = match input.mission {
            Some(NavCommand::Navigate { target, speed_mps }) => Some((target, speed_mps)),
            Some(NavCommand::Return) => input.home.map(|h| (h, self.cfg.avoid_speed_mps)),
            _ => None,
        };
        let Some((target, speed)) = path.filter(|_| s.has_fix()) else {
            if self.engaged.is_some() {
                self.release(&mut out, "no path to protect");
            }
            return out;
        };

        let obs = self.model.observations();
        let a = self.planner.assess(&s.position, s.heading_deg, &target, input.clearance_m, obs);
        if a.threats > 0 {
            self.clear_cycles = 0;
            let keep = match self.engaged {
                Some(NavCommand::Navigate { target: t, .. }) => {
                    self.planner.target_clear(&s.position, s.heading_deg, &t, input.clearance_m, obs)
                }
                _ => false,
            };
            if keep {
                return out;
            }
            let cmd = self.planner.plan(&s.position, s.heading_deg, &target, speed, input.clearance_m, obs);
            if Some(cmd) == self.engaged {
                return out;
            }
            if self.engaged.is_none() {
                let nearest = a.nearest_m.unwrap_or(0.0);
                warn!(
                    "avoidance engaged: {} obstacle(s) on path, nearest {:.1}m ({:?}), override {}",
                    a.threats,
                    nearest,
                    severity(nearest, self.cfg.detection_range_m),
                    cmd.label()
                );
                out.events.push(AvoidanceEvent {
                    kind: AvoidanceKind::Engaged,
                    obstacles: a.threats,
                    nearest_m: a.nearest_m,
                    target: cmd.path_target(None),
                });
            } else {
                info!("avoidance replanned: override {}", cmd.label());
            }
            self.engaged = Some(cmd);
            out.publish = Some(Some(cmd));
        } else if self.engaged.is_some() {
            self.clear_cycles += 1;
            if self.clear_cycles >= self.cfg.resume_clear_cycles {
                self.release(&mut out, "path clear");
            }
        }
        out
    }

    fn release(&mut self, out: &mut CycleOutput, why: &str) {
        info!("avoidance released ({})", why);
        self.engaged = None;
        self.clear_cycles = 0;
        out.publish = Some(None);
        out.events.push(AvoidanceEvent { kind: AvoidanceKind::Released, obstacles: 0, nearest_m: None, target: None });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Observation;
    use sentinel_nav::geo::{distance_m, from_local};
    use std::time::Instant;

    const HERE: Position = Position { lat: 47.0, lon: 8.0, alt_m: 20.0 };

    fn sensed() -> SensedState {
        SensedState { position: HERE, updated_at: Some(Instant::now()), ..Default::default() }
    }

    fn frame(obs: Vec<Observation>) -> Option<DepthFrame> {
        Some(DepthFrame { ts_unix_ms: 0, observations: obs })
    }

    fn mission() -> Option<NavCommand> {
        Some(NavCommand::Navigate { target: from_local(&HERE, 0.0, 100.0, 20.0), speed_mps: 5.0 })
    }

    fn input(frame: Option<DepthFrame>, s: &SensedState) -> CycleInput<'_> {
        CycleInput { frame, sensed: s, mission: mission(), home: None, clearance_m: 10.0 }
    }

    #[test]
    fn no_obstacle_is_a_no_op() {
        let mut av = Avoider::new(AvoidConfig::default());
        let s = sensed();
        for _ in 0..20 {
            let out = av.cycle(input(frame(vec![]), &s));
            assert!(out.publish.is_none());
            assert!(out.events.is_empty());
        }
    }

    #[test]
    fn obstacle_ahead_overrides_in_the_same_cycle_and_resumes_after_clear_cycles() {
        let cfg = AvoidConfig { resume_clear_cycles: 4, ..Default::default() };
        let mut av = Avoider::new(cfg);
        let s = sensed();
        let obstacle = Observation { bearing_deg: 0.0, range_m: 5.0, confidence: 1.0 };

        let out = av.cycle(input(frame(vec![obstacle]), &s));
        let Some(Some(NavCommand::Navigate { target, .. })) = out.publish else {
            panic!("expected a lateral override, got {:?}", out.publish)
        };
        assert!(distance_m(&target, &from_local(&HERE, 0.0, 5.0, 20.0)) >= 10.0);
        assert_eq!(out.events[0].kind, AvoidanceKind::Engaged);
        assert_eq!(out.events[0].nearest_m, Some(5.0));

        // Same obstacle next cycle: override held, nothing republished.
        assert!(av.cycle(input(frame(vec![obstacle]), &s)).publish.is_none());

        for _ in 0..3 {
            assert!(av.cycle(input(frame(vec![]), &s)).publish.is_none());
        }
        let out = av.cycle(input(frame(vec![]), &s));
        assert_eq!(out.publish, Some(None));
        assert_eq!(out.events[0].kind, AvoidanceKind::Released);
        assert!(av.engaged().is_none());
    }

    #[test]
    fn override_is_replanned_when_its_own_leg_becomes_blocked() {
        let mut av = Avoider::new(AvoidConfig::default());
        let s = sensed();
        let ahead = Observation { bearing_deg: 0.0, range_m: 5.0, confidence: 1.0 };
        let out = av.cycle(input(frame(vec![ahead]), &s));
        let Some(Some(NavCommand::Navigate { target: first, .. })) = out.publish else {
            panic!("expected an override")
        };
        assert!(sentinel_nav::geo::to_local(&HERE, &first).0 > 0.0);

        // Something shows up right on the way to the sidestep.
        let right = Observation { bearing_deg: 90.0, range_m: 5.5, confidence: 1.0 };
        let out = av.cycle(input(frame(vec![ahead, right]), &s));
        let Some(Some(NavCommand::Navigate { target, .. })) = out.publish else {
            panic!("expected a replan, got {:?}", out.publish)
        };
        assert!(sentinel_nav::geo::to_local(&HERE, &target).0 < 0.0);
    }

    #[test]
    fn obstacle_reappearing_resets_the_clear_count() {
        let cfg = AvoidConfig { resume_clear_cycles: 3, ..Default::default() };
        let mut av = Avoider::new(cfg);
        let s = sensed();
        let obstacle = Observation { bearing_deg: 0.0, range_m: 5.0, confidence: 1.0 };
        av.cycle(input(frame(vec![obstacle]), &s));
        av.cycle(input(frame(vec![]), &s));
        av.cycle(input(frame(vec![]), &s));
        av.cycle(input(frame(vec![obstacle]), &s));
        av.cycle(input(frame(vec![]), &s));
        av.cycle(input(frame(vec![]), &s));
        assert!(av.engaged().is_some());
        assert_eq!(av.cycle(input(frame(vec![]), &s)).publish, Some(None));
    }

    #[test]
    fn sensor_dropout_reports_stale_once() {
        let mut av = Avoider::new(AvoidConfig::default());
        let s = sensed();
        av.cycle(input(frame(vec![]), &s));
        assert!(!av.cycle(input(None, &s)).stale);
        let out = av.cycle(input(None, &s));
        assert!(out.stale);
        assert_eq!(out.events[0].kind, AvoidanceKind::SensorStale);
        assert!(av.cycle(input(None, &s)).events.is_empty());
        let out = av.cycle(input(frame(vec![]), &s));
        assert!(!out.stale);
        assert_eq!(out.events[0].kind, AvoidanceKind::SensorRecovered);
    }

    #[test]
    fn hold_mission_releases_an_active_override() {
        let mut av = Avoider::new(AvoidConfig::default());
        let s = sensed();
        let obstacle = Observation { bearing_deg: 0.0, range_m: 5.0, confidence: 1.0 };
        av.cycle(input(frame(vec![obstacle]), &s));
        assert!(av.engaged().is_some());
        let out = av.cycle(CycleInput {
            frame: frame(vec![obstacle]),
            sensed: &s,
            mission: Some(NavCommand::Hold),
            home: None,
            clearance_m: 10.0,
        });
        assert_eq!(out.publish, Some(None));
    }
}
