use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use sentinel_proto::mission::{MissionSegment, OnComplete, Position, WaypointAction};
use sentinel_proto::telemetry::RecordBody;
use sentinel_proto::vehicle::{ConnectivityState, ExecutorMode, LinkStatus, MissionProgress, NavCommand, SensedState};

use crate::failsafe::{FailSafe, FailSafeInput, FailSafeTimeouts, Transition};
use crate::geo::distance_m;
use crate::geofence::{Geofence, SegmentError};

/// What to do when the link comes back while already flying home.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnReconnect {
    /// Stay committed to the return; only a new segment or command changes it.
    #[default]
    Continue,
    /// Stop and hold in place awaiting a new segment.
    Cancel,
}

/// Behaviour once depth data has been missing beyond the grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StalePolicy {
    #[default]
    ReduceSpeed,
    Hold,
    Ignore,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionConfig {
    #[serde(default = "default_arrival_radius")]
    pub arrival_radius_m: f64,
    #[serde(default = "default_arrival_alt_tol")]
    pub arrival_alt_tolerance_m: f32,
    #[serde(default = "default_arrival_speed")]
    pub arrival_speed_mps: f32,
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f32,
    #[serde(default = "default_hold_timeout")]
    pub hold_timeout_s: u64,
    #[serde(default = "default_return_timeout")]
    pub return_timeout_s: u64,
    #[serde(default)]
    pub return_reconnect: ReturnReconnect,
    #[serde(default)]
    pub stale_depth_policy: StalePolicy,
    #[serde(default = "default_stale_speed")]
    pub stale_max_speed_mps: f32,
    /// Below this relative altitude the vehicle counts as on the ground: a
    /// return at home is complete, and a disarmed vehicle launches first.
    #[serde(default = "default_landed_alt")]
    pub landed_alt_m: f32,
}

fn default_arrival_radius() -> f64 { 2.0 }
fn default_arrival_alt_tol() -> f32 { 1.5 }
fn default_arrival_speed() -> f32 { 0.5 }
fn default_tick_hz() -> f32 { 10.0 }
fn default_hold_timeout() -> u64 { 60 }
fn default_return_timeout() -> u64 { 120 }
fn default_stale_speed() -> f32 { 2.0 }
fn default_landed_alt() -> f32 { 0.5 }

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            arrival_radius_m: default_arrival_radius(),
            arrival_alt_tolerance_m: default_arrival_alt_tol(),
            arrival_speed_mps: default_arrival_speed(),
            tick_hz: default_tick_hz(),
            hold_timeout_s: default_hold_timeout(),
            return_timeout_s: default_return_timeout(),
            return_reconnect: ReturnReconnect::default(),
            stale_depth_policy: StalePolicy::default(),
            stale_max_speed_mps: default_stale_speed(),
            landed_alt_m: default_landed_alt(),
        }
    }
}

impl MissionConfig {
    pub fn timeouts(&self) -> FailSafeTimeouts {
        FailSafeTimeouts {
            hold: Duration::from_secs(self.hold_timeout_s),
            ret: Duration::from_secs(self.return_timeout_s),
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.tick_hz.max(1.0))
    }
}

pub struct TickInput<'a> {
    pub sensed: &'a SensedState,
    pub link: LinkStatus,
    /// Depth data missing beyond the avoidance grace period.
    pub depth_stale: bool,
}

#[derive(Debug, Default)]
pub struct TickOutput {
    /// Only set when the effective intent changed since the last tick.
    pub command: Option<NavCommand>,
    pub records: Vec<RecordBody>,
}

#[derive(Debug, Clone)]
struct Active {
    seg: MissionSegment,
    index: usize,
    loiter_until: Option<Instant>,
    done: bool,
}

pub struct MissionExecutor {
    cfg: MissionConfig,
    fence: Geofence,
    failsafe: FailSafe,
    active: Option<Active>,
    mode: ExecutorMode,
    home: Position,
    autopilot_fault: bool,
    last_sent: Option<NavCommand>,
    pending: Vec<RecordBody>,
}

impl MissionExecutor {
    pub fn new(cfg: MissionConfig, fence: Geofence) -> Self {
        let h = fence.config().home;
        Self {
            cfg,
            fence,
            failsafe: FailSafe::new(),
            active: None,
            mode: ExecutorMode::Idle,
            home: Position { lat: h.lat, lon: h.lon, alt_m: 0.0 },
            autopilot_fault: false,
            last_sent: None,
            pending: Vec::new(),
        }
    }

    pub fn set_home(&mut self, home: Position) {
        info!("home set to {:.7},{:.7}", home.lat, home.lon);
        self.home = home;
    }

    pub fn home(&self) -> Position {
        self.home
    }

    pub fn autonomy(&self) -> ConnectivityState {
        self.failsafe.state()
    }

    pub fn mode(&self) -> ExecutorMode {
        self.mode
    }

    pub fn active_segment(&self) -> Option<&MissionSegment> {
        self.active.as_ref().map(|a| &a.seg)
    }

    pub fn progress(&self) -> MissionProgress {
        MissionProgress {
            autonomy: self.failsafe.state(),
            mode: self.mode,
            segment_id: self.active.as_ref().map(|a| a.seg.segment_id.clone()),
            waypoint_index: self.active.as_ref().map(|a| a.index).unwrap_or(0),
            total_waypoints: self.active.as_ref().map(|a| a.seg.waypoints.len()).unwrap_or(0),
        }
    }

    /// Validates and installs a new segment, replacing any active one. A
    /// rejected segment leaves the current one untouched and queues a
    /// rejection record.
    pub fn accept_segment(&mut self, seg: MissionSegment) -> Result<(), SegmentError> {
        let checked = if self.autopilot_fault {
            Err(SegmentError::AutopilotFault)
        } else {
            self.fence.validate_segment(&seg)
        };
        if let Err(e) = checked {
            warn!("segment {} rejected: {}", seg.segment_id, e);
            self.pending.push(RecordBody::rejection(e.reason(), format!("segment {}: {}", seg.segment_id, e)));
            return Err(e);
        }
        if let Some(prev) = &self.active {
            info!("segment {} supersedes {}", seg.segment_id, prev.seg.segment_id);
        }
        info!("segment {} accepted ({} waypoints)", seg.segment_id, seg.waypoints.len());
        self.active = Some(Active { seg, index: 0, loiter_until: None, done: false });
        self.mode = ExecutorMode::Executing;
        Ok(())
    }

    /// Remote recall: drop the segment and fly home.
    pub fn recall(&mut self) {
        info!("recall received");
        self.active = None;
        self.mode = ExecutorMode::Returning;
    }

    /// Remote abort: drop the segment and hold in place.
    pub fn abort(&mut self) {
        info!("abort received");
        self.active = None;
        self.mode = ExecutorMode::Aborted;
    }

    /// Latches or clears the autopilot-unresponsive fault. Raising it drops
    /// the active segment; escalation happens on the following ticks.
    pub fn on_autopilot_fault(&mut self, fault: bool) {
        if fault == self.autopilot_fault {
            return;
        }
        self.autopilot_fault = fault;
        if fault {
            warn!("autopilot unresponsive, aborting active segment");
            let detail = match self.active.take() {
                Some(a) => format!("segment {} aborted at waypoint {}", a.seg.segment_id, a.index),
                None => "no active segment".to_string(),
            };
            if self.mode != ExecutorMode::Landing {
                self.mode = ExecutorMode::Aborted;
            }
            self.pending.push(RecordBody::error("autopilot", format!("autopilot unresponsive: {detail}")));
        } else {
            info!("autopilot heartbeat recovered");
            self.pending.push(RecordBody::error("autopilot", "autopilot heartbeat recovered"));
        }
    }

    pub fn tick(&mut self, input: &TickInput<'_>, timeouts: FailSafeTimeouts, now: Instant) -> TickOutput {
        let mut records = std::mem::take(&mut self.pending);

        let fs_in = FailSafeInput {
            link_up: input.link.is_up(),
            return_complete: self.return_complete(input.sensed),
            autopilot_fault: self.autopilot_fault,
        };
        if let Some(t) = self.failsafe.evaluate(fs_in, timeouts, now) {
            self.on_transition(&t);
            records.push(RecordBody::StateTransition {
                from: t.from,
                to: t.to,
                reason: t.reason.to_string(),
                disconnected_s: t.disconnected.as_secs_f32(),
            });
        }

        self.launch(input.sensed);
        if self.segment_running() && input.sensed.has_fix() {
            self.advance(input.sensed, now, &mut records);
        }

        let command = self.intent(input.sensed).map(|c| self.apply_stale_policy(c, input.depth_stale));
        let command = if command != self.last_sent {
            self.last_sent = command;
            if let Some(c) = &command {
                debug!("executor intent -> {}", c.label());
            }
            command
        } else {
            None
        };
        TickOutput { command, records }
    }

    fn on_ground(&self, s: &SensedState) -> bool {
        s.has_fix() && !s.armed && s.position.alt_m <= self.cfg.landed_alt_m
    }

    /// Arm and take off before flying a segment from the ground; hand over
    /// to waypoint tracking once near the first target altitude.
    fn launch(&mut self, s: &SensedState) {
        let Some(alt) = self.active.as_ref().map(|a| a.seg.waypoints[a.index].alt_m) else { return };
        match self.mode {
            ExecutorMode::Executing if self.on_ground(s) => {
                info!("on the ground and disarmed, launching to {:.1}m", alt);
                self.mode = ExecutorMode::Launching;
            }
            ExecutorMode::Launching if s.armed && s.position.alt_m >= alt - self.cfg.arrival_alt_tolerance_m => {
                info!("takeoff complete at {:.1}m", s.position.alt_m);
                self.mode = ExecutorMode::Executing;
            }
            _ => {}
        }
    }

    fn segment_running(&self) -> bool {
        matches!(self.mode, ExecutorMode::Executing | ExecutorMode::Loitering)
            && self.active.as_ref().map(|a| !a.done).unwrap_or(false)
    }

    fn return_complete(&self, s: &SensedState) -> bool {
        s.has_fix()
            && distance_m(&s.position, &self.home) <= self.cfg.arrival_radius_m
            && (s.position.alt_m <= self.cfg.landed_alt_m || !s.armed)
    }

    fn on_transition(&mut self, t: &Transition) {
        // A landing in progress is never overridden by the fail-safe.
        let landing = self.mode == ExecutorMode::Landing;
        match t.to {
            ConnectivityState::Holding if !landing => self.mode = ExecutorMode::Holding,
            ConnectivityState::Returning if !landing => self.mode = ExecutorMode::Returning,
            ConnectivityState::Landed => self.mode = ExecutorMode::Idle,
            ConnectivityState::Connected
                if t.from == ConnectivityState::Returning
                    && self.mode == ExecutorMode::Returning
                    && self.cfg.return_reconnect == ReturnReconnect::Cancel =>
            {
                info!("return cancelled on reconnect, holding for a new segment");
                self.mode = ExecutorMode::Holding;
            }
            // A segment paused by the hold timeout picks up where it stopped.
            ConnectivityState::Connected
                if t.from == ConnectivityState::Holding
                    && self.mode == ExecutorMode::Holding
                    && self.active.as_ref().is_some_and(|a| !a.done) =>
            {
                info!("link restored, resuming interrupted segment");
                self.mode = ExecutorMode::Executing;
            }
            _ => {}
        }
    }

    fn advance(&mut self, s: &SensedState, now: Instant, records: &mut Vec<RecordBody>) {
        let Some(a) = self.active.as_mut() else { return };
        let wp = &a.seg.waypoints[a.index];

        if let Some(until) = a.loiter_until {
            if now < until {
                return;
            }
            a.loiter_until = None;
        } else {
            let target = wp.position();
            let arrived = distance_m(&s.position, &target) <= self.cfg.arrival_radius_m
                && (s.position.alt_m - target.alt_m).abs() <= self.cfg.arrival_alt_tolerance_m
                && s.ground_speed_mps <= self.cfg.arrival_speed_mps;
            if !arrived {
                return;
            }
            info!("segment {}: reached waypoint {}/{}", a.seg.segment_id, a.index + 1, a.seg.waypoints.len());
            records.push(RecordBody::Progress {
                segment_id: a.seg.segment_id.clone(),
                waypoint_index: a.index,
                total_waypoints: a.seg.waypoints.len(),
            });
            if wp.action == WaypointAction::Loiter && wp.loiter_s > 0 {
                a.loiter_until = Some(now + Duration::from_secs(u64::from(wp.loiter_s)));
                self.mode = ExecutorMode::Loitering;
                return;
            }
        }

        let action = wp.action;
        if a.index + 1 < a.seg.waypoints.len() {
            a.index += 1;
            self.mode = ExecutorMode::Executing;
            return;
        }

        a.done = true;
        records.push(RecordBody::SegmentComplete {
            segment_id: a.seg.segment_id.clone(),
            on_complete: a.seg.on_complete,
        });
        self.mode = match (action, a.seg.on_complete) {
            (WaypointAction::Land, _) | (_, OnComplete::Land) => ExecutorMode::Landing,
            (WaypointAction::Return, _) => ExecutorMode::Returning,
            (_, OnComplete::Hold) => ExecutorMode::Holding,
            (_, OnComplete::AwaitNext) => ExecutorMode::AwaitingNext,
        };
        info!("segment {} complete, now {:?}", a.seg.segment_id, self.mode);
    }

    fn intent(&self, s: &SensedState) -> Option<NavCommand> {
        match self.mode {
            ExecutorMode::Idle => None,
            ExecutorMode::Launching if !s.armed => Some(NavCommand::Arm),
            ExecutorMode::Launching => self
                .active
                .as_ref()
                .map(|a| NavCommand::Takeoff { alt_m: a.seg.waypoints[a.index].alt_m }),
            ExecutorMode::Executing | ExecutorMode::Loitering => self.active.as_ref().map(|a| {
                let wp = &a.seg.waypoints[a.index];
                NavCommand::Navigate { target: wp.position(), speed_mps: wp.speed_mps }
            }),
            ExecutorMode::Holding | ExecutorMode::AwaitingNext | ExecutorMode::Aborted => Some(NavCommand::Hold),
            ExecutorMode::Returning => Some(NavCommand::Return),
            ExecutorMode::Landing => Some(NavCommand::Land),
        }
    }

    fn apply_stale_policy(&self, cmd: NavCommand, stale: bool) -> NavCommand {
        match (cmd, stale, self.cfg.stale_depth_policy) {
            (NavCommand::Navigate { target, speed_mps }, true, StalePolicy::ReduceSpeed) => NavCommand::Navigate {
                target,
                speed_mps: speed_mps.min(self.cfg.stale_max_speed_mps),
            },
            (NavCommand::Navigate { .. }, true, StalePolicy::Hold) => NavCommand::Hold,
            (c, _, _) => c,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{from_local, Point};
    use crate::geofence::GeofenceConfig;
    use sentinel_proto::mission::Waypoint;

    const HOME: Position = Position { lat: 47.0, lon: 8.0, alt_m: 0.0 };
    const T: FailSafeTimeouts = FailSafeTimeouts { hold: Duration::from_secs(60), ret: Duration::from_secs(120) };

    fn executor(cfg: MissionConfig) -> MissionExecutor {
        MissionExecutor::new(
            cfg,
            Geofence::new(GeofenceConfig {
                home: Point { lat: HOME.lat, lon: HOME.lon },
                max_radius_m: 1000.0,
                min_alt_m: 2.0,
                max_alt_m: 120.0,
                polygon: vec![],
            }),
        )
    }

    fn wp(north: f64, action: WaypointAction, loiter_s: u32) -> Waypoint {
        let p = from_local(&HOME, 0.0, north, 20.0);
        Waypoint { lat: p.lat, lon: p.lon, alt_m: 20.0, speed_mps: 5.0, action, loiter_s }
    }

    fn segment(id: &str, waypoints: Vec<Waypoint>, on_complete: OnComplete) -> MissionSegment {
        MissionSegment {
            segment_id: id.into(),
            mission_id: "m1".into(),
            waypoints,
            on_complete,
            min_clearance_m: 5.0,
        }
    }

    fn at(p: Position, now: Instant) -> SensedState {
        SensedState { position: p, armed: true, updated_at: Some(now), ..Default::default() }
    }

    fn tick(ex: &mut MissionExecutor, s: &SensedState, link: LinkStatus, now: Instant) -> TickOutput {
        ex.tick(&TickInput { sensed: s, link, depth_stale: false }, T, now)
    }

    #[test]
    fn visits_waypoints_in_order_and_applies_on_complete() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        let wps = vec![wp(50.0, WaypointAction::Navigate, 0), wp(100.0, WaypointAction::Navigate, 0)];
        ex.accept_segment(segment("s1", wps.clone(), OnComplete::Land)).unwrap();

        let out = tick(&mut ex, &at(HOME, t0), LinkStatus::Up, t0);
        assert_eq!(out.command, Some(NavCommand::Navigate { target: wps[0].position(), speed_mps: 5.0 }));

        let out = tick(&mut ex, &at(wps[0].position(), t0), LinkStatus::Up, t0);
        assert!(matches!(out.records[0], RecordBody::Progress { waypoint_index: 0, .. }));
        assert_eq!(out.command, Some(NavCommand::Navigate { target: wps[1].position(), speed_mps: 5.0 }));

        // Still en route: no new intent.
        assert!(tick(&mut ex, &at(wps[0].position(), t0), LinkStatus::Up, t0).command.is_none());

        let out = tick(&mut ex, &at(wps[1].position(), t0), LinkStatus::Up, t0);
        assert!(out.records.iter().any(|r| matches!(r, RecordBody::SegmentComplete { .. })));
        assert_eq!(out.command, Some(NavCommand::Land));
        assert_eq!(ex.mode(), ExecutorMode::Landing);
    }

    #[test]
    fn segment_from_the_ground_arms_then_takes_off_then_navigates() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        let w = wp(50.0, WaypointAction::Navigate, 0);
        ex.accept_segment(segment("s1", vec![w.clone()], OnComplete::Hold)).unwrap();

        let mut s = SensedState { position: HOME, armed: false, updated_at: Some(t0), ..Default::default() };
        let out = tick(&mut ex, &s, LinkStatus::Up, t0);
        assert_eq!(out.command, Some(NavCommand::Arm));
        assert_eq!(ex.mode(), ExecutorMode::Launching);
        // Still disarmed: nothing new to say.
        assert!(tick(&mut ex, &s, LinkStatus::Up, t0).command.is_none());

        s.armed = true;
        assert_eq!(tick(&mut ex, &s, LinkStatus::Up, t0).command, Some(NavCommand::Takeoff { alt_m: 20.0 }));
        s.position.alt_m = 10.0;
        assert!(tick(&mut ex, &s, LinkStatus::Up, t0).command.is_none());
        assert_eq!(ex.mode(), ExecutorMode::Launching);

        s.position.alt_m = 19.0;
        let out = tick(&mut ex, &s, LinkStatus::Up, t0);
        assert_eq!(ex.mode(), ExecutorMode::Executing);
        assert_eq!(out.command, Some(NavCommand::Navigate { target: w.position(), speed_mps: 5.0 }));
    }

    #[test]
    fn airborne_vehicle_skips_the_launch() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        ex.accept_segment(segment("s1", vec![wp(50.0, WaypointAction::Navigate, 0)], OnComplete::Hold)).unwrap();
        // A disarmed flag while airborne is not a launch.
        let s = SensedState {
            position: from_local(&HOME, 0.0, 10.0, 20.0),
            armed: false,
            updated_at: Some(t0),
            ..Default::default()
        };
        assert!(matches!(tick(&mut ex, &s, LinkStatus::Up, t0).command, Some(NavCommand::Navigate { .. })));
        assert_eq!(ex.mode(), ExecutorMode::Executing);
    }

    #[test]
    fn arrival_requires_low_ground_speed() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        let w = wp(50.0, WaypointAction::Navigate, 0);
        ex.accept_segment(segment("s1", vec![w.clone()], OnComplete::Hold)).unwrap();
        let mut s = at(w.position(), t0);
        s.ground_speed_mps = 4.0;
        assert!(tick(&mut ex, &s, LinkStatus::Up, t0).records.is_empty());
        s.ground_speed_mps = 0.1;
        let out = tick(&mut ex, &s, LinkStatus::Up, t0);
        assert_eq!(out.command, Some(NavCommand::Hold));
    }

    #[test]
    fn loiter_waypoint_waits_before_advancing() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        let wps = vec![wp(50.0, WaypointAction::Loiter, 10), wp(100.0, WaypointAction::Navigate, 0)];
        ex.accept_segment(segment("s1", wps.clone(), OnComplete::AwaitNext)).unwrap();
        let s = at(wps[0].position(), t0);
        tick(&mut ex, &s, LinkStatus::Up, t0);
        assert_eq!(ex.mode(), ExecutorMode::Loitering);
        tick(&mut ex, &s, LinkStatus::Up, t0 + Duration::from_secs(5));
        assert_eq!(ex.progress().waypoint_index, 0);
        let out = tick(&mut ex, &s, LinkStatus::Up, t0 + Duration::from_secs(10));
        assert_eq!(ex.progress().waypoint_index, 1);
        assert_eq!(out.command, Some(NavCommand::Navigate { target: wps[1].position(), speed_mps: 5.0 }));
    }

    #[test]
    fn rejected_segment_keeps_the_active_one() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        ex.accept_segment(segment("good", vec![wp(50.0, WaypointAction::Navigate, 0)], OnComplete::Hold))
            .unwrap();
        let mut bad = wp(50.0, WaypointAction::Navigate, 0);
        bad.alt_m = 500.0;
        let err = ex.accept_segment(segment("bad", vec![bad], OnComplete::Hold)).unwrap_err();
        assert_eq!(err.reason(), "geofence");
        assert_eq!(ex.active_segment().unwrap().segment_id, "good");
        let out = tick(&mut ex, &at(HOME, t0), LinkStatus::Up, t0);
        assert!(matches!(&out.records[0], RecordBody::Rejection { reason, .. } if reason == "geofence"));
    }

    #[test]
    fn new_segment_replaces_old_wholesale() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        ex.accept_segment(segment("a", vec![wp(50.0, WaypointAction::Navigate, 0)], OnComplete::Hold)).unwrap();
        tick(&mut ex, &at(HOME, t0), LinkStatus::Up, t0);
        let b = wp(80.0, WaypointAction::Navigate, 0);
        ex.accept_segment(segment("b", vec![b.clone()], OnComplete::Hold)).unwrap();
        let out = tick(&mut ex, &at(HOME, t0), LinkStatus::Up, t0);
        assert_eq!(out.command, Some(NavCommand::Navigate { target: b.position(), speed_mps: 5.0 }));
        assert_eq!(ex.progress().segment_id.as_deref(), Some("b"));
    }

    #[test]
    fn recall_and_abort_clear_the_segment() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        ex.accept_segment(segment("a", vec![wp(50.0, WaypointAction::Navigate, 0)], OnComplete::Hold)).unwrap();
        ex.recall();
        assert_eq!(tick(&mut ex, &at(HOME, t0), LinkStatus::Up, t0).command, Some(NavCommand::Return));
        assert!(ex.active_segment().is_none());
        ex.abort();
        assert_eq!(tick(&mut ex, &at(HOME, t0), LinkStatus::Up, t0).command, Some(NavCommand::Hold));
    }

    #[test]
    fn stale_depth_caps_speed_or_holds() {
        let t0 = Instant::now();
        let w = wp(50.0, WaypointAction::Navigate, 0);
        let s = at(HOME, t0);

        let mut ex = executor(MissionConfig::default());
        ex.accept_segment(segment("a", vec![w.clone()], OnComplete::Hold)).unwrap();
        let out = ex.tick(&TickInput { sensed: &s, link: LinkStatus::Up, depth_stale: true }, T, t0);
        assert_eq!(out.command, Some(NavCommand::Navigate { target: w.position(), speed_mps: 2.0 }));
        let out = ex.tick(&TickInput { sensed: &s, link: LinkStatus::Up, depth_stale: false }, T, t0);
        assert_eq!(out.command, Some(NavCommand::Navigate { target: w.position(), speed_mps: 5.0 }));

        let mut ex = executor(MissionConfig { stale_depth_policy: StalePolicy::Hold, ..Default::default() });
        ex.accept_segment(segment("a", vec![w], OnComplete::Hold)).unwrap();
        let out = ex.tick(&TickInput { sensed: &s, link: LinkStatus::Up, depth_stale: true }, T, t0);
        assert_eq!(out.command, Some(NavCommand::Hold));
    }

    #[test]
    fn autopilot_fault_aborts_and_escalates_each_tick() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        ex.accept_segment(segment("a", vec![wp(50.0, WaypointAction::Navigate, 0)], OnComplete::Hold)).unwrap();
        ex.on_autopilot_fault(true);
        assert!(ex.active_segment().is_none());
        let s = at(HOME, t0);
        let mut states = Vec::new();
        for i in 0..3 {
            let out = tick(&mut ex, &s, LinkStatus::Up, t0 + Duration::from_secs(i));
            states.extend(out.records.iter().filter_map(|r| match r {
                RecordBody::StateTransition { to, .. } => Some(*to),
                _ => None,
            }));
        }
        assert_eq!(
            states,
            vec![ConnectivityState::Degraded, ConnectivityState::Holding, ConnectivityState::Returning]
        );
        assert_eq!(ex.mode(), ExecutorMode::Returning);
        let err = ex
            .accept_segment(segment("b", vec![wp(50.0, WaypointAction::Navigate, 0)], OnComplete::Hold))
            .unwrap_err();
        assert_eq!(err, SegmentError::AutopilotFault);
    }

    #[test]
    fn hold_timeout_pauses_an_unfinished_segment_and_reconnect_resumes_it() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        let far = wp(400.0, WaypointAction::Navigate, 0);
        ex.accept_segment(segment("a", vec![far.clone()], OnComplete::Hold)).unwrap();
        let s = at(from_local(&HOME, 0.0, 50.0, 20.0), t0);
        let first = tick(&mut ex, &s, LinkStatus::Up, t0);
        assert!(matches!(first.command, Some(NavCommand::Navigate { .. })));

        tick(&mut ex, &s, LinkStatus::Down, t0 + Duration::from_secs(1));
        assert_eq!(ex.autonomy(), ConnectivityState::Degraded);
        let held = tick(&mut ex, &s, LinkStatus::Down, t0 + Duration::from_secs(61));
        assert_eq!(ex.autonomy(), ConnectivityState::Holding);
        assert_eq!(held.command, Some(NavCommand::Hold));
        assert_eq!(ex.active_segment().map(|a| a.segment_id.as_str()), Some("a"));

        let resumed = tick(&mut ex, &s, LinkStatus::Up, t0 + Duration::from_secs(70));
        assert_eq!(ex.autonomy(), ConnectivityState::Connected);
        assert_eq!(ex.mode(), ExecutorMode::Executing);
        assert!(matches!(resumed.command, Some(NavCommand::Navigate { target, .. }) if target == far.position()));
    }

    #[test]
    fn reconnect_during_return_follows_policy() {
        let t0 = Instant::now();
        for (policy, expect) in [
            (ReturnReconnect::Continue, ExecutorMode::Returning),
            (ReturnReconnect::Cancel, ExecutorMode::Holding),
        ] {
            let mut ex = executor(MissionConfig { return_reconnect: policy, ..Default::default() });
            let s = at(from_local(&HOME, 0.0, 50.0, 20.0), t0);
            for sec in [0, 60, 120] {
                tick(&mut ex, &s, LinkStatus::Down, t0 + Duration::from_secs(sec));
            }
            assert_eq!(ex.autonomy(), ConnectivityState::Returning);
            tick(&mut ex, &s, LinkStatus::Up, t0 + Duration::from_secs(130));
            assert_eq!(ex.autonomy(), ConnectivityState::Connected);
            assert_eq!(ex.mode(), expect);
        }
    }

    #[test]
    fn landing_is_not_overridden_by_failsafe() {
        let t0 = Instant::now();
        let mut ex = executor(MissionConfig::default());
        let w = wp(50.0, WaypointAction::Navigate, 0);
        ex.accept_segment(segment("a", vec![w.clone()], OnComplete::Land)).unwrap();
        let s = at(w.position(), t0);
        tick(&mut ex, &s, LinkStatus::Up, t0);
        assert_eq!(ex.mode(), ExecutorMode::Landing);
        for sec in [1, 61, 121] {
            tick(&mut ex, &s, LinkStatus::Down, t0 + Duration::from_secs(sec));
        }
        assert_eq!(ex.autonomy(), ConnectivityState::Returning);
        assert_eq!(ex.mode(), ExecutorMode::Landing);
    }
}
