use anyhow::{Context, Result};
use mavlink::common::MavMessage;
use mavlink::MavHeader;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use sentinel_proto::vehicle::{NavCommand, SensedState};

use crate::arbiter::CommandArbiter;
use crate::error::InterfaceError;
use crate::mav;
use crate::transport::{AutopilotTransport, Frame};
use crate::watchdog::{FcEvent, HeartbeatWatchdog};
use crate::FcConfig;

const COMMAND_TICK: Duration = Duration::from_millis(20);
const WARN_EVERY: Duration = Duration::from_secs(5);

pub struct FlightInterface {
    transport: Arc<dyn AutopilotTransport>,
    seq: AtomicU8,
    sys_id: u8,
    comp_id: u8,
    target_sys: u8,
    target_comp: u8,
    require_heartbeat: bool,
    seen_heartbeat: AtomicBool,
}

impl FlightInterface {
    pub fn new(cfg: &FcConfig, transport: Arc<dyn AutopilotTransport>) -> Self {
        Self {
            transport,
            seq: AtomicU8::new(0),
            sys_id: cfg.sys_id,
            comp_id: cfg.comp_id,
            target_sys: cfg.target_sys,
            target_comp: cfg.target_comp,
            require_heartbeat: cfg.require_heartbeat,
            seen_heartbeat: AtomicBool::new(false),
        }
    }

    pub fn heartbeat_seen(&self) -> bool {
        self.seen_heartbeat.load(Ordering::Relaxed)
    }

    fn mark_heartbeat(&self) {
        if !self.seen_heartbeat.swap(true, Ordering::Relaxed) {
            info!("FC: first autopilot heartbeat");
        }
    }

    pub fn send_navigation_command(&self, cmd: &NavCommand) -> Result<(), InterfaceError> {
        if self.require_heartbeat && !self.heartbeat_seen() {
            return Err(InterfaceError::NoHeartbeat);
        }
        debug!("FC: sending {}", cmd.label());
        self.send(&mav::command_message(cmd, self.target_sys, self.target_comp))
    }

    pub fn send_heartbeat(&self) -> Result<(), InterfaceError> {
        self.send(&mav::companion_heartbeat())
    }

    pub fn request_streams(&self, rate_hz: u16) -> Result<(), InterfaceError> {
        for msg in mav::stream_requests(rate_hz, self.target_sys, self.target_comp) {
            self.send(&msg)?;
        }
        info!("FC: requested position/status streams at {} Hz", rate_hz);
        Ok(())
    }

    fn send(&self, msg: &MavMessage) -> Result<(), InterfaceError> {
        let sequence = self.seq.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let hdr = MavHeader { system_id: self.sys_id, component_id: self.comp_id, sequence };
        self.transport.send(&hdr, msg)
    }
}

#[derive(Debug, Default)]
pub struct FcCounters {
    pub frames: AtomicU64,
    pub corrupt: AtomicU64,
    pub heartbeats: AtomicU64,
}

pub struct FcChannels {
    pub sensed: watch::Receiver<SensedState>,
    pub events: mpsc::UnboundedReceiver<FcEvent>,
}

pub struct FcRunner {
    pub fc: Arc<FlightInterface>,
    pub counters: Arc<FcCounters>,
    stop: Arc<AtomicBool>,
}

impl FcRunner {
    /// Asks both threads to exit. The reader only notices once its current
    /// receive returns.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for FcRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Starts the reader and command threads. `mission` and `avoidance` carry the
/// latest intent from each source; the arbiter decides what goes out.
pub fn spawn(
    cfg: &FcConfig,
    transport: Arc<dyn AutopilotTransport>,
    mission: watch::Receiver<Option<NavCommand>>,
    avoidance: watch::Receiver<Option<NavCommand>>,
) -> Result<(FcRunner, FcChannels)> {
    let fc = Arc::new(FlightInterface::new(cfg, transport.clone()));
    let counters = Arc::new(FcCounters::default());
    let stop = Arc::new(AtomicBool::new(false));
    let watchdog = Arc::new(Mutex::new(HeartbeatWatchdog::new(
        cfg.autopilot_heartbeat_period(),
        cfg.missed_heartbeats,
        Instant::now(),
    )));
    let (sensed_tx, sensed_rx) = watch::channel(SensedState::default());
    let (ev_tx, ev_rx) = mpsc::unbounded_channel();

    // Reader: mavlink recv blocks, so it gets its own thread.
    {
        let fc = fc.clone();
        let counters = counters.clone();
        let stop = stop.clone();
        let watchdog = watchdog.clone();
        let ev_tx = ev_tx.clone();
        let target_sys = cfg.target_sys;
        std::thread::Builder::new()
            .name("fc-reader".into())
            .spawn(move || {
                let mut state = SensedState::default();
                let mut last_warn: Option<Instant> = None;
                while !stop.load(Ordering::Relaxed) {
                    match transport.recv() {
                        Ok(Frame::Message(hdr, msg)) => {
                            counters.frames.fetch_add(1, Ordering::Relaxed);
                            let now = Instant::now();
                            if let MavMessage::HEARTBEAT(hb) = &msg {
                                if mav::is_autopilot_heartbeat(hdr.system_id, target_sys, hb) {
                                    counters.heartbeats.fetch_add(1, Ordering::Relaxed);
                                    fc.mark_heartbeat();
                                    if let Ok(mut wd) = watchdog.lock() {
                                        if let Some(ev) = wd.on_heartbeat(now) {
                                            let _ = ev_tx.send(ev);
                                        }
                                    }
                                }
                            }
                            if mav::apply_message(&mut state, hdr.system_id, target_sys, &msg, now) {
                                sensed_tx.send_replace(state.clone());
                            }
                        }
                        Ok(Frame::Corrupt) => {
                            let n = counters.corrupt.fetch_add(1, Ordering::Relaxed) + 1;
                            debug!("FC: discarded corrupt frame (total {})", n);
                        }
                        Err(e) => {
                            if last_warn.map_or(true, |t| t.elapsed() >= WARN_EVERY) {
                                warn!("FC: recv failed: {}", e);
                                last_warn = Some(Instant::now());
                            }
                            std::thread::sleep(Duration::from_millis(50));
                        }
                    }
                }
                debug!("FC: reader stopped");
            })
            .context("spawn fc reader thread")?;
    }

    // Command loop: companion heartbeat, watchdog, arbitration.
    {
        let fc = fc.clone();
        let stop = stop.clone();
        let hb_interval = cfg.heartbeat_interval();
        let refresh = cfg.command_refresh();
        let stream_rate = cfg.stream_rate_hz;
        std::thread::Builder::new()
            .name("fc-command".into())
            .spawn(move || {
                let mut arb = CommandArbiter::new(refresh);
                let mut last_hb_send: Option<Instant> = None;
                // Reset while the autopilot is silent so a rebooted one is asked again.
                let mut streams_requested = stream_rate == 0;
                let mut announced: Option<NavCommand> = None;
                let mut last_warn: Option<Instant> = None;
                while !stop.load(Ordering::Relaxed) {
                    let now = Instant::now();
                    if last_hb_send.map_or(true, |t| now.saturating_duration_since(t) >= hb_interval) {
                        if let Err(e) = fc.send_heartbeat() {
                            debug!("FC: heartbeat send failed: {}", e);
                        }
                        last_hb_send = Some(now);
                    }

                    let mut silent = false;
                    if let Ok(mut wd) = watchdog.lock() {
                        if let Some(ev) = wd.check(now) {
                            let _ = ev_tx.send(ev);
                        }
                        silent = wd.is_tripped();
                    }

                    if silent {
                        streams_requested = stream_rate == 0;
                    } else if !streams_requested && fc.heartbeat_seen() {
                        match fc.request_streams(stream_rate) {
                            Ok(()) => streams_requested = true,
                            Err(e) => debug!("FC: stream request failed: {}", e),
                        }
                    }

                    let override_cmd = *avoidance.borrow();
                    arb.set_mission(*mission.borrow());
                    arb.set_override(override_cmd);
                    if arb.effective() != announced {
                        announced = arb.effective();
                        let src = if override_cmd.is_some() { "avoidance" } else { "mission" };
                        info!("FC: command -> {} ({})", announced.map(|c| c.label()).unwrap_or("none"), src);
                    }

                    if let Some(cmd) = arb.due(now) {
                        match fc.send_navigation_command(&cmd) {
                            Ok(()) => arb.mark_sent(cmd, now),
                            Err(InterfaceError::NoHeartbeat) => debug!("FC: holding {} until heartbeat", cmd.label()),
                            Err(e) => {
                                if last_warn.map_or(true, |t| t.elapsed() >= WARN_EVERY) {
                                    warn!("FC: command send failed: {}", e);
                                    last_warn = Some(Instant::now());
                                }
                            }
                        }
                    }
                    std::thread::sleep(COMMAND_TICK);
                }
                debug!("FC: command loop stopped");
            })
            .context("spawn fc command thread")?;
    }

    Ok((FcRunner { fc, counters, stop }, FcChannels { sensed: sensed_rx, events: ev_rx }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mavlink::common::{
        MavAutopilot, MavCmd, MavModeFlag, MavState, MavType, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA,
    };
    use sentinel_proto::mission::Position;
    use std::collections::VecDeque;

    #[derive(Default)]
    pub(crate) struct Scripted {
        pub inbox: Mutex<VecDeque<(MavHeader, Option<MavMessage>)>>,
        pub sent: Mutex<Vec<MavMessage>>,
    }

    impl Scripted {
        pub fn push(&self, sys: u8, msg: Option<MavMessage>) {
            let hdr = MavHeader { system_id: sys, component_id: 1, sequence: 0 };
            self.inbox.lock().unwrap().push_back((hdr, msg));
        }
    }

    impl AutopilotTransport for Scripted {
        fn send(&self, _hdr: &MavHeader, msg: &MavMessage) -> Result<(), InterfaceError> {
            self.sent.lock().unwrap().push(msg.clone());
            Ok(())
        }

        fn recv(&self) -> Result<Frame, InterfaceError> {
            let next = self.inbox.lock().unwrap().pop_front();
            match next {
                Some((hdr, Some(msg))) => Ok(Frame::Message(hdr, msg)),
                Some((_, None)) => Ok(Frame::Corrupt),
                None => {
                    std::thread::sleep(Duration::from_millis(5));
                    Err(InterfaceError::Transport("idle".into()))
                }
            }
        }
    }

    pub(crate) fn autopilot_heartbeat() -> MavMessage {
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            custom_mode: 4,
            mavtype: MavType::MAV_TYPE_QUADROTOR,
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode: MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        })
    }

    pub(crate) fn test_cfg() -> FcConfig {
        FcConfig {
            enable: true,
            url: Some("udpin:127.0.0.1:14550".into()),
            serial_dev: None,
            baud: None,
            sys_id: 1,
            comp_id: 191,
            target_sys: 1,
            target_comp: 1,
            require_heartbeat: true,
            send_heartbeat_hz: Some(5.0),
            autopilot_heartbeat_hz: Some(20.0),
            missed_heartbeats: 2,
            command_refresh_ms: 200,
            stream_rate_hz: 4,
            heartbeat_timeout_ms: Some(300),
        }
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    fn sent_matching(t: &Scripted, f: impl Fn(&MavMessage) -> bool) -> usize {
        t.sent.lock().unwrap().iter().filter(|m| f(m)).count()
    }

    fn is_loiter(m: &MavMessage) -> bool {
        matches!(m, MavMessage::COMMAND_LONG(c) if c.command == MavCmd::MAV_CMD_NAV_LOITER_UNLIM)
    }

    fn is_reposition(m: &MavMessage) -> bool {
        matches!(m, MavMessage::COMMAND_INT(c) if c.command == MavCmd::MAV_CMD_DO_REPOSITION)
    }

    #[test]
    fn commands_refused_before_heartbeat() {
        let t = Arc::new(Scripted::default());
        let fc = FlightInterface::new(&test_cfg(), t.clone());
        assert_eq!(fc.send_navigation_command(&NavCommand::Hold), Err(InterfaceError::NoHeartbeat));
        fc.mark_heartbeat();
        assert_eq!(fc.send_navigation_command(&NavCommand::Hold), Ok(()));
        assert_eq!(sent_matching(&t, is_loiter), 1);
    }

    #[test]
    fn reader_publishes_state_and_counts_corrupt_frames() {
        let t = Arc::new(Scripted::default());
        t.push(1, Some(autopilot_heartbeat()));
        t.push(1, None);
        t.push(
            1,
            Some(MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
                time_boot_ms: 0,
                lat: 470_000_000,
                lon: 80_000_000,
                alt: 0,
                relative_alt: 15_000,
                vx: 0,
                vy: 0,
                vz: 0,
                hdg: 0,
            })),
        );
        let (_m_tx, m_rx) = watch::channel(None);
        let (_a_tx, a_rx) = watch::channel(None);
        let (runner, ch) = spawn(&test_cfg(), t.clone(), m_rx, a_rx).unwrap();
        assert!(wait_for(|| ch.sensed.borrow().has_fix()));
        let s = ch.sensed.borrow().clone();
        assert!(s.armed);
        assert_eq!(s.position.alt_m, 15.0);
        assert_eq!(runner.counters.corrupt.load(Ordering::Relaxed), 1);
        assert!(runner.fc.heartbeat_seen());
    }

    fn is_stream_request(m: &MavMessage) -> bool {
        matches!(m, MavMessage::REQUEST_DATA_STREAM(_))
    }

    #[test]
    fn streams_requested_once_after_first_heartbeat() {
        let t = Arc::new(Scripted::default());
        let (_m_tx, m_rx) = watch::channel(None);
        let (_a_tx, a_rx) = watch::channel(None);
        let cfg = FcConfig { autopilot_heartbeat_hz: Some(1.0), ..test_cfg() };
        let (_runner, _ch) = spawn(&cfg, t.clone(), m_rx, a_rx).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sent_matching(&t, is_stream_request), 0);

        t.push(1, Some(autopilot_heartbeat()));
        assert!(wait_for(|| sent_matching(&t, is_stream_request) == 2));
        t.push(1, Some(autopilot_heartbeat()));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sent_matching(&t, is_stream_request), 2);
    }

    #[test]
    fn zero_stream_rate_sends_no_requests() {
        let t = Arc::new(Scripted::default());
        t.push(1, Some(autopilot_heartbeat()));
        let (_m_tx, m_rx) = watch::channel(None);
        let (_a_tx, a_rx) = watch::channel(None);
        let cfg = FcConfig { stream_rate_hz: 0, ..test_cfg() };
        let (runner, _ch) = spawn(&cfg, t.clone(), m_rx, a_rx).unwrap();
        assert!(wait_for(|| runner.fc.heartbeat_seen()));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sent_matching(&t, is_stream_request), 0);
    }

    #[test]
    fn missing_heartbeats_raise_a_single_event() {
        let t = Arc::new(Scripted::default());
        let (_m_tx, m_rx) = watch::channel(None);
        let (_a_tx, a_rx) = watch::channel(None);
        let (_runner, mut ch) = spawn(&test_cfg(), t.clone(), m_rx, a_rx).unwrap();
        std::thread::sleep(Duration::from_millis(400));
        assert!(matches!(
            ch.events.try_recv(),
            Ok(FcEvent::Fault(InterfaceError::AutopilotUnresponsive { .. }))
        ));
        assert!(ch.events.try_recv().is_err());
        t.push(1, Some(autopilot_heartbeat()));
        assert!(wait_for(|| matches!(ch.events.try_recv(), Ok(FcEvent::Recovered))));
        assert!(wait_for(|| sent_matching(&t, is_stream_request) >= 2));
    }

    #[test]
    fn avoidance_override_supersedes_mission_then_releases() {
        let t = Arc::new(Scripted::default());
        t.push(1, Some(autopilot_heartbeat()));
        let nav = NavCommand::Navigate { target: Position { lat: 47.0, lon: 8.0, alt_m: 20.0 }, speed_mps: 5.0 };
        let (m_tx, m_rx) = watch::channel(Some(nav));
        let (a_tx, a_rx) = watch::channel(None);
        let (_runner, _ch) = spawn(&test_cfg(), t.clone(), m_rx, a_rx).unwrap();

        assert!(wait_for(|| sent_matching(&t, is_reposition) > 0));
        a_tx.send_replace(Some(NavCommand::Hold));
        assert!(wait_for(|| sent_matching(&t, is_loiter) > 0));
        // Mission updates while overridden do not reach the autopilot.
        let before = sent_matching(&t, is_reposition);
        m_tx.send_replace(Some(NavCommand::Return));
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sent_matching(&t, is_reposition), before);
        a_tx.send_replace(None);
        assert!(wait_for(|| {
            sent_matching(&t, |m| matches!(m, MavMessage::COMMAND_LONG(c) if c.command == MavCmd::MAV_CMD_NAV_RETURN_TO_LAUNCH)) > 0
        }));
    }
}
