use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sentinel_avoid::run::{self as avoid_run, AvoidLinks, AvoidRunner};
use sentinel_avoid::source::{self, ChannelSource, DepthSource, NoSource};
use sentinel_capture::CapturePipeline;
use sentinel_fc::runner as fc_runner;
use sentinel_fc::transport::{AutopilotTransport, MavlinkTransport};
use sentinel_fc::FcEvent;
use sentinel_nav::executor::{MissionExecutor, TickInput};
use sentinel_nav::failsafe::FailSafeTimeouts;
use sentinel_nav::geofence::Geofence;
use sentinel_proto::runtime::RuntimeConfig;
use sentinel_proto::telemetry::{RecordBody, TelemetrySample};
use sentinel_proto::vehicle::{ExecutorMode, LinkStatus, MissionProgress, NavCommand, SensedState, VehicleState};
use sentinel_uplink::{Directive, LinkManager, Reporter};

use crate::Config;

pub async fn run(cfg: Config) -> Result<()> {
    info!("run: starting {}", cfg.vehicle_id);
    anyhow::ensure!(cfg.fc.enable, "fc.enable=false; nothing to fly");

    let (rt_tx, rt_rx) = watch::channel(Arc::new(cfg.initial_runtime()?));
    let (link, link_task) = sentinel_uplink::spawn(cfg.uplink.clone(), &cfg.vehicle_id)?;
    let reporter = link.reporter();
    let link_status = link.status();

    // Flight interface
    let url = cfg.fc.connection_url()?;
    let transport: Arc<dyn AutopilotTransport> = Arc::new(MavlinkTransport::open(&url)?);
    info!("run: fc on {}", url);
    let (mission_tx, mission_rx) = watch::channel::<Option<NavCommand>>(None);
    let (override_tx, override_rx) = watch::channel::<Option<NavCommand>>(None);
    let (fc, fc_ch) = fc_runner::spawn(&cfg.fc, transport, mission_rx.clone(), override_rx)?;

    let fence = Geofence::new(cfg.geofence.clone());
    let exec = MissionExecutor::new(cfg.mission.clone(), fence);

    let (progress_tx, progress_rx) = watch::channel(MissionProgress::default());
    let (clearance_tx, clearance_rx) = watch::channel::<Option<f32>>(None);
    let (mission_id_tx, mission_id_rx) = watch::channel::<Option<String>>(None);
    let (stale_tx, stale_rx) = watch::channel(false);

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Obstacle avoidance
    let mut avoid: Option<AvoidRunner> = None;
    if cfg.avoid.enable {
        let depth: Box<dyn DepthSource> = match &cfg.avoid.depth_listen {
            Some(addr) => {
                let sock = source::bind_udp(addr).await?;
                let (tx, rx) = watch::channel(None);
                tasks.push(tokio::spawn(async move {
                    if let Err(e) = source::pump_udp(sock, tx).await {
                        warn!("depth listener stopped: {:#}", e);
                    }
                }));
                Box::new(ChannelSource::new(rx))
            }
            None => {
                warn!("avoid: no depth_listen configured; depth will read as stale");
                Box::new(NoSource)
            }
        };
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();
        let links = AvoidLinks {
            sensed: fc_ch.sensed.clone(),
            mission: mission_rx,
            clearance: clearance_rx,
            override_tx,
            stale_tx,
            events: ev_tx,
        };
        avoid = Some(avoid_run::spawn(cfg.avoid.clone(), Some(exec.home()), depth, links)?);

        let rep = reporter.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(ev) = ev_rx.recv().await {
                rep.report(RecordBody::Avoidance(ev));
            }
        }));
    } else {
        warn!("avoid: disabled");
    }

    tasks.push(tokio::spawn(telemetry_loop(
        fc_ch.sensed.clone(),
        progress_rx,
        rt_rx.clone(),
        reporter.clone(),
    )));

    if let Some(cap) = cfg.capture.clone().filter(|c| c.enable) {
        let pipe = CapturePipeline::new(cap, &cfg.vehicle_id);
        tasks.push(tokio::spawn(pipe.run(fc_ch.sensed.clone(), mission_id_rx, rt_rx.clone(), reporter.clone())));
    }

    let tick = cfg.mission.tick_period();
    let exec_loop = ExecLoop {
        exec,
        link,
        reporter,
        sensed: fc_ch.sensed,
        fc_events: fc_ch.events,
        link_status,
        stale: stale_rx,
        runtime: rt_tx,
        mission_tx,
        progress_tx,
        clearance_tx,
        mission_id_tx,
    };
    tasks.push(tokio::spawn(exec_loop.run(tick)));

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("run: shutting down");

    for t in &tasks {
        t.abort();
    }
    if let Some(mut a) = avoid.take() {
        a.shutdown();
    }
    fc.shutdown();
    link_task.abort();
    Ok(())
}

struct ExecLoop {
    exec: MissionExecutor,
    link: LinkManager,
    reporter: Reporter,
    sensed: watch::Receiver<SensedState>,
    fc_events: mpsc::UnboundedReceiver<FcEvent>,
    link_status: watch::Receiver<LinkStatus>,
    stale: watch::Receiver<bool>,
    runtime: watch::Sender<Arc<RuntimeConfig>>,
    mission_tx: watch::Sender<Option<NavCommand>>,
    progress_tx: watch::Sender<MissionProgress>,
    clearance_tx: watch::Sender<Option<f32>>,
    mission_id_tx: watch::Sender<Option<String>>,
}

impl ExecLoop {
    async fn run(mut self, period: std::time::Duration) {
        let mut iv = tokio::time::interval(period);
        iv.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            iv.tick().await;
            self.step(Instant::now());
        }
    }

    fn step(&mut self, now: Instant) {
        while let Ok(ev) = self.fc_events.try_recv() {
            match ev {
                FcEvent::Fault(e) => {
                    warn!("fc: {}", e);
                    self.exec.on_autopilot_fault(true);
                }
                FcEvent::Recovered => self.exec.on_autopilot_fault(false),
            }
        }

        // Directives are applied strictly in arrival order.
        loop {
            if let Some(seg) = self.link.deliver_segment() {
                let _ = self.exec.accept_segment(seg);
                continue;
            }
            match self.link.take_command() {
                Some(d) => self.apply(d),
                None => break,
            }
        }

        let sensed = self.sensed.borrow().clone();
        let rt = self.runtime.borrow().clone();
        let input = TickInput {
            sensed: &sensed,
            link: *self.link_status.borrow(),
            depth_stale: *self.stale.borrow(),
        };
        let out = self.exec.tick(&input, FailSafeTimeouts::from(rt.as_ref()), now);
        for r in out.records {
            self.reporter.report(r);
        }
        match out.command {
            Some(cmd) => {
                self.mission_tx.send_replace(Some(cmd));
            }
            // Idle issues nothing; the autopilot keeps whatever mode it is in.
            None if self.exec.mode() == ExecutorMode::Idle => {
                self.mission_tx.send_if_modified(|c| replace_if_changed(c, None));
            }
            None => {}
        }

        let progress = self.exec.progress();
        self.progress_tx.send_if_modified(|p| replace_if_changed(p, progress));
        let seg = self.exec.active_segment();
        let clearance = seg.map(|s| s.min_clearance_m);
        let mission_id = seg.map(|s| s.mission_id.clone());
        self.clearance_tx.send_if_modified(|c| replace_if_changed(c, clearance));
        self.mission_id_tx.send_if_modified(|m| replace_if_changed(m, mission_id));
    }

    fn apply(&mut self, d: Directive) {
        match d {
            Directive::Segment(seg) => {
                let _ = self.exec.accept_segment(seg);
            }
            Directive::Recall => self.exec.recall(),
            Directive::Abort => self.exec.abort(),
            Directive::ConfigUpdate(upd) => {
                let next = self.runtime.borrow().apply(&upd);
                match next {
                    Ok(rc) => {
                        info!(
                            "runtime config updated: telemetry {} Hz, capture {:?}, hold {:?}, return {:?}",
                            rc.telemetry_hz, rc.capture_interval, rc.hold_timeout, rc.return_timeout
                        );
                        self.runtime.send_replace(Arc::new(rc));
                    }
                    Err(e) => {
                        warn!("config update rejected: {}", e);
                        self.reporter.report(RecordBody::rejection("invalid_config", e.to_string()));
                    }
                }
            }
        }
    }
}

fn replace_if_changed<T: PartialEq>(slot: &mut T, v: T) -> bool {
    if *slot == v {
        return false;
    }
    *slot = v;
    true
}

async fn telemetry_loop(
    sensed: watch::Receiver<SensedState>,
    progress: watch::Receiver<MissionProgress>,
    runtime: watch::Receiver<Arc<RuntimeConfig>>,
    reporter: Reporter,
) {
    loop {
        let period = runtime.borrow().telemetry_period();
        tokio::time::sleep(period).await;
        let st = VehicleState::compose(&sensed.borrow(), &progress.borrow());
        reporter.report(RecordBody::Telemetry(TelemetrySample::from_state(&st)));
    }
}
