use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use sentinel_proto::mission::Position;
use sentinel_proto::telemetry::AvoidanceEvent;
use sentinel_proto::vehicle::{NavCommand, SensedState};

use crate::avoider::{Avoider, CycleInput};
use crate::source::DepthSource;
use crate::AvoidConfig;

const WARN_EVERY: Duration = Duration::from_secs(5);

/// Channels the loop reads from and publishes to.
pub struct AvoidLinks {
    pub sensed: watch::Receiver<SensedState>,
    /// Mission intent as the executor last issued it.
    pub mission: watch::Receiver<Option<NavCommand>>,
    /// Clearance of the active segment; `None` falls back to the configured default.
    pub clearance: watch::Receiver<Option<f32>>,
    pub override_tx: watch::Sender<Option<NavCommand>>,
    pub stale_tx: watch::Sender<bool>,
    pub events: mpsc::UnboundedSender<AvoidanceEvent>,
}

pub struct AvoidRunner {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AvoidRunner {
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for AvoidRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs the avoidance loop on its own thread at `cfg.period()`, independent
/// of the async runtime.
pub fn spawn(cfg: AvoidConfig, home: Option<Position>, mut source: Box<dyn DepthSource>, links: AvoidLinks) -> Result<AvoidRunner> {
    let stop = Arc::new(AtomicBool::new(false));
    let period = cfg.period();
    let default_clearance = cfg.default_clearance_m;
    let mut avoider = Avoider::new(cfg);
    let handle = {
        let stop = stop.clone();
        std::thread::Builder::new()
            .name("avoid".into())
            .spawn(move || {
                info!("avoidance loop at {:.0} Hz", 1.0 / period.as_secs_f32());
                let mut next = Instant::now();
                let mut last_warn: Option<Instant> = None;
                while !stop.load(Ordering::Relaxed) {
                    let sensed = links.sensed.borrow().clone();
                    let mission = *links.mission.borrow();
                    let clearance_m = links.clearance.borrow().unwrap_or(default_clearance);
                    let out = avoider.cycle(CycleInput {
                        frame: source.try_latest(),
                        sensed: &sensed,
                        mission,
                        home,
                        clearance_m,
                    });
                    if let Some(publish) = out.publish {
                        links.override_tx.send_replace(publish);
                    }
                    links.stale_tx.send_if_modified(|v| {
                        let changed = *v != out.stale;
                        *v = out.stale;
                        changed
                    });
                    for ev in out.events {
                        if links.events.send(ev).is_err() {
                            debug!("avoidance event receiver gone");
                        }
                    }

                    next += period;
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    } else {
                        if last_warn.map_or(true, |t| t.elapsed() >= WARN_EVERY) {
                            warn!("avoidance cycle overran by {:?}", now - next);
                            last_warn = Some(now);
                        }
                        next = now;
                    }
                }
                // Never leave a stale override behind.
                links.override_tx.send_replace(None);
                debug!("avoidance loop stopped");
            })
            .context("spawn avoidance thread")?
    };
    Ok(AvoidRunner { stop, handle: Some(handle) })
}
