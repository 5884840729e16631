use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use sentinel_proto::runtime::RuntimeConfig;
use sentinel_proto::telemetry::{ImageNotification, RecordBody};
use sentinel_proto::vehicle::SensedState;
use sentinel_uplink::Reporter;

use crate::camera;
use crate::encode;
use crate::filter::CaptureFilter;
use crate::CaptureConfig;

pub struct CapturePipeline {
    cfg: CaptureConfig,
    vehicle_id: String,
    filter: CaptureFilter,
    seq: u64,
}

impl CapturePipeline {
    pub fn new(cfg: CaptureConfig, vehicle_id: &str) -> Self {
        Self {
            filter: CaptureFilter::new(cfg.min_spacing_m, cfg.min_alt_m),
            cfg,
            vehicle_id: vehicle_id.to_string(),
            seq: 0,
        }
    }

    /// One capture attempt: filter, grab, recompress, spool. `Ok(None)` when
    /// the filter skipped it.
    pub async fn capture_once(&mut self, sensed: &SensedState, mission_id: &str) -> Result<Option<ImageNotification>> {
        if let Err(skip) = self.filter.admit(sensed) {
            debug!("capture: skipped ({:?})", skip);
            return Ok(None);
        }
        let raw = camera::capture_jpeg(&self.cfg.camera).await?;
        let (max_width, quality) = (self.cfg.max_width, self.cfg.jpeg_quality);
        let jpeg = tokio::task::spawn_blocking(move || encode::recompress(&raw, max_width, quality))
            .await
            .context("join encode task")??;

        let at = OffsetDateTime::now_utc();
        let key = encode::image_key(mission_id, &self.vehicle_id, at)?;
        let path = Path::new(&self.cfg.spool_dir).join(&key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.with_context(|| format!("create {}", dir.display()))?;
        }
        tokio::fs::write(&path, &jpeg).await.with_context(|| format!("write {}", path.display()))?;
        self.filter.record(sensed.position);
        self.seq += 1;

        let p = &sensed.position;
        Ok(Some(ImageNotification {
            frame_id: format!("{}-{}", self.vehicle_id, self.seq),
            image_key: key,
            path: path.display().to_string(),
            lat: p.lat,
            lon: p.lon,
            alt_m: p.alt_m,
            heading_deg: sensed.heading_deg,
            size_bytes: jpeg.len() as u64,
            captured_unix_ms: (at.unix_timestamp_nanos() / 1_000_000) as i64,
        }))
    }

    /// Captures every `capture_interval` while a mission is assigned. The
    /// interval is re-read each round so remote updates apply on the next shot.
    pub async fn run(
        mut self,
        sensed: watch::Receiver<SensedState>,
        mission: watch::Receiver<Option<String>>,
        runtime: watch::Receiver<Arc<RuntimeConfig>>,
        reporter: Reporter,
    ) {
        info!("capture: spooling to {}", self.cfg.spool_dir);
        let mut failing = false;
        loop {
            let interval = runtime.borrow().capture_interval;
            tokio::time::sleep(interval).await;
            let Some(mission_id) = mission.borrow().clone() else {
                continue;
            };
            let s = sensed.borrow().clone();
            match self.capture_once(&s, &mission_id).await {
                Ok(Some(n)) => {
                    if failing {
                        info!("capture: recovered");
                    }
                    failing = false;
                    debug!("capture: stored {} ({} bytes)", n.image_key, n.size_bytes);
                    reporter.report(RecordBody::Image(n));
                }
                Ok(None) => {}
                Err(e) => {
                    // One record per failure streak.
                    if !failing {
                        warn!("capture: {:#}", e);
                        reporter.report(RecordBody::error("capture", format!("{:#}", e)));
                    } else {
                        debug!("capture: still failing: {:#}", e);
                    }
                    failing = true;
                }
            }
        }
    }
}
