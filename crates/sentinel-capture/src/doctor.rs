use anyhow::Result;
use std::path::Path;

use crate::camera::CameraMode;
use crate::CaptureConfig;

pub fn check_capture(cfg: &CaptureConfig) -> Result<()> {
    if !cfg.enable {
        return Ok(());
    }
    let p = Path::new(&cfg.spool_dir);
    if p.exists() {
        anyhow::ensure!(p.is_dir(), "capture.spool_dir is not a dir: {}", cfg.spool_dir);
    }
    anyhow::ensure!((0.5..=600.0).contains(&cfg.interval_s), "capture.interval_s should be 0.5..600");
    anyhow::ensure!((1..=100).contains(&cfg.jpeg_quality), "capture.jpeg_quality should be 1..100");
    anyhow::ensure!(cfg.max_width >= 64, "capture.max_width too small; set >= 64");
    anyhow::ensure!(cfg.min_spacing_m >= 0.0, "capture.min_spacing_m must not be negative");
    anyhow::ensure!(cfg.camera.width > 0 && cfg.camera.height > 0, "capture.camera size must be set");
    match cfg.camera.mode {
        CameraMode::V4l2Mjpeg | CameraMode::Still => {
            anyhow::ensure!(!cfg.camera.device.is_empty(), "capture.camera.device required for {:?}", cfg.camera.mode)
        }
        CameraMode::LibcameraJpeg => {}
    }
    Ok(())
}
