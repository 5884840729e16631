use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraMode {
    /// `libcamera-still` writing one JPEG to stdout.
    LibcameraJpeg,
    /// `ffmpeg` grabbing one MJPEG frame from a V4L2 device.
    V4l2Mjpeg,
    /// Re-reads the image at `device`; for bench setups without a camera.
    Still,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub mode: CameraMode,
    /// /dev/video0 for v4l2, an image path for still.
    #[serde(default)]
    pub device: String,
    pub width: u32,
    pub height: u32,
}

pub async fn capture_jpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    match cfg.mode {
        CameraMode::LibcameraJpeg => capture_libcamera(cfg).await,
        CameraMode::V4l2Mjpeg => capture_v4l2_ffmpeg(cfg).await,
        CameraMode::Still => tokio::fs::read(&cfg.device).await.with_context(|| format!("read still {}", cfg.device)),
    }
}

async fn capture_libcamera(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let mut cmd = Command::new("libcamera-still");
    cmd.args([
        "-n",
        "-t", "1",
        "--width", &cfg.width.to_string(),
        "--height", &cfg.height.to_string(),
        "-e", "jpg",
        "-o", "-",
    ]);
    cmd.kill_on_drop(true);

    debug!("capture: libcamera-still {}x{}", cfg.width, cfg.height);
    let out = cmd.output().await.context("run libcamera-still")?;
    anyhow::ensure!(out.status.success(), "libcamera-still failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    anyhow::ensure!(!out.stdout.is_empty(), "libcamera-still produced no data");
    Ok(out.stdout)
}

async fn capture_v4l2_ffmpeg(cfg: &CameraConfig) -> Result<Vec<u8>> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args([
        "-hide_banner", "-loglevel", "error",
        "-f", "video4linux2",
        "-input_format", "mjpeg",
        "-video_size", &format!("{}x{}", cfg.width, cfg.height),
        "-i", &cfg.device,
        "-frames:v", "1",
        "-f", "image2pipe",
        "-vcodec", "mjpeg",
        "-",
    ]);
    cmd.kill_on_drop(true);

    debug!("capture: ffmpeg {}", cfg.device);
    let out = cmd.output().await.context("run ffmpeg capture")?;
    anyhow::ensure!(out.status.success(), "ffmpeg capture failed: {}", String::from_utf8_lossy(&out.stderr).trim());
    anyhow::ensure!(!out.stdout.is_empty(), "ffmpeg produced no data");
    Ok(out.stdout)
}
