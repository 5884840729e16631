pub mod camera;
pub mod doctor;
pub mod encode;
pub mod filter;
pub mod pipeline;

use serde::Deserialize;

pub use camera::{CameraConfig, CameraMode};
pub use pipeline::CapturePipeline;

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub enable: bool,
    pub camera: CameraConfig,
    /// Root under which `images/captures/...` keys are written.
    pub spool_dir: String,
    /// Initial capture period; the remote side may change it in flight.
    #[serde(default = "default_interval")]
    pub interval_s: f32,
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    /// Minimum ground distance between consecutive captures.
    #[serde(default = "default_spacing")]
    pub min_spacing_m: f64,
    #[serde(default = "default_min_alt")]
    pub min_alt_m: f32,
}

fn default_interval() -> f32 { 5.0 }
fn default_max_width() -> u32 { 1920 }
fn default_quality() -> u8 { 85 }
fn default_spacing() -> f64 { 5.0 }
fn default_min_alt() -> f32 { 2.0 }
