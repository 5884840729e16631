pub mod avoider;
pub mod doctor;
pub mod model;
pub mod planner;
pub mod run;
pub mod source;

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AvoidConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    /// Loop rate; must keep up with the flight interface, so >= 10.
    #[serde(default = "default_rate")]
    pub rate_hz: f32,
    #[serde(default = "default_range")]
    pub detection_range_m: f32,
    #[serde(default = "default_confidence")]
    pub min_confidence: f32,
    /// Extra margin on top of the segment clearance when placing a detour.
    #[serde(default = "default_buffer")]
    pub clearance_buffer_m: f32,
    /// Clearance used when no segment is active.
    #[serde(default = "default_clearance")]
    pub default_clearance_m: f32,
    #[serde(default = "default_avoid_speed")]
    pub avoid_speed_mps: f32,
    #[serde(default = "default_resume")]
    pub resume_clear_cycles: u32,
    /// Missed frames tolerated before the model is cleared and marked stale;
    /// 0 or 1.
    #[serde(default = "default_grace")]
    pub grace_cycles: u32,
    /// UDP address the depth producer sends JSON frames to, e.g. "127.0.0.1:14600".
    pub depth_listen: Option<String>,
}

fn default_true() -> bool { true }
fn default_rate() -> f32 { 10.0 }
fn default_range() -> f32 { 10.0 }
fn default_confidence() -> f32 { 0.3 }
fn default_buffer() -> f32 { 1.0 }
fn default_clearance() -> f32 { 2.0 }
fn default_avoid_speed() -> f32 { 2.0 }
fn default_resume() -> u32 { 5 }
fn default_grace() -> u32 { 1 }

impl Default for AvoidConfig {
    fn default() -> Self {
        Self {
            enable: true,
            rate_hz: default_rate(),
            detection_range_m: default_range(),
            min_confidence: default_confidence(),
            clearance_buffer_m: default_buffer(),
            default_clearance_m: default_clearance(),
            avoid_speed_mps: default_avoid_speed(),
            resume_clear_cycles: default_resume(),
            grace_cycles: default_grace(),
            depth_listen: None,
        }
    }
}

impl AvoidConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.rate_hz.max(10.0))
    }
}
