use serde::{Deserialize, Serialize};

pub const MIN_SPEED_MPS: f32 = 0.5;
pub const MAX_SPEED_MPS: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    /// Relative to the launch point.
    pub alt_m: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointAction {
    #[default]
    Navigate,
    Loiter,
    Land,
    Return,
}

impl WaypointAction {
    /// Actions after which the segment cannot continue.
    pub fn is_terminal(self) -> bool {
        matches!(self, WaypointAction::Land | WaypointAction::Return)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f32,
    #[serde(default = "default_speed")]
    pub speed_mps: f32,
    #[serde(default)]
    pub action: WaypointAction,
    #[serde(default)]
    pub loiter_s: u32,
}

fn default_speed() -> f32 {
    5.0
}

impl Waypoint {
    pub fn position(&self) -> Position {
        Position { lat: self.lat, lon: self.lon, alt_m: self.alt_m }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnComplete {
    #[default]
    Hold,
    Land,
    AwaitNext,
}

/// An ordered run of waypoints. Never edited after acceptance; a new
/// assignment replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionSegment {
    pub segment_id: String,
    pub mission_id: String,
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub on_complete: OnComplete,
    pub min_clearance_m: f32,
}
