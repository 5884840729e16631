use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::mission::Position;

/// Autonomy level relative to the remote service. `Landed` is the terminal
/// substate of `Returning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    #[default]
    Connected,
    Degraded,
    Holding,
    Returning,
    Landed,
}

impl ConnectivityState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectivityState::Connected => "connected",
            ConnectivityState::Degraded => "degraded",
            ConnectivityState::Holding => "holding",
            ConnectivityState::Returning => "returning",
            ConnectivityState::Landed => "landed",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw link status as classified by the link manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Up,
    #[default]
    Down,
}

impl LinkStatus {
    pub fn is_up(self) -> bool {
        self == LinkStatus::Up
    }

    pub fn as_connectivity(self) -> ConnectivityState {
        match self {
            LinkStatus::Up => ConnectivityState::Connected,
            LinkStatus::Down => ConnectivityState::Degraded,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Battery {
    pub voltage: Option<f32>,   // Volts
    pub current: Option<f32>,   // Amps
    pub remaining: Option<u8>,  // Percent 0-100
}

/// Fields written only by the flight interface.
#[derive(Debug, Clone, Default)]
pub struct SensedState {
    pub position: Position,
    pub heading_deg: f32,
    pub ground_speed_mps: f32,
    pub battery: Battery,
    pub armed: bool,
    pub custom_mode: u32,
    pub updated_at: Option<Instant>,
}

impl SensedState {
    pub fn has_fix(&self) -> bool {
        self.updated_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorMode {
    #[default]
    Idle,
    /// Arming and climbing to the first waypoint's altitude.
    Launching,
    Executing,
    Loitering,
    Holding,
    AwaitingNext,
    Returning,
    Landing,
    Aborted,
}

/// Fields written only by the mission executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionProgress {
    pub autonomy: ConnectivityState,
    pub mode: ExecutorMode,
    pub segment_id: Option<String>,
    pub waypoint_index: usize,
    pub total_waypoints: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VehicleState {
    pub sensed: SensedState,
    pub progress: MissionProgress,
}

impl VehicleState {
    pub fn compose(sensed: &SensedState, progress: &MissionProgress) -> Self {
        Self { sensed: sensed.clone(), progress: progress.clone() }
    }
}

/// Abstract navigation intent handed to the flight interface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum NavCommand {
    Navigate { target: Position, speed_mps: f32 },
    Hold,
    Return,
    Land,
    Arm,
    Takeoff { alt_m: f32 },
}

impl NavCommand {
    pub fn label(&self) -> &'static str {
        match self {
            NavCommand::Navigate { .. } => "navigate",
            NavCommand::Hold => "hold",
            NavCommand::Return => "return",
            NavCommand::Land => "land",
            NavCommand::Arm => "arm",
            NavCommand::Takeoff { .. } => "takeoff",
        }
    }

    /// Point the vehicle is currently flying towards, if any.
    pub fn path_target(&self, home: Option<Position>) -> Option<Position> {
        match self {
            NavCommand::Navigate { target, .. } => Some(*target),
            NavCommand::Return => home,
            _ => None,
        }
    }
}
