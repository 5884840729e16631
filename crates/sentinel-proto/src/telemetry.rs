use serde::{Deserialize, Serialize};

use crate::mission::{OnComplete, Position};
use crate::vehicle::{ConnectivityState, ExecutorMode, VehicleState};
use crate::SCHEMA_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f32,
    pub heading_deg: f32,
    pub ground_speed_mps: f32,
    pub armed: bool,
    pub autonomy: ConnectivityState,
    pub mode: ExecutorMode,
    pub waypoint_index: usize,
    // Battery monitoring
    pub battery_voltage: Option<f32>,
    pub battery_percent: Option<u8>,
    pub battery_current: Option<f32>,
}

impl TelemetrySample {
    pub fn from_state(st: &VehicleState) -> Self {
        let s = &st.sensed;
        Self {
            lat: s.position.lat,
            lon: s.position.lon,
            alt_m: s.position.alt_m,
            heading_deg: s.heading_deg,
            ground_speed_mps: s.ground_speed_mps,
            armed: s.armed,
            autonomy: st.progress.autonomy,
            mode: st.progress.mode,
            waypoint_index: st.progress.waypoint_index,
            battery_voltage: s.battery.voltage,
            battery_percent: s.battery.remaining,
            battery_current: s.battery.current,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvoidanceKind {
    Engaged,
    Released,
    SensorStale,
    SensorRecovered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvoidanceEvent {
    pub kind: AvoidanceKind,
    pub obstacles: usize,
    pub nearest_m: Option<f32>,
    pub target: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageNotification {
    pub frame_id: String,
    pub image_key: String,
    pub path: String,
    pub lat: f64,
    pub lon: f64,
    pub alt_m: f32,
    pub heading_deg: f32,
    pub size_bytes: u64,
    pub captured_unix_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordBody {
    Telemetry(TelemetrySample),
    StateTransition {
        from: ConnectivityState,
        to: ConnectivityState,
        reason: String,
        disconnected_s: f32,
    },
    Progress {
        segment_id: String,
        waypoint_index: usize,
        total_waypoints: usize,
    },
    SegmentComplete {
        segment_id: String,
        on_complete: OnComplete,
    },
    Avoidance(AvoidanceEvent),
    Image(ImageNotification),
    Rejection {
        reason: String,
        detail: String,
    },
    Error {
        source: String,
        detail: String,
    },
    Heartbeat,
}

impl RecordBody {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordBody::Telemetry(_) => "telemetry",
            RecordBody::StateTransition { .. } => "state_transition",
            RecordBody::Progress { .. } => "progress",
            RecordBody::SegmentComplete { .. } => "segment_complete",
            RecordBody::Avoidance(_) => "avoidance",
            RecordBody::Image(_) => "image",
            RecordBody::Rejection { .. } => "rejection",
            RecordBody::Error { .. } => "error",
            RecordBody::Heartbeat => "heartbeat",
        }
    }

    pub fn rejection(reason: impl Into<String>, detail: impl Into<String>) -> Self {
        RecordBody::Rejection { reason: reason.into(), detail: detail.into() }
    }

    pub fn error(source: impl Into<String>, detail: impl Into<String>) -> Self {
        RecordBody::Error { source: source.into(), detail: detail.into() }
    }
}

/// One outbound message. `seq` increases monotonically per process so the
/// remote side can order records even when wall clocks jump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub schema_version: u16,
    pub vehicle_id: String,
    pub seq: u64,
    pub ts_unix_ms: i64,
    pub body: RecordBody,
}

impl OutboundRecord {
    pub fn new(vehicle_id: &str, seq: u64, ts_unix_ms: i64, body: RecordBody) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            vehicle_id: vehicle_id.to_string(),
            seq,
            ts_unix_ms,
            body,
        }
    }

    /// Newline-terminated JSON line for the uplink stream.
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut out = serde_json::to_vec(self)?;
        out.push(b'\n');
        Ok(out)
    }
}
