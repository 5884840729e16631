use serde::{Deserialize, Serialize};

use crate::mission::MissionSegment;
use crate::runtime::ConfigUpdate;
use crate::SCHEMA_VERSION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundBody {
    MissionSegment(MissionSegment),
    Recall,
    Abort,
    ConfigUpdate(ConfigUpdate),
    Heartbeat,
}

impl InboundBody {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundBody::MissionSegment(_) => "mission_segment",
            InboundBody::Recall => "recall",
            InboundBody::Abort => "abort",
            InboundBody::ConfigUpdate(_) => "config_update",
            InboundBody::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub schema_version: u16,
    pub ts_unix_ms: i64,
    pub body: InboundBody,
}

impl InboundEnvelope {
    pub fn new(ts_unix_ms: i64, body: InboundBody) -> Self {
        Self { schema_version: SCHEMA_VERSION, ts_unix_ms, body }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("schema version mismatch: got {got}, expected {expected}")]
    VersionMismatch { got: u64, expected: u16 },
}

impl ProtoError {
    pub fn reason(&self) -> &'static str {
        match self {
            ProtoError::Malformed(_) => "malformed",
            ProtoError::VersionMismatch { .. } => "version_mismatch",
        }
    }
}

/// Parses one inbound message. The version is checked before the body so a
/// newer schema is reported as a mismatch rather than as a parse failure.
pub fn parse_inbound(raw: &[u8]) -> Result<InboundEnvelope, ProtoError> {
    let value: serde_json::Value =
        serde_json::from_slice(raw).map_err(|e| ProtoError::Malformed(e.to_string()))?;
    let got = value
        .get("schema_version")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ProtoError::Malformed("missing schema_version".into()))?;
    if got != u64::from(SCHEMA_VERSION) {
        return Err(ProtoError::VersionMismatch { got, expected: SCHEMA_VERSION });
    }
    serde_json::from_value(value).map_err(|e| ProtoError::Malformed(e.to_string()))
}
