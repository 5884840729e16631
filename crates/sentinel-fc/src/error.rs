/// Failures surfaced by the flight interface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterfaceError {
    #[error("no autopilot heartbeat seen yet")]
    NoHeartbeat,
    #[error("autopilot unresponsive ({missed} heartbeats missed)")]
    AutopilotUnresponsive { missed: u32 },
    #[error("mavlink transport: {0}")]
    Transport(String),
}
