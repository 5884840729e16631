use anyhow::{Context, Result};
use mavlink::common::MavMessage;
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader};

use crate::error::InterfaceError;

pub enum Frame {
    Message(MavHeader, MavMessage),
    /// Frame failed CRC or was truncated; already discarded.
    Corrupt,
}

/// Byte-level link to the autopilot. Shared between the reader and the
/// command thread, so both directions take `&self`.
pub trait AutopilotTransport: Send + Sync {
    fn send(&self, hdr: &MavHeader, msg: &MavMessage) -> Result<(), InterfaceError>;
    /// May block until a frame arrives.
    fn recv(&self) -> Result<Frame, InterfaceError>;
}

pub struct MavlinkTransport {
    conn: Box<dyn MavConnection<MavMessage> + Send + Sync>,
}

impl MavlinkTransport {
    pub fn open(url: &str) -> Result<Self> {
        let conn = mavlink::connect::<MavMessage>(url).with_context(|| format!("mavlink connect {}", url))?;
        Ok(Self { conn })
    }
}

impl AutopilotTransport for MavlinkTransport {
    fn send(&self, hdr: &MavHeader, msg: &MavMessage) -> Result<(), InterfaceError> {
        self.conn
            .send(hdr, msg)
            .map(|_| ())
            .map_err(|e| InterfaceError::Transport(e.to_string()))
    }

    fn recv(&self) -> Result<Frame, InterfaceError> {
        match self.conn.recv() {
            Ok((hdr, msg)) => Ok(Frame::Message(hdr, msg)),
            Err(MessageReadError::Parse(_)) => Ok(Frame::Corrupt),
            Err(MessageReadError::Io(e)) => Err(InterfaceError::Transport(e.to_string())),
        }
    }
}
