use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::model::DepthFrame;

const WARN_EVERY: Duration = Duration::from_secs(5);

/// Non-blocking frame supply for the avoidance loop.
pub trait DepthSource: Send {
    /// Newest frame since the previous call, if any. Older pending frames
    /// are dropped.
    fn try_latest(&mut self) -> Option<DepthFrame>;
}

/// Single-slot handoff from a producer task: a frame the loop has not read
/// yet is overwritten by the next one.
pub struct ChannelSource {
    rx: watch::Receiver<Option<DepthFrame>>,
}

impl ChannelSource {
    pub fn new(rx: watch::Receiver<Option<DepthFrame>>) -> Self {
        Self { rx }
    }
}

impl DepthSource for ChannelSource {
    fn try_latest(&mut self) -> Option<DepthFrame> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }
}

/// No sensor attached: every cycle misses, so the model goes stale after
/// its grace period.
pub struct NoSource;

impl DepthSource for NoSource {
    fn try_latest(&mut self) -> Option<DepthFrame> {
        None
    }
}

pub async fn bind_udp(addr: &str) -> Result<UdpSocket> {
    let sock = UdpSocket::bind(addr).await.with_context(|| format!("bind depth listener {}", addr))?;
    info!("depth listener on {}", sock.local_addr().context("depth listener addr")?);
    Ok(sock)
}

/// Forwards one JSON `DepthFrame` per datagram. Undecodable datagrams are
/// counted and dropped. Returns when the receiving side is gone.
pub async fn pump_udp(sock: UdpSocket, tx: watch::Sender<Option<DepthFrame>>) -> Result<()> {
    let mut buf = vec![0u8; 64 * 1024];
    let mut bad: u64 = 0;
    let mut last_warn: Option<Instant> = None;
    loop {
        let (n, peer) = sock.recv_from(&mut buf).await.context("depth recv")?;
        match serde_json::from_slice::<DepthFrame>(&buf[..n]) {
            Ok(frame) => {
                if tx.send(Some(frame)).is_err() {
                    debug!("depth consumer gone, listener exiting");
                    return Ok(());
                }
            }
            Err(e) => {
                bad += 1;
                if last_warn.map_or(true, |t| t.elapsed() >= WARN_EVERY) {
                    warn!("bad depth frame from {} ({} so far): {}", peer, bad, e);
                    last_warn = Some(Instant::now());
                }
            }
        }
    }
}
