use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::mav;
use crate::runner::FlightInterface;
use crate::transport::{AutopilotTransport, Frame};
use crate::FcConfig;

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub hb_seen: bool,
    pub frames: u64,
    pub corrupt: u64,
    pub elapsed_ms: u64,
    pub note: String,
}

/// Sends a companion heartbeat and waits up to `timeout` for the autopilot
/// to answer with its own.
pub fn probe(cfg: &FcConfig, transport: Arc<dyn AutopilotTransport>, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let fc = FlightInterface::new(cfg, transport.clone());
    if let Err(e) = fc.send_heartbeat() {
        warn!("fc probe: heartbeat send failed: {}", e);
    }

    // recv may block indefinitely on a silent serial port; the reader is
    // left behind if the deadline passes first.
    let (tx, rx) = mpsc::channel();
    let target_sys = cfg.target_sys;
    std::thread::spawn(move || loop {
        let item = match transport.recv() {
            Ok(Frame::Message(hdr, mavlink::common::MavMessage::HEARTBEAT(hb))) => {
                Ok(mav::is_autopilot_heartbeat(hdr.system_id, target_sys, &hb))
            }
            Ok(Frame::Message(..)) => Ok(false),
            Ok(Frame::Corrupt) => Err(()),
            Err(_) => {
                std::thread::sleep(Duration::from_millis(25));
                continue;
            }
        };
        if tx.send(item).is_err() {
            break;
        }
    });

    let mut res = ProbeResult { hb_seen: false, frames: 0, corrupt: 0, elapsed_ms: 0, note: "no heartbeat".into() };
    while let Some(left) = timeout.checked_sub(start.elapsed()) {
        match rx.recv_timeout(left) {
            Ok(Ok(true)) => {
                res.frames += 1;
                res.hb_seen = true;
                res.note = "heartbeat".into();
                break;
            }
            Ok(Ok(false)) => res.frames += 1,
            Ok(Err(())) => res.corrupt += 1,
            Err(_) => break,
        }
    }
    res.elapsed_ms = start.elapsed().as_millis() as u64;
    if res.hb_seen {
        info!("fc probe: OK after {}ms", res.elapsed_ms);
    } else if res.frames > 0 {
        res.note = format!("{} frames but no autopilot heartbeat", res.frames);
    }
    res
}
