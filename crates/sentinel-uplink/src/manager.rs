use anyhow::{Context, Result};
use bytes::BytesMut;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sentinel_proto::command::{parse_inbound, InboundBody};
use sentinel_proto::mission::MissionSegment;
use sentinel_proto::now_unix_ms;
use sentinel_proto::runtime::ConfigUpdate;
use sentinel_proto::telemetry::{OutboundRecord, RecordBody};
use sentinel_proto::vehicle::LinkStatus;

use crate::backoff::Backoff;
use crate::buffer::OutboundBuffer;
use crate::liveness::Liveness;
use crate::transport::{self, Endpoint};
use crate::UplinkConfig;

const MAX_LINE: usize = 256 * 1024;
const WARN_EVERY: Duration = Duration::from_secs(5);

/// A remote request, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Segment(MissionSegment),
    Recall,
    Abort,
    ConfigUpdate(ConfigUpdate),
}

#[derive(Debug)]
struct Pending {
    ts_unix_ms: i64,
    body: RecordBody,
}

impl Pending {
    fn now(body: RecordBody) -> Self {
        Self { ts_unix_ms: now_unix_ms(), body }
    }
}

/// Cheap cloneable handle for components that only report.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<Pending>,
}

impl Reporter {
    /// Queues a record for upload. Never blocks; the worker stamps the
    /// sequence number as records enter the buffer.
    pub fn report(&self, body: RecordBody) {
        if self.tx.send(Pending::now(body)).is_err() {
            debug!("uplink: worker gone, record dropped");
        }
    }
}

pub struct LinkManager {
    reporter: Reporter,
    inbound: mpsc::UnboundedReceiver<Directive>,
    peeked: Option<Directive>,
    status: watch::Receiver<LinkStatus>,
}

impl LinkManager {
    fn peek(&mut self) -> Option<&Directive> {
        if self.peeked.is_none() {
            self.peeked = self.inbound.try_recv().ok();
        }
        self.peeked.as_ref()
    }

    /// Newly arrived segment, if it is next in line. Non-blocking.
    pub fn deliver_segment(&mut self) -> Option<MissionSegment> {
        if !matches!(self.peek(), Some(Directive::Segment(_))) {
            return None;
        }
        match self.peeked.take() {
            Some(Directive::Segment(seg)) => Some(seg),
            _ => None,
        }
    }

    /// Recall, abort or config update, if one is next in line. Non-blocking.
    pub fn take_command(&mut self) -> Option<Directive> {
        if matches!(self.peek(), None | Some(Directive::Segment(_))) {
            return None;
        }
        self.peeked.take()
    }

    pub fn report(&self, body: RecordBody) {
        self.reporter.report(body);
    }

    pub fn reporter(&self) -> Reporter {
        self.reporter.clone()
    }

    /// Raw up/down classification, updated on connect and on detected loss.
    pub fn status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }
}

struct Worker {
    cfg: UplinkConfig,
    vehicle_id: String,
    seq: u64,
    buffer: OutboundBuffer,
    outbound: mpsc::UnboundedReceiver<Pending>,
    inbound: mpsc::UnboundedSender<Directive>,
    status: watch::Sender<LinkStatus>,
    last_drop_warn: Option<Instant>,
}

fn channels(cfg: UplinkConfig, vehicle_id: &str) -> (Worker, LinkManager) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(LinkStatus::Down);
    let worker = Worker {
        buffer: OutboundBuffer::new(cfg.buffer_max_records, cfg.buffer_max_age()),
        cfg,
        vehicle_id: vehicle_id.to_string(),
        seq: 0,
        outbound: out_rx,
        inbound: in_tx,
        status: status_tx,
        last_drop_warn: None,
    };
    let manager = LinkManager { reporter: Reporter { tx: out_tx }, inbound: in_rx, peeked: None, status: status_rx };
    (worker, manager)
}

/// Starts the link worker on the current runtime. It runs until every
/// `Reporter` (and the manager) has been dropped.
pub fn spawn(cfg: UplinkConfig, vehicle_id: &str) -> Result<(LinkManager, JoinHandle<()>)> {
    let endpoint = Endpoint::parse(&cfg.endpoint)?;
    let (worker, manager) = channels(cfg, vehicle_id);
    let handle = tokio::spawn(worker.run(endpoint));
    Ok((manager, handle))
}

impl Worker {
    async fn run(mut self, endpoint: Endpoint) {
        let tls = transport::tls_connector();
        let mut backoff = Backoff::new(
            Duration::from_millis(self.cfg.backoff_min_ms),
            Duration::from_millis(self.cfg.backoff_max_ms),
        );
        let mut last_warn: Option<Instant> = None;
        loop {
            match tokio::time::timeout(self.cfg.connect_timeout(), transport::connect(&endpoint, &tls)).await {
                Ok(Ok(stream)) => {
                    info!("uplink: connected to {}", self.cfg.endpoint);
                    let since = Instant::now();
                    match self.session(stream).await {
                        Ok(()) => {
                            debug!("uplink: no reporters left, worker exiting");
                            return;
                        }
                        Err(e) => warn!("uplink: link lost after {:?}: {:#}", since.elapsed(), e),
                    }
                    backoff.reset();
                }
                Ok(Err(e)) => {
                    if last_warn.map_or(true, |t| t.elapsed() >= WARN_EVERY) {
                        warn!("uplink: connect failed: {:#} ({} buffered)", e, self.buffer.len());
                        last_warn = Some(Instant::now());
                    }
                }
                Err(_) => warn!("uplink: connect to {} timed out", self.cfg.endpoint),
            }
            let wait = backoff.next_delay();
            debug!("uplink: reconnect in {:?}", wait);
            if !self.absorb_until(Instant::now() + wait).await {
                return;
            }
        }
    }

    /// Buffers reports while waiting out a backoff. False once every
    /// reporter is gone.
    async fn absorb_until(&mut self, until: Instant) -> bool {
        let deadline = tokio::time::Instant::from_std(until);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                p = self.outbound.recv() => match p {
                    Some(p) => self.enqueue(p),
                    None => return false,
                },
            }
        }
    }

    /// One connected period. Returns Ok when the worker should stop and
    /// Err when the link was lost.
    async fn session<S>(&mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut rd, mut wr) = tokio::io::split(stream);
        let mut inbuf = BytesMut::with_capacity(8 * 1024);
        let mut live = Liveness::new(self.cfg.loss_window(), Instant::now());
        let mut hb = tokio::time::interval(self.cfg.heartbeat_interval());
        hb.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_status(LinkStatus::Up);
        if !self.buffer.is_empty() {
            info!("uplink: draining {} buffered record(s)", self.buffer.len());
        }

        let res = loop {
            // Backlog first, so new traffic always lands behind it.
            if let Err(e) = self.drain(&mut wr).await {
                break Err(e);
            }
            let deadline = tokio::time::Instant::from_std(live.deadline());
            tokio::select! {
                r = rd.read_buf(&mut inbuf) => match r {
                    Ok(0) => break Err(anyhow::anyhow!("closed by remote")),
                    Ok(_) => {
                        live.on_inbound(Instant::now());
                        self.handle_input(&mut inbuf);
                    }
                    Err(e) => break Err(anyhow::Error::new(e).context("read")),
                },
                p = self.outbound.recv() => match p {
                    Some(p) => self.enqueue(p),
                    None => break Ok(()),
                },
                _ = hb.tick() => self.enqueue(Pending::now(RecordBody::Heartbeat)),
                _ = tokio::time::sleep_until(deadline) => {
                    break Err(anyhow::anyhow!("no inbound traffic for {:?}", self.cfg.loss_window()));
                }
            }
        };
        self.set_status(LinkStatus::Down);
        res
    }

    async fn drain<W: AsyncWrite + Unpin>(&mut self, wr: &mut W) -> Result<()> {
        self.buffer.prune(Instant::now());
        if self.buffer.is_empty() {
            return Ok(());
        }
        let limit = self.cfg.loss_window();
        while let Some(rec) = self.buffer.front() {
            match rec.to_line() {
                Ok(line) => {
                    tokio::time::timeout(limit, wr.write_all(&line)).await.context("write timed out")?.context("write")?;
                }
                Err(e) => warn!("uplink: dropping unencodable {} record: {}", rec.body.kind(), e),
            }
            self.buffer.pop_front();
        }
        tokio::time::timeout(limit, wr.flush()).await.context("flush timed out")?.context("flush")?;
        Ok(())
    }

    fn enqueue(&mut self, p: Pending) {
        self.seq += 1;
        let rec = OutboundRecord::new(&self.vehicle_id, self.seq, p.ts_unix_ms, p.body);
        let evicted = self.buffer.push(rec, Instant::now());
        if evicted > 0 && self.last_drop_warn.map_or(true, |t| t.elapsed() >= WARN_EVERY) {
            warn!("uplink: buffer bound hit, {} record(s) dropped so far", self.buffer.dropped());
            self.last_drop_warn = Some(Instant::now());
        }
    }

    fn set_status(&self, s: LinkStatus) {
        self.status.send_if_modified(|cur| {
            if *cur == s {
                return false;
            }
            *cur = s;
            true
        });
    }

    fn handle_input(&mut self, buf: &mut BytesMut) {
        while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            let line = buf.split_to(pos + 1);
            let mut end = pos;
            if end > 0 && line[end - 1] == b'\r' {
                end -= 1;
            }
            if end > 0 {
                self.handle_line(&line[..end]);
            }
        }
        if buf.len() > MAX_LINE {
            warn!("uplink: inbound line exceeds {} bytes, discarded", MAX_LINE);
            buf.clear();
            self.enqueue(Pending::now(RecordBody::rejection("oversized", format!("line longer than {} bytes", MAX_LINE))));
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        let env = match parse_inbound(line) {
            Ok(env) => env,
            Err(e) => {
                warn!("uplink: rejected inbound message: {}", e);
                self.enqueue(Pending::now(RecordBody::rejection(e.reason(), e.to_string())));
                return;
            }
        };
        debug!("uplink: inbound {}", env.body.kind());
        let d = match env.body {
            InboundBody::Heartbeat => return,
            InboundBody::MissionSegment(seg) => Directive::Segment(seg),
            InboundBody::Recall => Directive::Recall,
            InboundBody::Abort => Directive::Abort,
            InboundBody::ConfigUpdate(upd) => Directive::ConfigUpdate(upd),
        };
        if self.inbound.send(d).is_err() {
            debug!("uplink: manager gone, directive dropped");
        }
    }
}
