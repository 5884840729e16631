use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use sentinel_avoid::{doctor as avoid_doctor, AvoidConfig};
use sentinel_capture::{doctor as capture_doctor, CaptureConfig};
use sentinel_fc::transport::{AutopilotTransport, MavlinkTransport};
use sentinel_fc::{doctor as fc_doctor, probe, FcConfig};
use sentinel_nav::executor::MissionConfig;
use sentinel_nav::geofence::{Geofence, GeofenceConfig};
use sentinel_nav::doctor as nav_doctor;
use sentinel_proto::mission::MissionSegment;
use sentinel_proto::runtime::RuntimeConfig;
use sentinel_uplink::{doctor as uplink_doctor, UplinkConfig};

mod run;

#[derive(Debug, Parser)]
#[command(name = "sentinel", version, about = "Sentinel - edge autonomy core for survey drones")]
struct Cli {
    #[arg(long)]
    config: String,

    /// Used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config file.
    Doctor,
    Run,
    Fc { #[command(subcommand)] cmd: FcCmd },
    Segment { #[command(subcommand)] cmd: SegmentCmd },
}

#[derive(Debug, Subcommand)]
enum FcCmd {
    /// Send a heartbeat and wait for the autopilot's.
    Probe,
}

#[derive(Debug, Subcommand)]
enum SegmentCmd {
    /// Run a mission segment JSON file through the geofence checks.
    Check { file: String },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    vehicle_id: String,
    #[serde(default = "default_telemetry_hz")]
    telemetry_hz: f32,

    fc: FcConfig,
    uplink: UplinkConfig,
    #[serde(default)]
    mission: MissionConfig,
    geofence: GeofenceConfig,
    #[serde(default)]
    avoid: AvoidConfig,

    capture: Option<CaptureConfig>,
}

fn default_telemetry_hz() -> f32 { 1.0 }

impl Config {
    /// Starting point for the tunables the remote side may later change.
    fn initial_runtime(&self) -> Result<RuntimeConfig> {
        let capture_s = self.capture.as_ref().map(|c| c.interval_s).unwrap_or(5.0);
        anyhow::ensure!((0.5..=600.0).contains(&capture_s), "capture.interval_s should be 0.5..600");
        let rc = RuntimeConfig {
            telemetry_hz: self.telemetry_hz,
            capture_interval: Duration::from_secs_f32(capture_s),
            hold_timeout: Duration::from_secs(self.mission.hold_timeout_s),
            return_timeout: Duration::from_secs(self.mission.return_timeout_s),
        };
        rc.validate().context("runtime config")?;
        Ok(rc)
    }
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    parse_config(&s)
}

fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run::run(cfg).await?,
        Command::Fc { cmd } => fc_cmd(&cfg, cmd).await?,
        Command::Segment { cmd } => segment_cmd(&cfg, cmd)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    anyhow::ensure!(!cfg.vehicle_id.is_empty(), "vehicle_id missing");
    nav_doctor::check_geofence(&cfg.geofence)?;
    nav_doctor::check_mission(&cfg.mission)?;
    fc_doctor::check_fc(&cfg.fc)?;
    uplink_doctor::check_uplink(&cfg.uplink)?;
    avoid_doctor::check_avoid(&cfg.avoid)?;
    if let Some(cap) = &cfg.capture {
        capture_doctor::check_capture(cap)?;
    }
    cfg.initial_runtime()?;

    info!("doctor: OK");
    Ok(())
}

async fn fc_cmd(cfg: &Config, cmd: FcCmd) -> Result<()> {
    match cmd {
        FcCmd::Probe => {
            anyhow::ensure!(cfg.fc.enable, "fc.enable=false");
            let url = cfg.fc.connection_url()?;
            let transport: Arc<dyn AutopilotTransport> = Arc::new(MavlinkTransport::open(&url)?);
            let fc = cfg.fc.clone();
            let timeout = fc.probe_timeout();
            let p = tokio::task::spawn_blocking(move || probe::probe(&fc, transport, timeout))
                .await
                .context("join probe task")?;
            println!(
                "probe dev={} hb={} frames={} corrupt={} {}ms note={}",
                url, p.hb_seen, p.frames, p.corrupt, p.elapsed_ms, p.note
            );
            anyhow::ensure!(p.hb_seen, "no autopilot heartbeat on {}", url);
            Ok(())
        }
    }
}

fn segment_cmd(cfg: &Config, cmd: SegmentCmd) -> Result<()> {
    match cmd {
        SegmentCmd::Check { file } => {
            let s = std::fs::read_to_string(&file).with_context(|| format!("read {}", file))?;
            let seg: MissionSegment = serde_json::from_str(&s).context("parse segment json")?;
            let fence = Geofence::new(cfg.geofence.clone());
            match fence.validate_segment(&seg) {
                Ok(()) => {
                    println!("segment {}: OK ({} waypoints)", seg.segment_id, seg.waypoints.len());
                    Ok(())
                }
                Err(e) => anyhow::bail!("segment {} rejected ({}): {}", seg.segment_id, e.reason(), e),
            }
        }
    }
}
