//! main.rs — GPS fix-feed simulator entry point
//!
//! Drives one loop: advance the traversal physics at the configured fix
//! rate, gate the output through the active fault scenario, and send the
//! resulting envelope (or fault) to the backend's UDP fix feed.
//!
//! The suggested A/B endpoints of the simulated track are logged at startup
//! so the operator can paste them into `set-a`/`set-b` commands.

mod scenarios;
mod udp_tx;
mod walk_sim;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tokio::time::interval;
use tracing::{info, warn};

use guidance_types::{FaultEnvelope, FaultKind, FeedMessage};

use scenarios::ScenarioConfig;
use udp_tx::FixTransmitter;
use walk_sim::{WalkConfig, WalkSim};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "gps-sim", about = "StraightBar GPS fix-feed simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// UDP address of the backend fix feed
    #[arg(long, default_value = "127.0.0.1:47555")]
    hub_addr: String,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long, default_value = "1.0")]
    speed: f64,
    /// Fault scenario preset: dropout | no-fix | denied | low-accuracy | no-motion
    #[arg(long)]
    preset: Option<String>,
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct FullConfig {
    walk: WalkConfig,
    feed: FeedConfig,
}

#[derive(Debug, serde::Deserialize)]
struct FeedConfig {
    fix_rate_hz: f64,
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gps_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_str = std::fs::read_to_string(&args.config)
        .unwrap_or_else(|_| include_str!("../config.toml").to_string());
    let cfg: FullConfig = toml::from_str(&config_str).expect("Invalid config.toml");

    let scenario = match &args.preset {
        Some(name) => match scenarios::preset(name) {
            Some(sc) => {
                info!("🎭 Scenario preset '{name}' active");
                sc
            }
            None => {
                warn!("Unknown preset '{name}', running clean");
                ScenarioConfig::default()
            }
        },
        None => ScenarioConfig::default(),
    };

    let mut sim = WalkSim::new(&cfg.walk);
    let (a, b) = (sim.point_a(), sim.point_b());
    info!(
        "🚜 GPS simulator starting — {:.0} m track at {:.1} m/s, {} Hz fixes",
        cfg.walk.track_length_m, cfg.walk.speed_mps, cfg.feed.fix_rate_hz
    );
    info!(
        "AB track: A=({:.6}, {:.6})  B=({:.6}, {:.6})",
        a.lat, a.lon, b.lat, b.lon
    );

    let tx = FixTransmitter::new(&args.hub_addr).expect("Failed to bind UDP socket");

    let epoch_ms_duration = (1000.0 / cfg.feed.fix_rate_hz) as u64;
    let mut ticker = interval(Duration::from_millis(epoch_ms_duration));
    let mut epoch: u32 = 0;

    loop {
        ticker.tick().await;

        let dt = (epoch_ms_duration as f64 / 1000.0) * args.speed;
        sim.tick(dt);

        if scenario.denies_at(epoch) {
            tx.send(&FeedMessage::Fault(FaultEnvelope {
                kind: FaultKind::PermissionDenied,
                message: "location access refused by device".into(),
            }));
            epoch += 1;
            continue;
        }

        if scenario.is_dropped(epoch) {
            // Dead air — the backend watchdog has to notice on its own
            epoch += 1;
            continue;
        }

        if scenario.is_no_fix(epoch) {
            tx.send(&FeedMessage::Fault(FaultEnvelope {
                kind: FaultKind::PositionUnavailable,
                message: "no satellite lock".into(),
            }));
            epoch += 1;
            continue;
        }

        let env = sim.envelope(now_ms(), scenario.accuracy_factor(), scenario.include_motion());
        tx.send(&FeedMessage::Fix(env));

        if epoch % 20 == 0 {
            info!(
                "⏱ epoch={} | along={:.1} m | cross={:+.2} m",
                epoch,
                sim.along_m(),
                sim.cross_m()
            );
        }
        epoch += 1;
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
