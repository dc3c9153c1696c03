mod gps_feed;
mod handlers;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use guidance_core::{controller, GuidanceConfig};

use gps_feed::{FeedConfig, UdpPositionSource};

// ─── Configuration ────────────────────────────────────────────────────────────

struct ServerConfig {
    /// HTTP port for the WebSocket API (default 8080)
    http_port: u16,
    /// Initial EMA smoothing factor
    smoothing: f64,
    /// Initial presentation half-width, ± meters
    visual_range_m: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: std::env::var("STRAIGHTBAR_PORT")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(8080),
            smoothing: std::env::var("STRAIGHTBAR_SMOOTHING")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(0.5),
            visual_range_m: std::env::var("STRAIGHTBAR_RANGE_M")
                .ok().and_then(|v| v.parse().ok()).unwrap_or(15.0),
        }
    }
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "straightbar_backend=info".into()),
        )
        .init();

    info!("🛰  StraightBar backend starting...");

    let server_cfg = ServerConfig::default();
    let guidance_cfg = GuidanceConfig {
        smoothing_factor: server_cfg.smoothing,
        visual_range_m: server_cfg.visual_range_m,
        ..GuidanceConfig::default()
    };

    // One guidance session per process, fed by the UDP fix feed
    let source = Arc::new(UdpPositionSource::new(FeedConfig::default()));
    let handle = controller::spawn(guidance_cfg, source);

    // CORS — allow all origins so any UI host can connect
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(|| async { "straightbar ok" }))
        .with_state(handle)
        .layer(cors);

    let addr = format!("0.0.0.0:{}", server_cfg.http_port);
    info!("🚀 Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
