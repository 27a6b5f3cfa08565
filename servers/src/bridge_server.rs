//! # Bridge Server
//!
//! Stand-alone consumer process for the camera view bridge. It keeps the
//! latest image per node key in memory and exposes:
//!
//! - `POST /blender/receive_image`: base64 image in, stored under `node_id`.
//! - `POST /blender/update_image`: stores an uploaded asset under `node_id`.
//! - `POST /upload/image`: multipart asset upload.
//! - `GET /system_stats`: liveness probe used by the producer to connect.
//! - `GET /blender/preview/{node_id}`: PNG of what the pull step returns now.
//!
//! Configuration is layered: defaults, `bridge_server.conf` (JSON), then
//! `BRIDGE_*` environment variables and CLI flags. A `.env` file is loaded
//! first if present.

mod bridge_logic;

use anyhow::{Context, Result};
use clap::Parser;
use lib_bridge::configs::{ServerArgs, load_config};
use lib_bridge::endpoints::router;
use lib_bridge::loggers::setup_logging;
use tokio::net::TcpListener;
use tracing::info;

use bridge_logic::{serve, state};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = load_config(ServerArgs::parse()).context("failed to load configuration")?;
    let _guard = setup_logging("bridge_server", &config.log_dir, &config.log_level)
        .context("failed to set up logging")?;
    info!(?config, "configuration loaded");

    let state = state::build_state(&config)?;
    let app = router(state, config.max_body_bytes());

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    serve::serve(listener, app, serve::shutdown_signal()).await?;
    info!("Shutdown complete.");
    Ok(())
}
