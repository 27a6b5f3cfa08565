//! # `bridge-send`: push a camera view to the bridge server
//!
//! Command-line stand-in for the 3D tool's send button. It reads a rendered
//! image from disk and transmits it to a consumer under a node key.
//!
//! ## Usage
//!
//! ```bash
//! # Check that the consumer is reachable.
//! bridge-send probe
//!
//! # Send one render under node key "cam1".
//! bridge-send --node-id cam1 send render.png
//!
//! # Send as JPEG, then resend every time the render file changes.
//! bridge-send --node-id cam1 --format jpeg --quality 90 send --send-on-render render.png
//! ```
//!
//! `BRIDGE_SERVER_URL` and `BRIDGE_NODE_ID` may be set in the environment or
//! a `.env` file instead of passing flags.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_bridge::producer::send::{DEFAULT_QUALITY, DEFAULT_SERVER_URL};
use lib_bridge::producer::{CameraViewSender, FileFrameSource, ProducerSettings, RenderWatcher, SecondaryOutcome};
use lib_bridge::relay::image::WireFormat;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bridge-send", version, about = "Send a rendered camera view to the bridge server")]
struct Args {
    /// Base URL of the consumer server.
    #[arg(long, env = "BRIDGE_SERVER_URL", default_value = DEFAULT_SERVER_URL)]
    server_url: String,

    /// Node key the image is stored under.
    #[arg(long, env = "BRIDGE_NODE_ID", default_value = "")]
    node_id: String,

    /// Wire format: png or jpeg.
    #[arg(long, default_value = "png")]
    format: WireFormat,

    /// JPEG quality, 1 to 100.
    #[arg(long, default_value_t = DEFAULT_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Wait for the upload/update leg and report how it ended.
    #[arg(long)]
    wait_secondary: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the server and exit.
    Probe,
    /// Send a render output file.
    Send {
        /// Image file written by the renderer.
        path: PathBuf,

        /// Keep running and resend whenever the file changes.
        #[arg(long)]
        send_on_render: bool,

        /// Poll interval for --send-on-render, in milliseconds.
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let send_on_render = matches!(args.command, Command::Send { send_on_render: true, .. });
    let settings = ProducerSettings {
        server_url: args.server_url.clone(),
        node_id: args.node_id.clone(),
        send_on_render,
        image_quality: args.quality,
        format: args.format,
    };
    let sender = CameraViewSender::new(settings).context("invalid producer settings")?;
    sender
        .connect()
        .await
        .with_context(|| format!("server {} is not reachable", args.server_url))?;

    match args.command {
        Command::Probe => {
            info!(server = %args.server_url, "server is reachable");
        }
        Command::Send {
            path, interval_ms, ..
        } => {
            let source = FileFrameSource::new(&path);
            send_once(&sender, &source, args.wait_secondary).await?;

            if sender.settings().send_on_render {
                watch(&sender, &source, interval_ms, args.wait_secondary).await?;
            }
        }
    }
    Ok(())
}

async fn send_once(sender: &CameraViewSender, source: &FileFrameSource, wait_secondary: bool) -> Result<()> {
    let receipt = sender
        .send_camera_view(source)
        .await
        .with_context(|| format!("failed to send {}", source.path().display()))?;
    info!(node_id = %receipt.node_id, bytes = receipt.bytes_sent, "sent");

    if wait_secondary {
        match receipt.secondary.await {
            Ok(SecondaryOutcome::Updated { image_path }) => info!(%image_path, "asset updated"),
            Ok(other) => warn!(outcome = ?other, "asset update did not complete"),
            Err(e) => warn!(error = %e, "asset update task failed"),
        }
    }
    Ok(())
}

/// Resends on every new render until Ctrl+C. A failed send is logged and
/// the next render is tried again.
async fn watch(sender: &CameraViewSender, source: &FileFrameSource, interval_ms: u64, wait_secondary: bool) -> Result<()> {
    let mut watcher = RenderWatcher::new(source.path());
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(50)));
    info!(path = %source.path().display(), "watching for new renders");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("stopped watching");
                return Ok(());
            }
            _ = ticker.tick() => {
                if watcher.poll_changed() {
                    if let Err(e) = send_once(sender, source, wait_secondary).await {
                        warn!(error = %format!("{e:#}"), "send on render failed");
                    }
                }
            }
        }
    }
}
