//! # Live Bridge Smoke Test
//!
//! Drives a running `bridge_server` (or any host exposing the bridge
//! endpoints) end to end: probe, send a known frame through the producer,
//! read it back through the preview route, then check the update-by-reference
//! leg landed.
//!
//! ```bash
//! cargo run --bin bridge_server &
//! cargo run --bin test_bridge_live -- --server-url http://127.0.0.1:8188
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use anyhow::{Context, Result, ensure};
use clap::Parser;
use image::{DynamicImage, Rgb, RgbImage};
use lib_bridge::producer::{CameraViewSender, ProducerSettings, SecondaryOutcome};

#[derive(Parser, Debug)]
#[command(version, about = "Smoke-test a running bridge server")]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8188")]
    server_url: String,

    #[arg(long, default_value = "smoke_test")]
    node_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    println!("--- Starting bridge smoke test against {} ---", args.server_url);

    // --- TEST 1: Probe ---
    println!("\n[Test 1] Probing /system_stats...");
    let sender = CameraViewSender::new(ProducerSettings {
        server_url: args.server_url.clone(),
        node_id: args.node_id.clone(),
        ..Default::default()
    })?;
    sender.connect().await.context("probe failed")?;
    println!("✅ Connected");

    // --- TEST 2: Primary + secondary send ---
    println!("\n[Test 2] Sending a 48x32 red frame...");
    let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(48, 32, Rgb([255, 0, 0])));
    let receipt = sender.send_frame(&frame).await.context("primary send failed")?;
    println!("✅ Primary accepted ({} bytes)", receipt.bytes_sent);
    match receipt.secondary.await? {
        SecondaryOutcome::Updated { image_path } => println!("✅ Secondary updated via {image_path}"),
        other => println!("⚠️  Secondary did not complete: {other:?}"),
    }

    // --- TEST 3: Read back ---
    println!("\n[Test 3] Reading the stored image back...");
    let url = format!("{}/blender/preview/{}", args.server_url.trim_end_matches('/'), args.node_id);
    let bytes = reqwest::get(&url).await?.error_for_status()?.bytes().await?;
    let back = image::load_from_memory(&bytes)?.to_rgb8();
    ensure!(back.dimensions() == (48, 32), "unexpected size {:?}", back.dimensions());
    ensure!(back.get_pixel(0, 0).0 == [255, 0, 0], "unexpected pixel {:?}", back.get_pixel(0, 0));
    println!("✅ Read back 48x32 red");

    // --- TEST 4: Missing fields are rejected ---
    println!("\n[Test 4] Posting an incomplete body...");
    let status = reqwest::Client::new()
        .post(format!("{}/blender/receive_image", args.server_url.trim_end_matches('/')))
        .json(&serde_json::json!({ "node_id": args.node_id }))
        .send()
        .await?
        .status();
    ensure!(status == reqwest::StatusCode::BAD_REQUEST, "expected 400, got {status}");
    println!("✅ Rejected with 400");

    println!("\n--- All bridge smoke tests passed ---");
    Ok(())
}
