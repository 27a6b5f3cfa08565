//! Host surface for running the consumer stand-alone: the liveness probe
//! the producer connects with, the asset upload used by the secondary send
//! branch, and a PNG preview of what the pull step would produce.

use std::time::Duration;

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::BridgeState;
use super::error::BridgeError;
use crate::assets::{AssetRoot, UploadedAsset};
use crate::relay::image::WireFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeInfo {
    /// Keys currently holding an image.
    pub slots: usize,
    pub store_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStats {
    pub system: SystemInfo,
    pub bridge: BridgeInfo,
}

/// `GET /system_stats`
pub async fn system_stats(State(state): State<BridgeState>) -> Json<SystemStats> {
    let uptime: Duration = state.started_at.elapsed();
    Json(SystemStats {
        system: SystemInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: uptime.as_secs(),
        },
        bridge: BridgeInfo {
            slots: state.store.len(),
            store_version: state.store.version(),
        },
    })
}

/// `POST /upload/image`
///
/// Fields: `image` (file, required), `subfolder`, `type` (`input` or
/// `temp`, default input) and `overwrite` (`true`/`1`).
pub async fn upload_image(
    State(state): State<BridgeState>,
    mut multipart: Multipart,
) -> Result<Json<UploadedAsset>, BridgeError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut subfolder = String::new();
    let mut root = AssetRoot::Input;
    let mut overwrite = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("image.png").to_string();
                let bytes = field.bytes().await?;
                file = Some((file_name, bytes.to_vec()));
            }
            "subfolder" | "type" | "overwrite" => {
                let value = field.text().await?;
                match name.as_str() {
                    "subfolder" => subfolder = value,
                    "type" => {
                        root = match AssetRoot::parse(&value) {
                            Some(AssetRoot::Output) | None => {
                                return Err(BridgeError::InvalidBody(format!("invalid upload type: {value}")));
                            }
                            Some(root) => root,
                        }
                    }
                    _ => overwrite = matches!(value.trim(), "true" | "1"),
                }
            }
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }

    let (file_name, bytes) = file.ok_or(BridgeError::MissingParameters(vec!["image"]))?;
    let size = bytes.len();
    let assets = state.assets.clone();
    let saved = tokio::task::spawn_blocking(move || {
        assets.save_upload(root, &subfolder, &file_name, &bytes, overwrite)
    })
    .await??;

    info!(name = %saved.name, subfolder = %saved.subfolder, root = %saved.root, size, "upload stored");
    Ok(Json(saved))
}

/// `GET /blender/preview/{node_id}`
///
/// PNG of the image the pull step would return right now, placeholder included.
pub async fn preview_image(
    State(state): State<BridgeState>,
    Path(node_id): Path<String>,
) -> Result<impl IntoResponse, BridgeError> {
    let (image, source) = state.node.resolve(&node_id, None)?;
    let png = tokio::task::spawn_blocking(move || image.encode(WireFormat::Png, 100)).await??;
    debug!(node_id = %node_id, source = ?source, bytes = png.len(), "preview");
    Ok(([(header::CONTENT_TYPE, WireFormat::Png.mime())], png))
}
