//! Receive and update-by-reference handlers.
//!
//! Both handlers validate the body before doing any work, decode off the
//! async workers, and only touch the store once a complete image exists.
//! Every error path leaves the store as it was.

use axum::{Json, body::Bytes, extract::State, extract::rejection::BytesRejection};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::BridgeState;
use super::error::BridgeError;
use crate::relay::image::Image;
use crate::relay::log_timestamp;
use crate::wire::{ReceiveImageRequest, StatusResponse, UpdateImageRequest};

/// Parses a JSON object body. Anything else (no body, an array, a string)
/// is a client error.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, BridgeError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| BridgeError::InvalidBody(e.to_string()))?;
    if !value.is_object() {
        return Err(BridgeError::InvalidBody("expected a JSON object".to_string()));
    }
    serde_json::from_value(value).map_err(|e| BridgeError::InvalidBody(e.to_string()))
}

/// `POST /blender/receive_image`
pub async fn receive_image(
    State(state): State<BridgeState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<StatusResponse>, BridgeError> {
    let request = parse_body::<ReceiveImageRequest>(&body?)?
        .validate()
        .map_err(BridgeError::MissingParameters)?;
    debug!(
        node_id = %request.node_id,
        format = %request.format,
        payload_len = request.image_data.len(),
        "receive_image"
    );

    let format = request.format;
    let data = request.image_data;
    let image = tokio::task::spawn_blocking(move || -> Result<Image, BridgeError> {
        // Line-wrapped encoders (76 columns) are accepted.
        let compact: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        let bytes = STANDARD.decode(&compact)?;
        Ok(Image::decode(&bytes, &format)?)
    })
    .await??;

    let (width, height) = image.dimensions();
    let version = state.store.put(request.node_id.clone(), image);
    info!(
        node_id = %request.node_id,
        width,
        height,
        version,
        ts = %log_timestamp(),
        "image received"
    );

    Ok(Json(StatusResponse::success(format!(
        "image received (node id: {})",
        request.node_id
    ))))
}

/// `POST /blender/update_image`
pub async fn update_image(
    State(state): State<BridgeState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<StatusResponse>, BridgeError> {
    let request = parse_body::<UpdateImageRequest>(&body?)?
        .validate()
        .map_err(BridgeError::MissingParameters)?;
    debug!(node_id = %request.node_id, image_path = %request.image_path, "update_image");

    let assets = state.assets.clone();
    let reference = request.image_path.clone();
    let image = tokio::task::spawn_blocking(move || -> Result<Image, BridgeError> {
        let path = assets
            .resolve(&reference)
            .map_err(|e| BridgeError::Load(e.to_string()))?;
        Image::open(&path).map_err(|e| BridgeError::Load(e.to_string()))
    })
    .await??;

    let (width, height) = image.dimensions();
    let version = state.store.put(request.node_id.clone(), image);
    info!(
        node_id = %request.node_id,
        image_path = %request.image_path,
        width,
        height,
        version,
        ts = %log_timestamp(),
        "image updated"
    );

    Ok(Json(StatusResponse::success(format!(
        "image updated (node id: {})",
        request.node_id
    ))))
}
