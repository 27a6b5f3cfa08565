//! # Wire Schema
//!
//! JSON bodies exchanged between the producer and the consumer host. Both
//! sides use these types so the field names live in one place.
//!
//! Request fields are `Option` on purpose: the consumer validates presence
//! itself (and answers 400 with a readable reason) instead of letting a
//! deserializer reject the body with a generic message.

use serde::{Deserialize, Serialize};

pub const RECEIVE_IMAGE_PATH: &str = "/blender/receive_image";
pub const UPDATE_IMAGE_PATH: &str = "/blender/update_image";
pub const SYSTEM_STATS_PATH: &str = "/system_stats";
pub const UPLOAD_IMAGE_PATH: &str = "/upload/image";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiveImageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Base64 (standard alphabet) encoded raster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// A receive request whose required fields are known to be present.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiveImage {
    pub node_id: String,
    pub image_data: String,
    pub format: String,
}

impl ReceiveImageRequest {
    /// Checks field presence. On failure returns the names of the missing fields.
    pub fn validate(self) -> Result<ReceiveImage, Vec<&'static str>> {
        match (non_empty(self.node_id), non_empty(self.image_data)) {
            (Some(node_id), Some(image_data)) => Ok(ReceiveImage {
                node_id,
                image_data,
                format: non_empty(self.format)
                    .unwrap_or_else(|| crate::relay::image::DEFAULT_FORMAT.to_string()),
            }),
            (node_id, image_data) => Err(missing(&[
                ("node_id", node_id.is_none()),
                ("image_data", image_data.is_none()),
            ])),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateImageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Annotated asset reference, e.g. `blender_camera.png` or `renders/cam.png [temp]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateImage {
    pub node_id: String,
    pub image_path: String,
}

impl UpdateImageRequest {
    pub fn validate(self) -> Result<UpdateImage, Vec<&'static str>> {
        match (non_empty(self.node_id), non_empty(self.image_path)) {
            (Some(node_id), Some(image_path)) => Ok(UpdateImage { node_id, image_path }),
            (node_id, image_path) => Err(missing(&[
                ("node_id", node_id.is_none()),
                ("image_path", image_path.is_none()),
            ])),
        }
    }
}

/// Success body of the receive/update endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

/// Failure body of every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Reply of the upload endpoint. Only `name` is needed by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn missing(fields: &[(&'static str, bool)]) -> Vec<&'static str> {
    fields
        .iter()
        .filter(|(_, is_missing)| *is_missing)
        .map(|(name, _)| *name)
        .collect()
}
