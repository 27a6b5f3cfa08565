//! # Bridge Error
//!
//! Every failure a bridge endpoint can produce, and its HTTP mapping.
//! Client mistakes are 400, everything that happens after the request was
//! accepted as well-formed is 500. Extractor rejections keep axum's status
//! (413 for an oversized body). Bodies are always `{"error": "..."}`.

use axum::{
    Json,
    extract::multipart::MultipartError,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use crate::assets::AssetError;
use crate::relay::image::ImageError;
use crate::wire::ErrorResponse;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// The body is not a JSON object of the expected shape.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    #[error("invalid base64 image data: {0}")]
    Payload(#[from] base64::DecodeError),

    #[error("{0}")]
    Image(#[from] ImageError),

    #[error("failed to load image: {0}")]
    Load(String),

    #[error("{0}")]
    Asset(#[from] AssetError),

    /// An extractor rejected the body (too large, malformed multipart).
    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn status(&self) -> StatusCode {
        match self {
            BridgeError::InvalidBody(_) | BridgeError::MissingParameters(_) => StatusCode::BAD_REQUEST,
            BridgeError::Asset(AssetError::InvalidName(_) | AssetError::OutsideRoot(_) | AssetError::Empty) => {
                StatusCode::BAD_REQUEST
            }
            BridgeError::Rejected { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        warn!(status = status.as_u16(), error = %self, "request failed");
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<BytesRejection> for BridgeError {
    fn from(rejection: BytesRejection) -> Self {
        BridgeError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for BridgeError {
    fn from(e: MultipartError) -> Self {
        BridgeError::Rejected {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(e: tokio::task::JoinError) -> Self {
        BridgeError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BridgeError::MissingParameters(vec!["node_id"]).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BridgeError::Load("gone".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            BridgeError::Asset(AssetError::OutsideRoot("../x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BridgeError::Image(ImageError::UnsupportedFormat("tga".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rejection_keeps_status() {
        let e = BridgeError::Rejected {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".into(),
        };
        assert_eq!(e.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(e.to_string(), "length limit exceeded");
    }

    #[test]
    fn test_messages() {
        let e = BridgeError::MissingParameters(vec!["node_id", "image_data"]);
        assert_eq!(e.to_string(), "missing required parameters: node_id, image_data");
        assert_eq!(BridgeError::Load("x".into()).to_string(), "failed to load image: x");
    }
}
