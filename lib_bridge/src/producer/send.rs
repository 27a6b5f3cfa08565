//! # Camera View Sender
//!
//! The producer's send path. A send has two independent legs:
//!
//! 1. **Primary** (mandatory): the encoded frame goes to the receive
//!    endpoint as base64 JSON. Its outcome is the `Result` of
//!    [`CameraViewSender::send_frame`].
//! 2. **Secondary** (best effort): the same bytes are uploaded as an asset
//!    and the update endpoint is pointed at the stored name. It runs as a
//!    spawned task whose handle is returned in the [`SendReceipt`]. Its
//!    failures are logged at debug level and never turn a successful send
//!    into an error.
//!
//! Nothing is retried.

use std::sync::atomic::{AtomicBool, Ordering};

use ::image::DynamicImage;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::{BridgeClient, ClientError};
use super::frame::{FrameError, FrameSource};
use crate::relay::image::{ImageError, WireFormat, encode_wire};

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8188";
pub const DEFAULT_QUALITY: u8 = 95;

/// Producer-side settings, as the 3D tool stores them per scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub server_url: String,
    pub node_id: String,
    pub send_on_render: bool,
    /// 1 to 100; only used for JPEG.
    pub image_quality: u8,
    pub format: WireFormat,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            node_id: String::new(),
            send_on_render: false,
            image_quality: DEFAULT_QUALITY,
            format: WireFormat::Png,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("not connected to {0}")]
    NotConnected(String),

    #[error("node id is empty")]
    MissingNodeId,

    #[error("capture failed: {0}")]
    Capture(#[from] FrameError),

    #[error("encode failed: {0}")]
    Encode(#[from] ImageError),

    #[error("transmission failed: {0}")]
    Client(#[from] ClientError),
}

/// How the best-effort leg ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryOutcome {
    Updated { image_path: String },
    UploadFailed(String),
    UpdateFailed { image_path: String, reason: String },
}

impl SecondaryOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, SecondaryOutcome::Updated { .. })
    }
}

/// Result of a successful primary transmission.
#[derive(Debug)]
pub struct SendReceipt {
    pub node_id: String,
    /// Size of the encoded raster before base64.
    pub bytes_sent: usize,
    /// Await to observe the secondary leg, or drop to let it run detached.
    pub secondary: JoinHandle<SecondaryOutcome>,
}

#[derive(Debug)]
pub struct CameraViewSender {
    client: BridgeClient,
    settings: ProducerSettings,
    connected: AtomicBool,
}

impl CameraViewSender {
    pub fn new(settings: ProducerSettings) -> Result<Self, SendError> {
        let client = BridgeClient::new(&settings.server_url)?;
        Ok(Self::with_client(client, settings))
    }

    pub fn with_client(client: BridgeClient, settings: ProducerSettings) -> Self {
        Self {
            client,
            settings,
            connected: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &ProducerSettings {
        &self.settings
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Probes the server and records the result as the connection state.
    pub async fn connect(&self) -> Result<(), SendError> {
        match self.client.system_stats().await {
            Ok(_) => {
                self.connected.store(true, Ordering::Relaxed);
                info!(server = %self.client.base_url(), "connected");
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::Relaxed);
                warn!(server = %self.client.base_url(), error = %e, "connection probe failed");
                Err(e.into())
            }
        }
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        debug!(server = %self.client.base_url(), "disconnected");
    }

    /// Captures from `source` and sends.
    pub async fn send_camera_view(&self, source: &dyn FrameSource) -> Result<SendReceipt, SendError> {
        self.check_ready()?;
        let frame = source.capture()?;
        self.send_frame(&frame).await
    }

    /// Sends an already captured frame.
    pub async fn send_frame(&self, frame: &DynamicImage) -> Result<SendReceipt, SendError> {
        let node_id = self.check_ready()?;
        let format = self.settings.format;
        let bytes = encode_wire(frame, format, self.settings.image_quality)?;
        let encoded = STANDARD.encode(&bytes);

        self.client.receive_image(&node_id, encoded, format).await?;
        info!(
            node_id = %node_id,
            width = frame.width(),
            height = frame.height(),
            bytes = bytes.len(),
            format = %format,
            "camera view sent"
        );

        let bytes_sent = bytes.len();
        let secondary = tokio::spawn(run_secondary(self.client.clone(), node_id.clone(), bytes, format));
        Ok(SendReceipt {
            node_id,
            bytes_sent,
            secondary,
        })
    }

    fn check_ready(&self) -> Result<String, SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected(self.client.base_url().to_string()));
        }
        // Keys are opaque; whitespace is part of the key.
        if self.settings.node_id.is_empty() {
            return Err(SendError::MissingNodeId);
        }
        Ok(self.settings.node_id.clone())
    }
}

async fn run_secondary(client: BridgeClient, node_id: String, bytes: Vec<u8>, format: WireFormat) -> SecondaryOutcome {
    let uploaded = match client.upload_image(bytes, format).await {
        Ok(uploaded) => uploaded,
        Err(e) => {
            debug!(node_id = %node_id, error = %e, "asset upload skipped");
            return SecondaryOutcome::UploadFailed(e.to_string());
        }
    };

    let mut image_path = if uploaded.subfolder.is_empty() {
        uploaded.name
    } else {
        format!("{}/{}", uploaded.subfolder, uploaded.name)
    };
    if !uploaded.kind.is_empty() && uploaded.kind != "input" {
        image_path = format!("{image_path} [{}]", uploaded.kind);
    }
    match client.update_image(&node_id, &image_path).await {
        Ok(_) => {
            debug!(node_id = %node_id, image_path = %image_path, "image updated by reference");
            SecondaryOutcome::Updated { image_path }
        }
        Err(e) => {
            debug!(node_id = %node_id, image_path = %image_path, error = %e, "update by reference failed");
            SecondaryOutcome::UpdateFailed {
                image_path,
                reason: e.to_string(),
            }
        }
    }
}
