//! # Endpoints
//!
//! axum wiring for the consumer side. [`bridge_routes`] holds only the two
//! bridge endpoints and can be merged into a larger host's router;
//! [`router`] adds the stand-alone host surface and the body limit.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::assets::AssetStore;
use crate::relay::image_store::ImageStore;
use crate::relay::pull::CameraInputNode;
use crate::wire::{RECEIVE_IMAGE_PATH, SYSTEM_STATS_PATH, UPDATE_IMAGE_PATH, UPLOAD_IMAGE_PATH};

pub mod error;
pub mod host;
pub mod routes;

pub use error::BridgeError;

pub const PREVIEW_PATH: &str = "/blender/preview/{node_id}";

/// Shared state handed to every handler. Cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub struct BridgeState {
    pub store: Arc<ImageStore>,
    pub assets: Arc<AssetStore>,
    pub node: Arc<CameraInputNode>,
    pub started_at: Instant,
}

impl BridgeState {
    /// State around an existing store; the pull step reads the same store.
    pub fn new(store: Arc<ImageStore>, assets: AssetStore) -> Self {
        let node = Arc::new(CameraInputNode::new(Arc::clone(&store)));
        Self::with_node(node, assets)
    }

    pub fn with_node(node: Arc<CameraInputNode>, assets: AssetStore) -> Self {
        Self {
            store: Arc::clone(node.store()),
            assets: Arc::new(assets),
            node,
            started_at: Instant::now(),
        }
    }
}

/// The receive and update-by-reference endpoints.
pub fn bridge_routes() -> Router<BridgeState> {
    Router::new()
        .route(RECEIVE_IMAGE_PATH, post(routes::receive_image))
        .route(UPDATE_IMAGE_PATH, post(routes::update_image))
}

/// Full stand-alone application.
pub fn router(state: BridgeState, max_body_bytes: usize) -> Router {
    bridge_routes()
        .route(SYSTEM_STATS_PATH, get(host::system_stats))
        .route(UPLOAD_IMAGE_PATH, post(host::upload_image))
        .route(PREVIEW_PATH, get(host::preview_image))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
