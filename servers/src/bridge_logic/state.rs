use std::sync::Arc;

use anyhow::{Context, Result};
use lib_bridge::assets::AssetStore;
use lib_bridge::configs::ServerConfig;
use lib_bridge::endpoints::BridgeState;
use lib_bridge::{CameraInputNode, ImageStore};
use tracing::info;

/// Builds the shared state: one store, read by the endpoints and the pull step.
pub fn build_state(config: &ServerConfig) -> Result<BridgeState> {
    let assets = AssetStore::new(&config.input_dir, &config.output_dir, &config.temp_dir);
    assets
        .ensure_dirs()
        .context("failed to create asset directories")?;

    let store = Arc::new(ImageStore::new());
    let node = CameraInputNode::new(store)
        .with_placeholder_size(config.placeholder_size, config.placeholder_size);

    info!(
        input_dir = %config.input_dir.display(),
        output_dir = %config.output_dir.display(),
        temp_dir = %config.temp_dir.display(),
        placeholder_size = config.placeholder_size,
        "bridge state ready"
    );
    Ok(BridgeState::with_node(Arc::new(node), assets))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_bridge::configs::ServerArgs;

    #[test]
    fn test_build_state_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::try_from(ServerArgs {
            input_dir: Some(dir.path().join("in")),
            output_dir: Some(dir.path().join("out")),
            temp_dir: Some(dir.path().join("tmp")),
            placeholder_size: Some(16),
            ..Default::default()
        })
        .unwrap();

        let state = build_state(&config).unwrap();
        assert!(dir.path().join("in").is_dir());
        assert!(dir.path().join("tmp").is_dir());
        let out = state.node.process("missing", None).unwrap();
        assert_eq!(out.image.shape(), [1, 16, 16, 3]);
        assert!(Arc::ptr_eq(&state.store, state.node.store()));
    }
}
