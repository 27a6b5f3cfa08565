//! # Consumer Pull
//!
//! The node-graph step that hands the latest image for a node key to the
//! graph. Its real input is the [`ImageStore`], which changes behind the
//! host's back, not the declared `node_id` parameter. A host that memoizes
//! steps by comparing inputs would otherwise keep replaying a stale output.
//!
//! The step therefore declares itself non-memoizable
//! ([`CameraInputNode::MEMOIZABLE`]) and its change check returns a
//! [`ChangeToken`] that never compares equal, not even to itself. Hosts that
//! want explicit freshness can compare [`ChangeToken::store_version`]
//! instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::info;

use super::image::{Image, ImageError, ImageTensor};
use super::image_store::ImageStore;

/// Edge length of the black placeholder returned when nothing is available.
pub const DEFAULT_PLACEHOLDER_SIZE: u32 = 512;

/// Result of a change check.
///
/// Equality is deliberately never true, the same way a NaN never equals
/// itself, so memoize-by-equality hosts always re-run the step.
#[derive(Debug, Clone, Copy)]
pub struct ChangeToken {
    /// Store-wide version at the time of the check.
    pub store_version: u64,
    /// Unique per check.
    pub invocation: u64,
}

impl PartialEq for ChangeToken {
    fn eq(&self, _other: &Self) -> bool {
        false
    }
}

/// Where the pulled image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullSource {
    Store { version: u64 },
    Fallback,
    Placeholder,
}

#[derive(Debug, Clone)]
pub struct PullOutput {
    /// `[1, height, width, 3]`, samples in `0.0..=1.0`.
    pub image: ImageTensor,
    pub source: PullSource,
}

/// # Blender Camera Input
///
/// Reads the image for a node key from the injected store, falling back to
/// a caller-supplied image and finally to a black placeholder.
#[derive(Debug)]
pub struct CameraInputNode {
    store: Arc<ImageStore>,
    placeholder_size: (u32, u32),
    checks: AtomicU64,
}

impl CameraInputNode {
    pub const TYPE_NAME: &'static str = "BlenderCameraInput";
    pub const DISPLAY_NAME: &'static str = "Blender Camera Input";
    pub const CATEGORY: &'static str = "blender";
    /// The output depends on external state; never cache it by input.
    pub const MEMOIZABLE: bool = false;

    pub fn new(store: Arc<ImageStore>) -> Self {
        Self {
            store,
            placeholder_size: (DEFAULT_PLACEHOLDER_SIZE, DEFAULT_PLACEHOLDER_SIZE),
            checks: AtomicU64::new(0),
        }
    }

    pub fn with_placeholder_size(mut self, width: u32, height: u32) -> Self {
        self.placeholder_size = (width, height);
        self
    }

    pub fn store(&self) -> &Arc<ImageStore> {
        &self.store
    }

    /// Change check called by the host before deciding whether to execute.
    pub fn is_changed(&self, _node_id: &str) -> ChangeToken {
        ChangeToken {
            store_version: self.store.version(),
            invocation: self.checks.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Picks the image for `node_id` without converting it to a tensor.
    pub fn resolve(
        &self,
        node_id: &str,
        fallback: Option<&ImageTensor>,
    ) -> Result<(Arc<Image>, PullSource), ImageError> {
        if !node_id.is_empty() {
            if let Some(stored) = self.store.get(node_id) {
                return Ok((stored.image, PullSource::Store { version: stored.version }));
            }
        }
        if let Some(tensor) = fallback {
            return Ok((Arc::new(tensor.to_image()?), PullSource::Fallback));
        }
        let (width, height) = self.placeholder_size;
        Ok((Arc::new(Image::blank(width, height)), PullSource::Placeholder))
    }

    /// Executes the step.
    pub fn process(
        &self,
        node_id: &str,
        fallback: Option<&ImageTensor>,
    ) -> Result<PullOutput, ImageError> {
        let (image, source) = self.resolve(node_id, fallback)?;
        info!(
            node_id = %node_id,
            width = image.width(),
            height = image.height(),
            has_fallback = fallback.is_some(),
            source = ?source,
            "process"
        );
        Ok(PullOutput {
            image: image.to_tensor(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> CameraInputNode {
        CameraInputNode::new(Arc::new(ImageStore::new()))
    }

    #[test]
    fn test_unknown_key_without_fallback_is_black_placeholder() {
        let out = node().process("nobody", None).unwrap();
        assert_eq!(out.source, PullSource::Placeholder);
        assert_eq!(out.image.shape(), [1, 512, 512, 3]);
        assert!(out.image.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_unknown_key_uses_normalized_fallback() {
        // 2x1 RGBA fallback
        let fallback = ImageTensor::new([1, 1, 2, 4], vec![1.0, 0.0, 0.0, 0.5, 0.0, 0.0, 1.0, 1.0]).unwrap();
        let out = node().process("n1", Some(&fallback)).unwrap();
        assert_eq!(out.source, PullSource::Fallback);
        assert_eq!(out.image.shape(), [1, 1, 2, 3]);
        assert_eq!(out.image.data(), &[1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_store_wins_over_fallback() {
        let node = node();
        let version = node.store().put("n1", Image::solid(3, 2, [255, 255, 255]));
        let fallback = Image::blank(8, 8).to_tensor();

        let out = node.process("n1", Some(&fallback)).unwrap();
        assert_eq!(out.source, PullSource::Store { version });
        assert_eq!(out.image.shape(), [1, 2, 3, 3]);
        assert!(out.image.data().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_pull_sees_latest_write() {
        let node = node();
        node.store().put("n1", Image::solid(64, 64, [255, 0, 0]));
        node.store().put("n1", Image::solid(32, 32, [0, 0, 255]));

        let (image, _) = node.resolve("n1", None).unwrap();
        assert_eq!(image.dimensions(), (32, 32));
        assert_eq!(image.pixels().get_pixel(31, 31).0, [0, 0, 255]);
    }

    #[test]
    fn test_change_tokens_never_compare_equal() {
        let node = node();
        let first = node.is_changed("n1");
        let second = node.is_changed("n1");

        assert_eq!(first.store_version, second.store_version);
        assert_ne!(first.invocation, second.invocation);
        assert!(first != second);
        let copy = first;
        assert!(first != copy);
        assert!(!CameraInputNode::MEMOIZABLE);
    }

    #[test]
    fn test_custom_placeholder_size() {
        let node = node().with_placeholder_size(16, 8);
        let out = node.process("", None).unwrap();
        assert_eq!(out.image.shape(), [1, 8, 16, 3]);
    }
}
