//! # Image Store
//!
//! The single source of truth on the consumer side: one slot per node key,
//! each holding the most recent image the store has observed for that key.
//!
//! ## Semantics
//!
//! - `put` is an unconditional full replace. There is no merge and no history.
//! - Entries live as long as the store. Nothing is evicted.
//! - Images are shared as `Arc<Image>`. A `put` swaps a pointer, so a reader
//!   holding an older `Arc` keeps a complete image and never sees a torn one.
//! - Decoding happens before `put` is called. The write lock is held only for
//!   the map insert, so concurrent receives on different keys do not wait on
//!   each other's decoding.
//!
//! ## Versions
//!
//! A store-wide counter is bumped under the write lock on every `put` and
//! recorded on the entry. Versions therefore follow the order in which the
//! store observed writes, which is the only ordering the relay promises.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::image::Image;

/// A stored slot value. Cloning is cheap: the pixels are behind an `Arc`.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image: Arc<Image>,
    /// Store-wide version assigned when this image was written.
    pub version: u64,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ImageStore {
    slots: RwLock<HashMap<String, StoredImage>>,
    version: AtomicU64,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces whatever the slot held. Returns the version assigned to the write.
    pub fn put(&self, key: impl Into<String>, image: Image) -> u64 {
        let image = Arc::new(image);
        let mut slots = self.write_slots();
        // Relaxed is enough: the write lock already orders the bump with the insert.
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        slots.insert(
            key.into(),
            StoredImage {
                image,
                version,
                stored_at: Utc::now(),
            },
        );
        version
    }

    pub fn get(&self, key: &str) -> Option<StoredImage> {
        self.read_slots().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read_slots().contains_key(key)
    }

    /// Number of keys holding an image.
    pub fn len(&self) -> usize {
        self.read_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of occupied keys.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read_slots().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Version of the latest write to any key, 0 when nothing was written yet.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }

    // A panic while holding the lock cannot leave a half-written entry behind
    // (inserts are a single move), so a poisoned lock is still safe to use.
    fn read_slots(&self) -> RwLockReadGuard<'_, HashMap<String, StoredImage>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slots(&self) -> RwLockWriteGuard<'_, HashMap<String, StoredImage>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}
