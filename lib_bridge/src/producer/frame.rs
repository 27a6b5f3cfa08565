//! Frame capture on the producer side.
//!
//! The 3D tool writes its render result to disk (or hands over an in-memory
//! buffer); a [`FrameSource`] turns that into a `DynamicImage` ready for
//! [`encode_wire`](crate::relay::image::encode_wire).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use ::image::DynamicImage;
use thiserror::Error;

use crate::relay::image::{ImageError, load_dynamic};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("render output not found: {}", .0.display())]
    Missing(PathBuf),

    #[error(transparent)]
    Image(#[from] ImageError),
}

pub trait FrameSource: Send + Sync {
    fn capture(&self) -> Result<DynamicImage, FrameError>;
}

/// Reads the render output file on every capture.
#[derive(Debug, Clone)]
pub struct FileFrameSource {
    path: PathBuf,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for FileFrameSource {
    fn capture(&self) -> Result<DynamicImage, FrameError> {
        if !self.path.is_file() {
            return Err(FrameError::Missing(self.path.clone()));
        }
        Ok(load_dynamic(&self.path)?)
    }
}

/// A fixed in-memory frame.
#[derive(Debug, Clone)]
pub struct StaticFrameSource {
    frame: DynamicImage,
}

impl StaticFrameSource {
    pub fn new(frame: DynamicImage) -> Self {
        Self { frame }
    }
}

impl FrameSource for StaticFrameSource {
    fn capture(&self) -> Result<DynamicImage, FrameError> {
        Ok(self.frame.clone())
    }
}

/// Watches a render output file for new renders by modification time.
#[derive(Debug)]
pub struct RenderWatcher {
    path: PathBuf,
    last_seen: Option<SystemTime>,
}

impl RenderWatcher {
    /// The file's current state counts as already seen.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_seen = modified(&path);
        Self { path, last_seen }
    }

    /// True once per new modification time. A missing file is never "changed".
    pub fn poll_changed(&mut self) -> bool {
        match modified(&self.path) {
            Some(mtime) if self.last_seen != Some(mtime) => {
                self.last_seen = Some(mtime);
                true
            }
            _ => false,
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{Rgba, RgbaImage};
    use std::time::Duration;
    use tempfile::tempdir;

    fn rgba_frame() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 128])))
    }

    #[test]
    fn test_file_source_missing_and_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("render.png");
        let source = FileFrameSource::new(&path);
        assert!(matches!(source.capture(), Err(FrameError::Missing(_))));

        rgba_frame().save(&path).unwrap();
        let frame = source.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 3));
    }

    #[test]
    fn test_watcher_reports_each_change_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("render.png");
        let mut watcher = RenderWatcher::new(&path);
        assert!(!watcher.poll_changed());

        fs::write(&path, b"first").unwrap();
        assert!(watcher.poll_changed());
        assert!(!watcher.poll_changed());

        let later = SystemTime::now() + Duration::from_secs(5);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();
        assert!(watcher.poll_changed());
    }
}
