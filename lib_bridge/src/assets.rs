//! # Asset Roots
//!
//! Server-local files reachable by reference: the upload endpoint writes
//! into these directories and the update-by-reference endpoint reads from
//! them.
//!
//! References use the annotated naming of the host: a relative path,
//! optionally followed by ` [input]`, ` [output]` or ` [temp]` to pick the
//! root. Without an annotation the input directory is used. A reference can
//! never leave its root: absolute paths and `..` components are refused.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("empty asset reference")]
    Empty,

    #[error("asset reference escapes its directory: {0}")]
    OutsideRoot(String),

    #[error("asset not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRoot {
    #[default]
    Input,
    Output,
    Temp,
}

impl AssetRoot {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetRoot::Input => "input",
            AssetRoot::Output => "output",
            AssetRoot::Temp => "temp",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "input" => Some(AssetRoot::Input),
            "output" => Some(AssetRoot::Output),
            "temp" => Some(AssetRoot::Temp),
            _ => None,
        }
    }
}

impl fmt::Display for AssetRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an upload landed, in the shape the upload endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    /// File name only; pass this (plus the subfolder, if any) as `image_path`.
    pub name: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub root: AssetRoot,
}

impl UploadedAsset {
    /// The reference that resolves back to this file.
    pub fn reference(&self) -> String {
        let path = if self.subfolder.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.subfolder, self.name)
        };
        match self.root {
            AssetRoot::Input => path,
            root => format!("{path} [{root}]"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
    temp_dir: PathBuf,
}

impl AssetStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            temp_dir: temp_dir.into(),
        }
    }

    /// All three roots under one base directory.
    pub fn under(base: &Path) -> Self {
        Self::new(base.join("input"), base.join("output"), base.join("temp"))
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.input_dir, &self.output_dir, &self.temp_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn dir(&self, root: AssetRoot) -> &Path {
        match root {
            AssetRoot::Input => &self.input_dir,
            AssetRoot::Output => &self.output_dir,
            AssetRoot::Temp => &self.temp_dir,
        }
    }

    /// Resolves an annotated reference to an existing file.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf, AssetError> {
        let (relative, root) = split_annotation(reference);
        if relative.is_empty() {
            return Err(AssetError::Empty);
        }
        let path = self.dir(root).join(safe_relative(relative)?);
        if !path.is_file() {
            return Err(AssetError::NotFound(path));
        }
        Ok(path)
    }

    /// Writes uploaded bytes under `root/subfolder`.
    ///
    /// Without `overwrite`, an existing name gets a ` (n)` suffix before the
    /// extension, the first free `n` starting at 1.
    pub fn save_upload(
        &self,
        root: AssetRoot,
        subfolder: &str,
        file_name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<UploadedAsset, AssetError> {
        // Only the last component of a client-supplied name is kept.
        let name = Path::new(file_name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AssetError::InvalidName(file_name.to_string()))?;

        let subfolder = subfolder.trim_matches('/');
        let dir = if subfolder.is_empty() {
            self.dir(root).to_path_buf()
        } else {
            self.dir(root).join(safe_relative(subfolder)?)
        };
        fs::create_dir_all(&dir)?;

        let target = if overwrite {
            let target = dir.join(name);
            fs::write(&target, bytes)?;
            target
        } else {
            write_unique(&dir, name, bytes)?
        };

        let name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(name)
            .to_string();
        Ok(UploadedAsset {
            name,
            subfolder: subfolder.to_string(),
            root,
        })
    }
}

/// Creates `name` in `dir`, or `stem (n).ext` with the first free `n`.
/// Creation is exclusive, so concurrent uploads never share a file.
fn write_unique(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, AssetError> {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    let ext = path.extension().and_then(|e| e.to_str());

    let mut n = 0u32;
    loop {
        let candidate = match (n, ext) {
            (0, _) => name.to_string(),
            (_, Some(ext)) => format!("{stem} ({n}).{ext}"),
            (_, None) => format!("{stem} ({n})"),
        };
        let target = dir.join(candidate);
        match OpenOptions::new().write(true).create_new(true).open(&target) {
            Ok(mut file) => {
                file.write_all(bytes)?;
                return Ok(target);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Splits `"path [temp]"` into `("path", Temp)`.
fn split_annotation(reference: &str) -> (&str, AssetRoot) {
    let trimmed = reference.trim();
    for root in [AssetRoot::Input, AssetRoot::Output, AssetRoot::Temp] {
        let suffix = format!("[{root}]");
        if let Some(rest) = trimmed.strip_suffix(suffix.as_str()) {
            return (rest.trim_end(), root);
        }
    }
    (trimmed, AssetRoot::Input)
}

fn safe_relative(relative: &str) -> Result<PathBuf, AssetError> {
    let mut clean = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AssetError::OutsideRoot(relative.to_string()));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(AssetError::Empty);
    }
    Ok(clean)
}
