//! # lib_bridge
//!
//! Shared library behind the camera-view bridge. A producer (the 3D tool
//! side) renders a frame and pushes it to a consumer process, which keeps
//! the latest image per node key and hands it to a node-graph step on every
//! execution.
//!
//! Module map:
//! - `relay`: canonical image form, the keyed image store and the consumer pull.
//! - `assets`: on-disk asset roots used by uploads and update-by-reference.
//! - `wire`: JSON bodies and route paths shared by both sides.
//! - `endpoints`: axum routes for the receive/update endpoints and host surface.
//! - `producer`: HTTP client and the dual-path send logic.
//! - `configs` / `loggers`: ambient configuration and logging setup.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod assets;
pub mod relay;
pub mod wire;

#[cfg(feature = "configs")]
pub mod configs;
#[cfg(feature = "endpoints")]
pub mod endpoints;
#[cfg(feature = "loggers")]
pub mod loggers;
#[cfg(feature = "producer")]
pub mod producer;

pub use crate::relay::image::{Image, ImageError, ImageTensor};
pub use crate::relay::image_store::{ImageStore, StoredImage};
pub use crate::relay::pull::{CameraInputNode, ChangeToken, PullOutput, PullSource};
