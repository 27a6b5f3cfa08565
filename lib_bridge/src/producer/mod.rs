//! # Producer
//!
//! Everything the 3D tool side needs to push a camera view to the consumer.
//!
//! - **`client`**: one-shot HTTP calls with fixed timeouts.
//! - **`frame`**: frame sources and render-output watching.
//! - **`send`**: connection state and the primary/secondary send path.

pub mod client;
pub mod frame;
pub mod send;

pub use client::{BridgeClient, ClientError};
pub use frame::{FileFrameSource, FrameError, FrameSource, RenderWatcher, StaticFrameSource};
pub use send::{CameraViewSender, ProducerSettings, SecondaryOutcome, SendError, SendReceipt};
