//! # Relay Core
//!
//! The consumer-side heart of the bridge: everything between "bytes arrived"
//! and "the node graph reads a tensor".
//!
//! - **`image`**: the canonical 3-channel image form, decoding/normalization
//!   and the float tensor view handed to the node graph.
//! - **`image_store`**: the keyed, last-write-wins store shared by every
//!   endpoint and every pull.
//! - **`pull`**: the node-graph step that reads the store on every execution.

/// Canonical RGB image, codecs and tensor conversion.
pub mod image;
/// Keyed last-write-wins image store.
pub mod image_store;
/// Consumer pull step and its change token.
pub mod pull;

/// Local wall-clock timestamp with second precision, used in log records.
pub fn log_timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}
