//! # Configs
//!
//! Layered configuration for the consumer server: built-in defaults, an
//! optional JSON file, then environment variables and CLI flags.

pub mod server_config;

pub use server_config::{ConfigError, ServerArgs, ServerConfig, load_config};
