//! # Loggers
//!
//! Process-wide `tracing` setup: console output plus a JSON log file that
//! rolls daily, with old files pruned at start-up.

pub mod setup;

pub use setup::{LoggingError, prune_old_logs, setup_logging};
