//! # Structviz Utilities
//!
//! Shared utilities and logging for structviz.
//!
//! This crate provides common functionality used across the structviz
//! workspace, including logging infrastructure built on `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel};
pub use tracing::{debug, error, info, trace, warn};
