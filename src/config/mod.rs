//! Configuration model for locksmith.
//!
//! This module defines the Config struct that represents `locksmith.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values,
//! including every registered lock declaration.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use types::{BackendConfig, BackendKind, DEFAULT_CONFIG_FILE};
