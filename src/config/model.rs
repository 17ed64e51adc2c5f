//! Config struct definition and default implementation.

use super::types::*;
use crate::declaration::LockDeclaration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration for lock interception.
///
/// This struct represents the contents of `locksmith.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Key settings
    // =========================================================================
    /// Namespace prepended to every lock key (default: "lock:").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Separator between type and method in derived keys (default: ":").
    #[serde(default = "default_key_delimiter")]
    pub key_delimiter: String,

    // =========================================================================
    // Backend settings
    // =========================================================================
    #[serde(default)]
    pub backend: BackendConfig,

    // =========================================================================
    // Diagnostics
    // =========================================================================
    /// Append lock events to this NDJSON file; unset logs them via tracing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_file: Option<PathBuf>,

    // =========================================================================
    // Declarations
    // =========================================================================
    /// Lock declarations keyed by `Type::method`.
    #[serde(default)]
    pub declarations: BTreeMap<String, LockDeclaration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            key_delimiter: default_key_delimiter(),
            backend: BackendConfig::default(),
            events_file: None,
            declarations: BTreeMap::new(),
        }
    }
}
