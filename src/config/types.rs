//! Configuration types and defaults for locksmith.
//!
//! This module defines enums, constants, and default value functions
//! used by the Config struct.

use crate::key::{DEFAULT_KEY_DELIMITER, DEFAULT_KEY_PREFIX};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Config file read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "locksmith.yaml";

/// Which lock backend the interceptor talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Process-local backend supporting every lock type (default).
    #[default]
    Memory,
    /// Lock files shared across processes; exclusive and spin only.
    File,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::File => "file",
        }
    }
}

/// Backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,

    /// Directory holding lock files (file backend only).
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Milliseconds between re-checks while waiting for a lock.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Effective lease, in seconds, for file locks declared without one.
    #[serde(default = "default_keep_alive_lease_secs")]
    pub keep_alive_lease_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            lock_dir: default_lock_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            keep_alive_lease_secs: default_keep_alive_lease_secs(),
        }
    }
}

// Default value functions for serde

pub(super) fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

pub(super) fn default_key_delimiter() -> String {
    DEFAULT_KEY_DELIMITER.to_string()
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from(".locks")
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_keep_alive_lease_secs() -> u64 {
    30
}
