//! Lock file metadata and owner identity.

use crate::error::{LockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Metadata stored in a file-backed lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockMetadata {
    /// The lock key this file represents.
    pub key: String,

    /// Owner token of the holding handle.
    pub owner: String,

    /// Process ID of the lock holder (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,

    /// Timestamp when the lock was taken (RFC3339).
    pub created_at: DateTime<Utc>,

    /// Timestamp after which the lock may be taken over.
    pub expires_at: DateTime<Utc>,
}

impl LockMetadata {
    /// Create metadata for a lock taken now and held for `lease`.
    pub fn new(key: &str, owner: &str, lease: std::time::Duration) -> Self {
        let created_at = Utc::now();
        let lease =
            chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            key: key.to_string(),
            owner: owner.to_string(),
            pid: Some(std::process::id()),
            created_at,
            expires_at: created_at.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Parse lock metadata from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            LockError::Backend(format!(
                "failed to read lock file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            LockError::Backend(format!(
                "failed to parse lock file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })
    }

    /// Serialize lock metadata to JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LockError::Backend(format!("failed to serialize lock metadata: {}", e)))
    }

    /// Whether the lease has run out.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// `user@HOST` for the current process.
pub(crate) fn owner_identity() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}
