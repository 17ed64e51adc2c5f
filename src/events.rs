//! Diagnostic events for lock interception.
//!
//! Every acquire/release decision the interceptor makes is described by a
//! `LockEvent`. Events go to an `EventSink`; the default sink writes them to
//! `tracing`, `MemorySink` keeps them for inspection, and `NdjsonSink`
//! appends them to a file, one JSON object per line.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (acquired, rejected, released, ownership_lost, ...)
//! - `actor`: `user@HOST` of the process
//! - `key`: the resolved lock key, when one was resolved
//! - `lock_type`: the declared lock type, when a declaration applied
//! - `details`: freeform object with action-specific details
//!
//! Sinks never fail the call they observe: a sink that cannot record an
//! event logs the problem and moves on.

use crate::error::{LockError, Result};
use crate::locks::LockType;
use crate::locks::metadata::owner_identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Actions that can be recorded as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockEventAction {
    /// Lock acquired; the work is about to run.
    Acquired,
    /// Wait time ran out; the work was not run.
    Rejected,
    /// Lock released by its owner.
    Released,
    /// The handle no longer owned the lock at release time.
    OwnershipLost,
    /// The backend refused the release.
    ReleaseFailed,
    /// The wait was cancelled from outside.
    Interrupted,
    /// No declaration applied; the work ran without a lock.
    Unguarded,
}

impl std::fmt::Display for LockEventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockEventAction::Acquired => write!(f, "acquired"),
            LockEventAction::Rejected => write!(f, "rejected"),
            LockEventAction::Released => write!(f, "released"),
            LockEventAction::OwnershipLost => write!(f, "ownership_lost"),
            LockEventAction::ReleaseFailed => write!(f, "release_failed"),
            LockEventAction::Interrupted => write!(f, "interrupted"),
            LockEventAction::Unguarded => write!(f, "unguarded"),
        }
    }
}

/// A diagnostic record for one interception decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEvent {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// What happened.
    pub action: LockEventAction,

    /// The process that observed it (`user@HOST`).
    pub actor: String,

    /// The resolved lock key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// The declared lock type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_type: Option<LockType>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl LockEvent {
    /// Create a new event with the given action, stamped now.
    pub fn new(action: LockEventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: owner_identity(),
            key: None,
            lock_type: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_lock_type(mut self, lock_type: LockType) -> Self {
        self.lock_type = Some(lock_type);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LockError::Backend(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Destination for diagnostic events.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &LockEvent);
}

/// Writes events to `tracing` at a level matching their severity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &LockEvent) {
        let key = event.key.as_deref().unwrap_or("-");
        match event.action {
            LockEventAction::OwnershipLost | LockEventAction::ReleaseFailed => {
                tracing::warn!(key, action = %event.action, details = %event.details, "lock diagnostic");
            }
            LockEventAction::Unguarded => {
                tracing::warn!(action = %event.action, details = %event.details, "lock diagnostic");
            }
            _ => {
                tracing::debug!(key, action = %event.action, details = %event.details, "lock diagnostic");
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LockEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<LockEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poison| poison.into_inner().clone())
    }

    /// Number of recorded events with the given action.
    pub fn count(&self, action: LockEventAction) -> usize {
        self.events().iter().filter(|e| e.action == action).count()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &LockEvent) {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        events.push(event.clone());
    }
}

/// Appends events to an NDJSON file.
#[derive(Debug)]
pub struct NdjsonSink {
    path: PathBuf,
    // Serializes appends from concurrent invocations within this process.
    write_lock: Mutex<()>,
}

impl NdjsonSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line, creating the file and its parent
    /// directory if needed, and sync it to disk.
    pub fn append(&self, event: &LockEvent) -> Result<()> {
        let json_line = event.to_ndjson_line()?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::Backend(format!(
                    "failed to create events directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                LockError::Backend(format!(
                    "failed to open events file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            LockError::Backend(format!(
                "failed to write event to '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            LockError::Backend(format!(
                "failed to sync events file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl EventSink for NdjsonSink {
    fn record(&self, event: &LockEvent) {
        TracingSink.record(event);
        if let Err(e) = self.append(event) {
            tracing::warn!(error = %e, "failed to record lock event");
        }
    }
}
