//! Lock type definitions, lease policy, cancellation, and owner identity.

use super::metadata::owner_identity;
use crate::error::{LockError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock semantics requested by a declaration.
///
/// The discriminants index the dispatch table in `dispatch.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockType {
    /// Standard mutual-exclusion lock.
    #[default]
    Exclusive = 0,
    /// Mutual exclusion with FIFO waiter ordering.
    Fair = 1,
    /// Busy-poll acquisition, tuned for short critical sections.
    Spin = 2,
    /// Exclusive lock issuing a monotonically increasing fencing token.
    Fenced = 3,
    /// Shared side of a reader/writer pair.
    ReadShared = 4,
    /// Exclusive side of a reader/writer pair.
    WriteExclusive = 5,
}

impl LockType {
    /// All lock types, in dispatch-table order.
    pub const ALL: [LockType; 6] = [
        LockType::Exclusive,
        LockType::Fair,
        LockType::Spin,
        LockType::Fenced,
        LockType::ReadShared,
        LockType::WriteExclusive,
    ];

    /// Get the configuration name for this lock type.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::Exclusive => "exclusive",
            LockType::Fair => "fair",
            LockType::Spin => "spin",
            LockType::Fenced => "fenced",
            LockType::ReadShared => "read_shared",
            LockType::WriteExclusive => "write_exclusive",
        }
    }

    /// Position of this variant in the dispatch table.
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Whether at most one holder may own the key under this lock type.
    pub fn is_exclusive(&self) -> bool {
        !matches!(self, LockType::ReadShared)
    }
}

impl std::fmt::Display for LockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self> {
        LockType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                LockError::Config(format!(
                    "unknown lock type '{}' (expected one of: exclusive, fair, spin, fenced, read_shared, write_exclusive)",
                    s
                ))
            })
    }
}

/// How long an acquired lock may be held before the backend expires it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    /// Forced expiry after the given duration.
    Fixed(Duration),
    /// No explicit lease; the backend keeps the lock alive for its holder.
    KeepAlive,
}

impl Lease {
    pub fn from_option(lease: Option<Duration>) -> Self {
        match lease {
            Some(duration) => Lease::Fixed(duration),
            None => Lease::KeepAlive,
        }
    }

    /// Expiry instant for a lock taken at `now`, if the lease is fixed.
    pub fn expiry_from(&self, now: Instant) -> Option<Instant> {
        match self {
            Lease::Fixed(duration) => now.checked_add(*duration),
            Lease::KeepAlive => None,
        }
    }
}

/// Longest wait honoured in full; longer waits are capped here.
const MAX_WAIT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline for a wait of `wait` starting at `now`.
///
/// `Instant` cannot represent arbitrarily distant instants, so waits beyond
/// its range fall back to `MAX_WAIT`.
pub(crate) fn wait_deadline(now: Instant, wait: Duration) -> Instant {
    now.checked_add(wait)
        .or_else(|| now.checked_add(MAX_WAIT))
        .unwrap_or(now)
}

/// Cancellation signal for a pending acquisition.
///
/// Clones share the same flag, so a caller can hand one clone to the
/// interceptor and fire the other from a different thread.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel any acquisition waiting on this signal.
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with `AcquisitionInterrupted` if the signal has fired.
    pub fn check(&self, key: &str) -> Result<()> {
        if self.is_interrupted() {
            Err(LockError::AcquisitionInterrupted(format!(
                "wait for lock '{}' was cancelled",
                key
            )))
        } else {
            Ok(())
        }
    }
}

static OWNER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identity of one lock handle's holder.
///
/// Built from `user@HOST`, the process id, the calling thread, and a
/// process-wide sequence number, so every handle gets a distinct owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(String);

impl Owner {
    pub fn new() -> Self {
        let seq = OWNER_SEQ.fetch_add(1, Ordering::Relaxed);
        Owner(format!(
            "{}:{}:{:?}:{}",
            owner_identity(),
            std::process::id(),
            std::thread::current().id(),
            seq
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
