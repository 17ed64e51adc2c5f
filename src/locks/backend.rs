//! The lock backend seam.
//!
//! A backend is the external, authoritative owner of lock state. This layer
//! only needs three primitives per lock: a bounded acquisition attempt, a
//! release, and an ownership check. Backends opt into each primitive family
//! by overriding its factory method; the defaults refuse with
//! `UnsupportedLockOperation` instead of silently degrading to other semantics.

use super::types::{Interrupt, Lease, LockType, Owner};
use crate::error::{LockError, Result};
use std::time::Duration;

/// A single lock instance bound to one key and one owner.
pub trait BackendLock: Send {
    /// Try to acquire the lock, blocking for at most `wait`.
    ///
    /// Returns `Ok(true)` if acquired, `Ok(false)` if the wait ran out.
    /// Must return `AcquisitionInterrupted` promptly once `interrupt` fires.
    fn try_acquire(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool>;

    /// Release the lock.
    fn release(&self) -> Result<()>;

    /// Whether the backend still considers this handle's owner the holder.
    fn is_held_by_caller(&self) -> bool;

    /// Fencing token issued by the last successful acquisition, if any.
    fn fencing_token(&self) -> Option<u64> {
        None
    }
}

/// Factory for per-key locks, one method per primitive family.
pub trait LockBackend: Send + Sync {
    /// Short backend name used in errors and logs.
    fn name(&self) -> &'static str;

    fn exclusive(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        let _ = (key, owner);
        Err(unsupported(self.name(), LockType::Exclusive))
    }

    fn fair(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        let _ = (key, owner);
        Err(unsupported(self.name(), LockType::Fair))
    }

    fn spin(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        let _ = (key, owner);
        Err(unsupported(self.name(), LockType::Spin))
    }

    fn fenced(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        let _ = (key, owner);
        Err(unsupported(self.name(), LockType::Fenced))
    }

    /// Shared side of the reader/writer pair scoped to `key`.
    fn read(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        let _ = (key, owner);
        Err(unsupported(self.name(), LockType::ReadShared))
    }

    /// Exclusive side of the reader/writer pair scoped to `key`.
    fn write(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        let _ = (key, owner);
        Err(unsupported(self.name(), LockType::WriteExclusive))
    }
}

pub(crate) fn unsupported(backend: &str, lock_type: LockType) -> LockError {
    LockError::UnsupportedLockOperation {
        lock_type: lock_type.as_str().to_string(),
        backend: backend.to_string(),
    }
}
