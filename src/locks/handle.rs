//! Lock handles and the RAII release guard.

use super::backend::BackendLock;
use super::types::{Interrupt, Lease, LockType, Owner};
use crate::error::Result;
use crate::events::{EventSink, LockEvent, LockEventAction};
use serde_json::json;
use std::time::Duration;

/// A lock of one type, bound to one key, owned by one execution context.
pub struct LockHandle {
    key: String,
    lock_type: LockType,
    owner: Owner,
    inner: Box<dyn BackendLock>,
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("lock_type", &self.lock_type)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

/// Outcome of releasing a held lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The owner released the lock.
    Released,
    /// The handle no longer owned the lock; nothing was released.
    NotOwned,
}

impl LockHandle {
    pub(crate) fn new(
        key: &str,
        lock_type: LockType,
        owner: Owner,
        inner: Box<dyn BackendLock>,
    ) -> Self {
        Self {
            key: key.to_string(),
            lock_type,
            owner,
            inner,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Attempt a bounded acquisition.
    pub fn try_acquire(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool> {
        self.inner.try_acquire(wait, lease, interrupt)
    }

    /// Whether the backend still considers this handle the holder.
    pub fn is_owned_by_caller(&self) -> bool {
        self.inner.is_held_by_caller()
    }

    pub fn fencing_token(&self) -> Option<u64> {
        self.inner.fencing_token()
    }

    /// Release iff this handle still owns the lock.
    pub fn release(self) -> Result<ReleaseOutcome> {
        self.release_if_owned()
    }

    fn release_if_owned(&self) -> Result<ReleaseOutcome> {
        if !self.inner.is_held_by_caller() {
            return Ok(ReleaseOutcome::NotOwned);
        }
        self.inner.release()?;
        Ok(ReleaseOutcome::Released)
    }

    /// Wrap an acquired handle in a guard that releases it on drop.
    pub fn hold(self, sink: &dyn EventSink) -> HeldLock<'_> {
        HeldLock {
            handle: self,
            sink,
            released: false,
        }
    }
}

/// RAII guard for an acquired lock.
///
/// When dropped, the lock is released if and only if the handle still owns
/// it. Lost ownership and failed releases are reported to the event sink;
/// neither panics nor turns the guarded result into a failure.
pub struct HeldLock<'a> {
    handle: LockHandle,
    sink: &'a dyn EventSink,
    released: bool,
}

impl HeldLock<'_> {
    /// Release now instead of at scope exit, handling errors explicitly.
    pub fn release(mut self) -> Result<ReleaseOutcome> {
        self.released = true;
        let outcome = self.handle.release_if_owned();
        self.report(&outcome);
        outcome
    }

    fn report(&self, outcome: &Result<ReleaseOutcome>) {
        let event = |action| {
            LockEvent::new(action)
                .with_key(self.handle.key.as_str())
                .with_lock_type(self.handle.lock_type)
        };
        match outcome {
            Ok(ReleaseOutcome::Released) => {
                tracing::debug!(key = %self.handle.key, "lock held by current owner, released");
                self.sink.record(&event(LockEventAction::Released));
            }
            Ok(ReleaseOutcome::NotOwned) => {
                tracing::warn!(
                    key = %self.handle.key,
                    owner = %self.handle.owner,
                    "lock no longer held by its owner at release time, skipping release"
                );
                self.sink.record(
                    &event(LockEventAction::OwnershipLost)
                        .with_details(json!({"owner": self.handle.owner.as_str()})),
                );
            }
            Err(e) => {
                tracing::warn!(key = %self.handle.key, error = %e, "failed to release lock");
                self.sink.record(
                    &event(LockEventAction::ReleaseFailed)
                        .with_details(json!({"error": e.to_string()})),
                );
            }
        }
    }
}

impl Drop for HeldLock<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let outcome = self.handle.release_if_owned();
            self.report(&outcome);
        }
    }
}
