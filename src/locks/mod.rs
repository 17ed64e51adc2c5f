//! Locking subsystem for locksmith.
//!
//! This module is the seam between the interceptor and the lock backend:
//! - `LockType`: the six lock semantics a declaration may request
//! - `LockBackend` / `BackendLock`: the external, authoritative lock service
//! - `dispatch`: the static table mapping each `LockType` to a backend primitive
//! - `LockHandle` / `HeldLock`: per-invocation ownership and RAII release
//!
//! # Backends
//!
//! - `InMemoryBackend`: process-local, supports every lock type
//! - `FileBackend`: exclusive-create lock files shared across processes,
//!   supports `exclusive` and `spin` only
//!
//! # RAII Guards
//!
//! An acquired handle is wrapped in a `HeldLock`. When the guard is dropped
//! the lock is released if, and only if, the handle still owns it. Lost
//! ownership is reported as a diagnostic event; it never panics and never
//! fails the guarded call.

mod backend;
mod dispatch;
mod file;
mod handle;
mod memory;
pub(crate) mod metadata;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use backend::{BackendLock, LockBackend};
pub use dispatch::{LockOps, OpenFn, acquire_handle, lock_ops};
pub use file::{FileBackend, file_name_for};
pub use handle::{HeldLock, LockHandle, ReleaseOutcome};
pub use memory::InMemoryBackend;
pub use metadata::LockMetadata;
pub use types::{Interrupt, Lease, LockType, Owner};
