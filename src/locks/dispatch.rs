//! Lock type dispatch.
//!
//! Each `LockType` maps to one row of a static table holding the function
//! that opens the matching backend primitive. Adding a lock type means adding
//! a variant and a row; nothing else branches on the type.

use super::backend::{BackendLock, LockBackend};
use super::handle::LockHandle;
use super::types::{LockType, Owner};
use crate::error::Result;

/// Opener for one backend primitive family.
pub type OpenFn = fn(&dyn LockBackend, &str, Owner) -> Result<Box<dyn BackendLock>>;

/// Dispatch table row.
pub struct LockOps {
    pub lock_type: LockType,
    pub description: &'static str,
    pub open: OpenFn,
}

fn open_exclusive(
    backend: &dyn LockBackend,
    key: &str,
    owner: Owner,
) -> Result<Box<dyn BackendLock>> {
    backend.exclusive(key, owner)
}

fn open_fair(
    backend: &dyn LockBackend,
    key: &str,
    owner: Owner,
) -> Result<Box<dyn BackendLock>> {
    backend.fair(key, owner)
}

fn open_spin(
    backend: &dyn LockBackend,
    key: &str,
    owner: Owner,
) -> Result<Box<dyn BackendLock>> {
    backend.spin(key, owner)
}

fn open_fenced(
    backend: &dyn LockBackend,
    key: &str,
    owner: Owner,
) -> Result<Box<dyn BackendLock>> {
    backend.fenced(key, owner)
}

fn open_read(
    backend: &dyn LockBackend,
    key: &str,
    owner: Owner,
) -> Result<Box<dyn BackendLock>> {
    backend.read(key, owner)
}

fn open_write(
    backend: &dyn LockBackend,
    key: &str,
    owner: Owner,
) -> Result<Box<dyn BackendLock>> {
    backend.write(key, owner)
}

static DISPATCH_TABLE: [LockOps; 6] = [
    LockOps {
        lock_type: LockType::Exclusive,
        description: "standard mutual-exclusion lock",
        open: open_exclusive,
    },
    LockOps {
        lock_type: LockType::Fair,
        description: "mutual-exclusion lock with FIFO waiters",
        open: open_fair,
    },
    LockOps {
        lock_type: LockType::Spin,
        description: "busy-poll mutual-exclusion lock",
        open: open_spin,
    },
    LockOps {
        lock_type: LockType::Fenced,
        description: "mutual-exclusion lock with fencing tokens",
        open: open_fenced,
    },
    LockOps {
        lock_type: LockType::ReadShared,
        description: "shared side of a reader/writer lock",
        open: open_read,
    },
    LockOps {
        lock_type: LockType::WriteExclusive,
        description: "exclusive side of a reader/writer lock",
        open: open_write,
    },
];

/// Look up the dispatch row for a lock type.
pub fn lock_ops(lock_type: LockType) -> &'static LockOps {
    &DISPATCH_TABLE[lock_type.index()]
}

/// Open a handle of the given type bound to `key`, owned by a fresh `Owner`.
///
/// Fails with `UnsupportedLockOperation` if the backend lacks the family.
pub fn acquire_handle(
    backend: &dyn LockBackend,
    lock_type: LockType,
    key: &str,
) -> Result<LockHandle> {
    let owner = Owner::new();
    let inner = (lock_ops(lock_type).open)(backend, key, owner.clone())?;
    Ok(LockHandle::new(key, lock_type, owner, inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_line_up_with_variants() {
        for lock_type in LockType::ALL {
            assert_eq!(lock_ops(lock_type).lock_type, lock_type);
        }
    }

    #[test]
    fn every_row_has_a_description() {
        for ops in DISPATCH_TABLE.iter() {
            assert!(!ops.description.is_empty());
        }
    }
}
