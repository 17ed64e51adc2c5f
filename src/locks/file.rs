//! File-backed lock backend.
//!
//! Each key maps to one lock file created with **create_new** semantics
//! (exclusive create), so only one owner across every process sharing the
//! lock directory can hold a key at a time. The file holds JSON
//! `LockMetadata`; a file whose lease has expired may be taken over.
//!
//! Only `exclusive` and `spin` are provided. Fair queues, fencing tokens and
//! reader/writer pairs need shared state a plain file cannot express, so
//! those families fail with `UnsupportedLockOperation`.

use super::backend::{BackendLock, LockBackend};
use super::metadata::LockMetadata;
use super::types::{Interrupt, Lease, Owner, wait_deadline};
use crate::error::{LockError, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default slice between attempts while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Effective lease for `Lease::KeepAlive` locks; other processes cannot
/// tell whether the holder is still alive, so an abandoned file must expire.
pub const DEFAULT_KEEP_ALIVE_LEASE: Duration = Duration::from_secs(30);

/// Lock backend storing one file per key under `lock_dir`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    lock_dir: PathBuf,
    poll_interval: Duration,
    keep_alive_lease: Duration,
}

impl FileBackend {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            keep_alive_lease: DEFAULT_KEEP_ALIVE_LEASE,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_keep_alive_lease(mut self, lease: Duration) -> Self {
        self.keep_alive_lease = lease;
        self
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Path of the lock file for `key`.
    pub fn lock_path(&self, key: &str) -> PathBuf {
        self.lock_dir.join(format!("{}.lock", file_name_for(key)))
    }

    fn open(&self, key: &str, owner: Owner) -> Box<dyn BackendLock> {
        Box::new(FileLock {
            path: self.lock_path(key),
            key: key.to_string(),
            owner,
            poll_interval: self.poll_interval,
            keep_alive_lease: self.keep_alive_lease,
        })
    }
}

impl LockBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn exclusive(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner))
    }

    fn spin(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner))
    }
}

/// Escape a key into a portable file name.
///
/// ASCII alphanumerics, `-`, `_` and `.` pass through; every other byte
/// becomes `%XX`.
pub fn file_name_for(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            name.push(byte as char);
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name
}

struct FileLock {
    path: PathBuf,
    key: String,
    owner: Owner,
    poll_interval: Duration,
    keep_alive_lease: Duration,
}

enum Attempt {
    Acquired,
    Held,
    Expired(LockMetadata),
    /// No readable metadata, and the file is older than the keep-alive lease.
    Abandoned,
}

impl FileLock {
    /// Try to create the lock file exclusively.
    fn attempt(&self, metadata: &LockMetadata) -> Result<Attempt> {
        if let Some(parent) = self.path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                LockError::Backend(format!(
                    "failed to create lock directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(match LockMetadata::from_file(&self.path) {
                    Ok(existing) if existing.is_expired() => Attempt::Expired(existing),
                    Ok(_) => Attempt::Held,
                    Err(_) if self.is_abandoned() => Attempt::Abandoned,
                    // Unreadable files are usually mid-write by the new holder.
                    Err(_) => Attempt::Held,
                });
            }
            Err(e) => {
                return Err(LockError::Backend(format!(
                    "failed to create lock file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let json = metadata.to_json()?;
        file.write_all(json.as_bytes()).map_err(|e| {
            let _ = fs::remove_file(&self.path);
            LockError::Backend(format!("failed to write lock metadata: {}", e))
        })?;

        file.sync_all().map_err(|e| {
            let _ = fs::remove_file(&self.path);
            LockError::Backend(format!("failed to sync lock file: {}", e))
        })?;

        Ok(Attempt::Acquired)
    }

    /// Remove an expired lock file, unless it changed hands since it was read.
    fn take_over(&self, expired: &LockMetadata) {
        if let Ok(current) = LockMetadata::from_file(&self.path)
            && current.owner == expired.owner
            && current.is_expired()
        {
            tracing::debug!(key = %self.key, previous_owner = %expired.owner, "taking over expired lock file");
            let _ = fs::remove_file(&self.path);
        }
    }

    /// Whether the lock file was last written longer ago than any holder
    /// may keep it without a lease.
    fn is_abandoned(&self) -> bool {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age >= self.keep_alive_lease)
    }

    /// Remove a lock file left without metadata, e.g. by a holder that
    /// crashed before writing it.
    fn take_over_abandoned(&self) {
        if LockMetadata::from_file(&self.path).is_err() && self.is_abandoned() {
            tracing::warn!(key = %self.key, path = %self.path.display(), "removing abandoned lock file without metadata");
            let _ = fs::remove_file(&self.path);
        }
    }

    fn read_own_metadata(&self) -> Option<LockMetadata> {
        LockMetadata::from_file(&self.path)
            .ok()
            .filter(|meta| meta.owner == self.owner.as_str())
    }
}

impl BackendLock for FileLock {
    fn try_acquire(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool> {
        let lease = match lease {
            Lease::Fixed(duration) => duration,
            Lease::KeepAlive => self.keep_alive_lease,
        };
        let deadline = wait_deadline(Instant::now(), wait);

        loop {
            interrupt.check(&self.key)?;

            let metadata = LockMetadata::new(&self.key, self.owner.as_str(), lease);
            match self.attempt(&metadata)? {
                Attempt::Acquired => return Ok(true),
                Attempt::Expired(existing) => {
                    self.take_over(&existing);
                    if Instant::now() < deadline {
                        continue;
                    }
                    return Ok(false);
                }
                Attempt::Abandoned => {
                    self.take_over_abandoned();
                    if Instant::now() < deadline {
                        continue;
                    }
                    return Ok(false);
                }
                Attempt::Held => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    fn release(&self) -> Result<()> {
        if self.read_own_metadata().is_none() {
            return Err(LockError::Backend(format!(
                "lock '{}' is not held by {}",
                self.key, self.owner
            )));
        }
        fs::remove_file(&self.path).map_err(|e| {
            LockError::Backend(format!(
                "failed to release lock '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    fn is_held_by_caller(&self) -> bool {
        self.read_own_metadata()
            .is_some_and(|meta| !meta.is_expired())
    }
}
