use crate::error::{LockError, Result};
use crate::locks::{BackendLock, Interrupt, Lease, LockBackend, LockType, Owner};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test harness; honours `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared, inspectable behaviour for `ScriptedBackend` locks.
///
/// Tests flip the flags to decide what the next acquisition returns and
/// whether the handle still owns its lock at release time.
#[derive(Debug, Default)]
pub(crate) struct Script {
    /// Result of `try_acquire`.
    pub grant: AtomicBool,
    /// Result of `is_held_by_caller`.
    pub owned: AtomicBool,
    /// Make `release` fail.
    pub fail_release: AtomicBool,
    /// On interruption, report the error but leave the lock held.
    pub hold_on_interrupt: AtomicBool,
    pub acquisitions: AtomicUsize,
    pub releases: AtomicUsize,
    pub last_wait: Mutex<Option<Duration>>,
    pub last_lease: Mutex<Option<Lease>>,
    pub opened: Mutex<Vec<(LockType, String)>>,
}

impl Script {
    pub(crate) fn granting() -> Arc<Self> {
        let script = Script::default();
        script.grant.store(true, Ordering::SeqCst);
        Arc::new(script)
    }

    pub(crate) fn refusing() -> Arc<Self> {
        Arc::new(Script::default())
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Simulate the backend expiring the lock behind the holder's back.
    pub(crate) fn lose_ownership(&self) {
        self.owned.store(false, Ordering::SeqCst);
    }

    pub(crate) fn opened(&self) -> Vec<(LockType, String)> {
        self.opened.lock().unwrap().clone()
    }
}

/// Backend whose locks follow a `Script` instead of real contention.
pub(crate) struct ScriptedBackend {
    pub script: Arc<Script>,
    /// Families this backend pretends to support; `None` means all.
    pub supported: Option<Vec<LockType>>,
}

impl ScriptedBackend {
    pub(crate) fn new(script: Arc<Script>) -> Self {
        Self {
            script,
            supported: None,
        }
    }

    fn open(&self, lock_type: LockType, key: &str) -> Result<Box<dyn BackendLock>> {
        if let Some(supported) = &self.supported
            && !supported.contains(&lock_type)
        {
            return Err(LockError::UnsupportedLockOperation {
                lock_type: lock_type.as_str().to_string(),
                backend: self.name().to_string(),
            });
        }
        self.script
            .opened
            .lock()
            .unwrap()
            .push((lock_type, key.to_string()));
        Ok(Box::new(ScriptedLock {
            key: key.to_string(),
            script: Arc::clone(&self.script),
        }))
    }
}

impl LockBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn exclusive(&self, key: &str, _owner: Owner) -> Result<Box<dyn BackendLock>> {
        self.open(LockType::Exclusive, key)
    }

    fn fair(&self, key: &str, _owner: Owner) -> Result<Box<dyn BackendLock>> {
        self.open(LockType::Fair, key)
    }

    fn spin(&self, key: &str, _owner: Owner) -> Result<Box<dyn BackendLock>> {
        self.open(LockType::Spin, key)
    }

    fn fenced(&self, key: &str, _owner: Owner) -> Result<Box<dyn BackendLock>> {
        self.open(LockType::Fenced, key)
    }

    fn read(&self, key: &str, _owner: Owner) -> Result<Box<dyn BackendLock>> {
        self.open(LockType::ReadShared, key)
    }

    fn write(&self, key: &str, _owner: Owner) -> Result<Box<dyn BackendLock>> {
        self.open(LockType::WriteExclusive, key)
    }
}

struct ScriptedLock {
    key: String,
    script: Arc<Script>,
}

impl BackendLock for ScriptedLock {
    fn try_acquire(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool> {
        let script = &self.script;
        script.acquisitions.fetch_add(1, Ordering::SeqCst);
        *script.last_wait.lock().unwrap() = Some(wait);
        *script.last_lease.lock().unwrap() = Some(lease);

        if interrupt.is_interrupted() {
            if script.hold_on_interrupt.load(Ordering::SeqCst) {
                script.owned.store(true, Ordering::SeqCst);
            }
            return interrupt.check(&self.key).map(|_| false);
        }

        let granted = script.grant.load(Ordering::SeqCst);
        if granted {
            script.owned.store(true, Ordering::SeqCst);
        }
        Ok(granted)
    }

    fn release(&self) -> Result<()> {
        self.script.releases.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_release.load(Ordering::SeqCst) {
            return Err(LockError::Backend("release refused".to_string()));
        }
        self.script.owned.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_held_by_caller(&self) -> bool {
        self.script.owned.load(Ordering::SeqCst)
    }
}
