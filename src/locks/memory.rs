//! In-memory lock backend.
//!
//! Process-local stand-in for a distributed lock service, supporting every
//! primitive family. All keys live in one `Mutex<HashMap>` guarded table with
//! a shared `Condvar`; waiters sleep in slices of at most `poll_interval` so
//! cancellation and lease expiry are noticed without a background reaper.
//!
//! Per key there is one writer slot and one reader set. Every exclusive
//! family (exclusive, fair, spin, fenced, write) competes for the writer
//! slot and requires the reader set to be empty; readers only require the
//! writer slot to be empty.

use super::backend::{BackendLock, LockBackend};
use super::types::{Interrupt, Lease, LockType, Owner, wait_deadline};
use crate::error::{LockError, Result};
use std::cell::Cell;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default slice between re-checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Holder {
    owner: Owner,
    expires_at: Option<Instant>,
}

impl Holder {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|t| t > now)
    }
}

#[derive(Default)]
struct KeyState {
    writer: Option<Holder>,
    readers: Vec<Holder>,
    /// Tickets of fair waiters, in arrival order.
    queue: VecDeque<u64>,
    next_ticket: u64,
    /// Last fencing token issued for this key.
    fence: u64,
}

impl KeyState {
    fn purge_expired(&mut self, now: Instant) {
        if self.writer.as_ref().is_some_and(|w| !w.is_live(now)) {
            self.writer = None;
        }
        self.readers.retain(|r| r.is_live(now));
    }

    fn writer_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    /// Nothing to remember for this key. Fenced keys keep their counter so
    /// tokens never repeat.
    fn is_idle(&self) -> bool {
        self.writer_free() && self.queue.is_empty() && self.fence == 0
    }

    fn holds(&self, owner: &Owner, now: Instant) -> bool {
        self.writer
            .as_ref()
            .is_some_and(|w| &w.owner == owner && w.is_live(now))
            || self
                .readers
                .iter()
                .any(|r| &r.owner == owner && r.is_live(now))
    }
}

/// Drop expired holders of `key` and forget the key once nothing is left.
fn prune(keys: &mut HashMap<String, KeyState>, key: &str, now: Instant) {
    if let Some(state) = keys.get_mut(key) {
        state.purge_expired(now);
        if state.is_idle() {
            keys.remove(key);
        }
    }
}

struct Table {
    keys: Mutex<HashMap<String, KeyState>>,
    changed: Condvar,
}

impl Table {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, KeyState>>> {
        self.keys
            .lock()
            .map_err(|_| LockError::Backend("in-memory lock table poisoned".to_string()))
    }
}

/// In-memory lock backend shared by every handle it opens.
#[derive(Clone)]
pub struct InMemoryBackend {
    table: Arc<Table>,
    poll_interval: Duration,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        InMemoryBackend {
            table: Arc::new(Table {
                keys: Mutex::new(HashMap::new()),
                changed: Condvar::new(),
            }),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Whether any live holder owns `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        match self.table.lock() {
            Ok(keys) => keys.get(key).is_some_and(|state| {
                state.writer.as_ref().is_some_and(|w| w.is_live(now))
                    || state.readers.iter().any(|r| r.is_live(now))
            }),
            Err(_) => false,
        }
    }

    /// Drop every holder of `key`, as if all their leases had expired.
    pub fn force_unlock(&self, key: &str) -> Result<()> {
        let mut keys = self.table.lock()?;
        if let Some(state) = keys.get_mut(key) {
            state.writer = None;
            state.readers.clear();
        }
        prune(&mut keys, key, Instant::now());
        self.table.changed.notify_all();
        Ok(())
    }

    /// Number of keys with state in the table.
    #[cfg(test)]
    pub(crate) fn tracked_keys(&self) -> usize {
        self.table.keys.lock().map(|keys| keys.len()).unwrap_or(0)
    }

    fn open(&self, key: &str, owner: Owner, mode: LockType) -> Box<dyn BackendLock> {
        Box::new(MemoryLock {
            table: Arc::clone(&self.table),
            key: key.to_string(),
            owner,
            mode,
            poll_interval: self.poll_interval,
            token: Cell::new(None),
        })
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LockBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn exclusive(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner, LockType::Exclusive))
    }

    fn fair(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner, LockType::Fair))
    }

    fn spin(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner, LockType::Spin))
    }

    fn fenced(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner, LockType::Fenced))
    }

    fn read(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner, LockType::ReadShared))
    }

    fn write(&self, key: &str, owner: Owner) -> Result<Box<dyn BackendLock>> {
        Ok(self.open(key, owner, LockType::WriteExclusive))
    }
}

struct MemoryLock {
    table: Arc<Table>,
    key: String,
    owner: Owner,
    mode: LockType,
    poll_interval: Duration,
    token: Cell<Option<u64>>,
}

impl MemoryLock {
    /// Take the lock if the key state allows it. `ticket` is set for fair waiters.
    fn take(&self, state: &mut KeyState, lease: Lease, now: Instant, ticket: Option<u64>) -> bool {
        let holder = Holder {
            owner: self.owner.clone(),
            expires_at: lease.expiry_from(now),
        };
        match self.mode {
            LockType::ReadShared => {
                if state.writer.is_some() {
                    return false;
                }
                state.readers.push(holder);
            }
            LockType::Fair => {
                if !state.writer_free() || state.queue.front().copied() != ticket {
                    return false;
                }
                state.queue.pop_front();
                state.writer = Some(holder);
            }
            _ => {
                if !state.writer_free() {
                    return false;
                }
                state.writer = Some(holder);
                if self.mode == LockType::Fenced {
                    state.fence += 1;
                    self.token.set(Some(state.fence));
                }
            }
        }
        true
    }

    fn withdraw_ticket(&self, keys: &mut HashMap<String, KeyState>, ticket: Option<u64>) {
        if let Some(ticket) = ticket
            && let Some(state) = keys.get_mut(&self.key)
        {
            state.queue.retain(|t| *t != ticket);
            self.table.changed.notify_all();
        }
    }

    fn wait_blocking(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool> {
        let deadline = wait_deadline(Instant::now(), wait);
        let mut keys = self.table.lock()?;

        let ticket = if self.mode == LockType::Fair {
            let state = keys.entry(self.key.clone()).or_default();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(ticket);
            Some(ticket)
        } else {
            None
        };

        loop {
            if let Err(e) = interrupt.check(&self.key) {
                self.withdraw_ticket(&mut keys, ticket);
                prune(&mut keys, &self.key, Instant::now());
                return Err(e);
            }

            let now = Instant::now();
            let state = keys.entry(self.key.clone()).or_default();
            state.purge_expired(now);
            if self.take(state, lease, now, ticket) {
                return Ok(true);
            }
            if now >= deadline {
                self.withdraw_ticket(&mut keys, ticket);
                prune(&mut keys, &self.key, now);
                return Ok(false);
            }

            let slice = self.poll_interval.min(deadline - now);
            keys = match self.table.changed.wait_timeout(keys, slice) {
                Ok((guard, _)) => guard,
                Err(_) => {
                    return Err(LockError::Backend(
                        "in-memory lock table poisoned".to_string(),
                    ));
                }
            };
        }
    }

    fn wait_spinning(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool> {
        let deadline = wait_deadline(Instant::now(), wait);
        loop {
            if let Err(e) = interrupt.check(&self.key) {
                prune(&mut *self.table.lock()?, &self.key, Instant::now());
                return Err(e);
            }

            let now = Instant::now();
            {
                let mut keys = self.table.lock()?;
                let state = keys.entry(self.key.clone()).or_default();
                state.purge_expired(now);
                if self.take(state, lease, now, None) {
                    return Ok(true);
                }
                if now >= deadline {
                    prune(&mut keys, &self.key, now);
                    return Ok(false);
                }
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

impl BackendLock for MemoryLock {
    fn try_acquire(&self, wait: Duration, lease: Lease, interrupt: &Interrupt) -> Result<bool> {
        if self.mode == LockType::Spin {
            self.wait_spinning(wait, lease, interrupt)
        } else {
            self.wait_blocking(wait, lease, interrupt)
        }
    }

    fn release(&self) -> Result<()> {
        let mut keys = self.table.lock()?;
        let now = Instant::now();
        let state = keys
            .get_mut(&self.key)
            .filter(|state| state.holds(&self.owner, now))
            .ok_or_else(|| {
                LockError::Backend(format!(
                    "lock '{}' is not held by {}",
                    self.key, self.owner
                ))
            })?;

        if self.mode == LockType::ReadShared {
            if let Some(pos) = state.readers.iter().position(|r| r.owner == self.owner) {
                state.readers.remove(pos);
            }
        } else {
            state.writer = None;
        }

        if state.is_idle() {
            keys.remove(&self.key);
        }
        self.table.changed.notify_all();
        Ok(())
    }

    fn is_held_by_caller(&self) -> bool {
        let now = Instant::now();
        match self.table.lock() {
            Ok(mut keys) => {
                let held = keys
                    .get(&self.key)
                    .is_some_and(|state| state.holds(&self.owner, now));
                if !held {
                    prune(&mut keys, &self.key, now);
                }
                held
            }
            Err(_) => false,
        }
    }

    fn fencing_token(&self) -> Option<u64> {
        self.token.get()
    }
}
