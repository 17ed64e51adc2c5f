//! Lock declarations.
//!
//! A `LockDeclaration` is attached once to a guarded operation and describes
//! how to derive the lock key, which lock semantics to use, how long to wait,
//! and what to tell the caller when the lock cannot be taken. Declarations
//! can be built in code or read from the `declarations` table of the config.

use crate::error::{LockError, Result};
use crate::locks::{Lease, LockType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Failure message used when a declaration does not set one.
pub const DEFAULT_FAILURE_MESSAGE: &str = "request too frequent, retry later";

/// Default wait time, in `TimeUnit::Seconds`.
pub const DEFAULT_WAIT_TIME: u64 = 3;

/// Unit for a declaration's `wait_time` and `lease_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Milliseconds,
    #[default]
    Seconds,
    Minutes,
}

impl TimeUnit {
    /// Convert `amount` of this unit to a `Duration`.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
        }
    }
}

/// Static lock configuration for one guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockDeclaration {
    /// Literal key or `#param` template; empty derives a key from the call site.
    pub key: String,

    /// Maximum time to wait for the lock, in `time_unit`.
    pub wait_time: u64,

    /// Maximum time to hold the lock, in `time_unit`; unset relies on the
    /// backend keeping the lock alive for its holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_time: Option<u64>,

    pub time_unit: TimeUnit,

    pub lock_type: LockType,

    /// Message surfaced to the caller when the lock is not acquired.
    pub failure_message: String,
}

impl Default for LockDeclaration {
    fn default() -> Self {
        Self {
            key: String::new(),
            wait_time: DEFAULT_WAIT_TIME,
            lease_time: None,
            time_unit: TimeUnit::Seconds,
            lock_type: LockType::Exclusive,
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl LockDeclaration {
    /// Declaration with the given key template and every other option defaulted.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Set the wait time. The declaration switches to millisecond precision.
    pub fn with_wait_time(mut self, wait: Duration) -> Self {
        self.rescale_to_millis();
        self.wait_time = millis(wait);
        self
    }

    /// Set the lease time. The declaration switches to millisecond precision.
    pub fn with_lease_time(mut self, lease: Duration) -> Self {
        self.rescale_to_millis();
        self.lease_time = Some(millis(lease));
        self
    }

    pub fn with_lock_type(mut self, lock_type: LockType) -> Self {
        self.lock_type = lock_type;
        self
    }

    pub fn with_failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = message.into();
        self
    }

    pub fn wait_duration(&self) -> Duration {
        self.time_unit.to_duration(self.wait_time)
    }

    pub fn lease(&self) -> Lease {
        Lease::from_option(self.lease_time.map(|t| self.time_unit.to_duration(t)))
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<()> {
        if self.lease_time == Some(0) {
            return Err(LockError::Config(
                "lock declaration validation failed: lease_time must be greater than 0 (omit it to rely on keep-alive)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn rescale_to_millis(&mut self) {
        if self.time_unit != TimeUnit::Milliseconds {
            self.wait_time = millis(self.wait_duration());
            self.lease_time = self
                .lease_time
                .map(|t| millis(self.time_unit.to_duration(t)));
            self.time_unit = TimeUnit::Milliseconds;
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
