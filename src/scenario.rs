//! Bounded-counter scenario.
//!
//! A stock counter that may not leave `[floor, ceiling]`, changed by many
//! concurrent callers through a `LockInterceptor`. The counter does an
//! unsynchronized read, pause, write on purpose: without the lock,
//! overlapping callers lose updates, so the final value shows whether
//! mutual exclusion held.

use crate::declaration::LockDeclaration;
use crate::error::LockError;
use crate::interceptor::LockInterceptor;
use crate::invocation::InvocationContext;
use crate::locks::LockType;
use std::sync::Barrier;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Type name used in the scenario's invocation contexts.
pub const SCENARIO_TARGET: &str = "StockService";

/// Outcome of one guarded counter update that did not apply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CounterError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("sold out")]
    SoldOut,

    #[error("limit exceeded")]
    LimitExceeded,
}

/// Which way callers move the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Decrement,
    Increment,
}

impl Direction {
    pub fn method(&self) -> &'static str {
        match self {
            Direction::Decrement => "decrement",
            Direction::Increment => "increment",
        }
    }
}

/// A shared counter with a floor and a ceiling, guarded externally.
#[derive(Debug)]
pub struct BoundedCounter {
    value: AtomicI64,
    floor: i64,
    ceiling: i64,
    pause: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl BoundedCounter {
    pub fn new(start: i64, floor: i64, ceiling: i64) -> Self {
        Self {
            value: AtomicI64::new(start),
            floor,
            ceiling,
            pause: Duration::from_millis(1),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Time spent between reading and writing the value.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    /// Highest number of callers ever inside an update at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn decrement(&self) -> Result<i64, CounterError> {
        self.update(-1)
    }

    pub fn increment(&self) -> Result<i64, CounterError> {
        self.update(1)
    }

    fn update(&self, delta: i64) -> Result<i64, CounterError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let current = self.value.load(Ordering::SeqCst);
        let next = current + delta;
        let result = if next < self.floor {
            Err(CounterError::SoldOut)
        } else if next > self.ceiling {
            Err(CounterError::LimitExceeded)
        } else {
            std::thread::sleep(self.pause);
            self.value.store(next, Ordering::SeqCst);
            Ok(next)
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Parameters for `run_scenario`.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub callers: usize,
    pub start: i64,
    pub floor: i64,
    pub ceiling: i64,
    pub lock_type: LockType,
    pub wait: Duration,
    pub pause: Duration,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            callers: 20,
            start: 10,
            floor: 0,
            ceiling: 20,
            lock_type: LockType::Exclusive,
            wait: Duration::from_secs(3),
            pause: Duration::from_millis(1),
        }
    }
}

impl ScenarioOptions {
    /// The declaration every caller runs under; all callers share one key.
    pub fn declaration(&self, direction: Direction) -> LockDeclaration {
        LockDeclaration::new(format!("stock:{}", direction.method()))
            .with_wait_time(self.wait)
            .with_lock_type(self.lock_type)
    }
}

/// Tally of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub direction: Direction,
    pub callers: usize,
    pub succeeded: usize,
    /// Domain rejections (sold out or limit exceeded).
    pub rejected: usize,
    /// Callers that gave up waiting for the lock.
    pub not_acquired: usize,
    /// Any other lock failure (misconfiguration or interruption).
    pub errors: usize,
    pub start: i64,
    pub final_value: i64,
    pub max_concurrency: usize,
}

impl ScenarioReport {
    /// Whether every successful update is reflected in the final value.
    pub fn is_consistent(&self) -> bool {
        let applied = i64::try_from(self.succeeded).unwrap_or(i64::MAX);
        let expected = match self.direction {
            Direction::Decrement => self.start - applied,
            Direction::Increment => self.start + applied,
        };
        expected == self.final_value
    }
}

/// Release `options.callers` threads at once, each making one guarded update.
pub fn run_scenario(
    interceptor: &LockInterceptor,
    direction: Direction,
    options: &ScenarioOptions,
) -> ScenarioReport {
    let counter = BoundedCounter::new(options.start, options.floor, options.ceiling)
        .with_pause(options.pause);
    let declaration = options.declaration(direction);
    let barrier = Barrier::new(options.callers);

    let outcomes: Vec<Result<i64, CounterError>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..options.callers)
            .map(|caller| {
                let counter = &counter;
                let declaration = &declaration;
                let barrier = &barrier;
                scope.spawn(move || {
                    let ctx = InvocationContext::new(SCENARIO_TARGET, direction.method())
                        .arg("caller", caller);
                    barrier.wait();
                    interceptor.run_under_lock(Some(declaration), &ctx, || match direction {
                        Direction::Decrement => counter.decrement(),
                        Direction::Increment => counter.increment(),
                    })
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|w| {
                w.join().unwrap_or_else(|_| {
                    Err(CounterError::Lock(LockError::Backend(
                        "scenario caller panicked".to_string(),
                    )))
                })
            })
            .collect()
    });

    let mut report = ScenarioReport {
        direction,
        callers: options.callers,
        succeeded: 0,
        rejected: 0,
        not_acquired: 0,
        errors: 0,
        start: options.start,
        final_value: counter.value(),
        max_concurrency: counter.max_concurrency(),
    };
    for outcome in &outcomes {
        match outcome {
            Ok(_) => report.succeeded += 1,
            Err(CounterError::SoldOut | CounterError::LimitExceeded) => report.rejected += 1,
            Err(CounterError::Lock(e)) if e.is_contention() => report.not_acquired += 1,
            Err(CounterError::Lock(_)) => report.errors += 1,
        }
    }

    tracing::debug!(
        direction = direction.method(),
        succeeded = report.succeeded,
        rejected = report.rejected,
        not_acquired = report.not_acquired,
        final_value = report.final_value,
        "scenario finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::InMemoryBackend;
    use serial_test::serial;
    use std::sync::Arc;

    fn interceptor() -> LockInterceptor {
        LockInterceptor::builder(Arc::new(InMemoryBackend::new())).build()
    }

    #[test]
    fn test_counter_respects_bounds() {
        let counter = BoundedCounter::new(1, 0, 2).with_pause(Duration::ZERO);
        assert_eq!(counter.decrement(), Ok(0));
        assert_eq!(counter.decrement(), Err(CounterError::SoldOut));
        assert_eq!(counter.increment(), Ok(1));
        assert_eq!(counter.increment(), Ok(2));
        assert_eq!(counter.increment(), Err(CounterError::LimitExceeded));
        assert_eq!(counter.max_concurrency(), 1);
    }

    #[test]
    #[serial]
    fn test_twenty_decrements_from_ten_sell_out_exactly() {
        let report = run_scenario(&interceptor(), Direction::Decrement, &ScenarioOptions::default());

        assert_eq!(report.succeeded, 10);
        assert_eq!(report.rejected + report.not_acquired, 10);
        assert_eq!(report.errors, 0);
        assert_eq!(report.final_value, 0);
        assert_eq!(report.max_concurrency, 1);
        assert!(report.is_consistent());
    }

    #[test]
    #[serial]
    fn test_twenty_increments_from_ten_reach_the_cap_exactly() {
        let report = run_scenario(&interceptor(), Direction::Increment, &ScenarioOptions::default());

        assert_eq!(report.succeeded, 10);
        assert_eq!(report.rejected + report.not_acquired, 10);
        assert_eq!(report.final_value, 20);
        assert_eq!(report.max_concurrency, 1);
        assert!(report.is_consistent());
    }

    #[test]
    #[serial]
    fn test_every_exclusive_family_serializes_the_counter() {
        for lock_type in [
            LockType::Exclusive,
            LockType::Fair,
            LockType::Spin,
            LockType::Fenced,
            LockType::WriteExclusive,
        ] {
            let options = ScenarioOptions {
                lock_type,
                callers: 8,
                start: 8,
                ..ScenarioOptions::default()
            };
            let report = run_scenario(&interceptor(), Direction::Decrement, &options);
            assert_eq!(report.succeeded, 8, "{}", lock_type);
            assert_eq!(report.final_value, 0, "{}", lock_type);
            assert_eq!(report.max_concurrency, 1, "{}", lock_type);
        }
    }

    #[test]
    #[serial]
    fn test_short_wait_rejects_with_failure_message() {
        let options = ScenarioOptions {
            callers: 4,
            wait: Duration::ZERO,
            pause: Duration::from_millis(100),
            ..ScenarioOptions::default()
        };
        let report = run_scenario(&interceptor(), Direction::Decrement, &options);

        assert!(report.succeeded >= 1);
        assert!(report.not_acquired >= 1);
        assert_eq!(report.succeeded + report.not_acquired, 4);
        assert!(report.is_consistent());
    }
}
