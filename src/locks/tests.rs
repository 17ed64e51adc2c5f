//! Tests for the locks subsystem.

use super::*;
use crate::error::LockError;
use crate::events::{LockEventAction, MemorySink};
use crate::test_support::{Script, ScriptedBackend};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const NO_WAIT: Duration = Duration::ZERO;
const LONG_WAIT: Duration = Duration::from_secs(5);

fn open(backend: &dyn LockBackend, lock_type: LockType, key: &str) -> LockHandle {
    acquire_handle(backend, lock_type, key).unwrap()
}

fn acquired(handle: &LockHandle, wait: Duration) -> bool {
    handle
        .try_acquire(wait, Lease::KeepAlive, &Interrupt::new())
        .unwrap()
}

// ============================================================================
// LockType
// ============================================================================

#[test]
fn test_lock_type_round_trips_through_str() {
    for lock_type in LockType::ALL {
        assert_eq!(lock_type.as_str().parse::<LockType>().unwrap(), lock_type);
    }
}

#[test]
fn test_unknown_lock_type_is_a_config_error() {
    let err = "reentrant".parse::<LockType>().unwrap_err();
    assert!(matches!(err, LockError::Config(_)));
    assert!(err.to_string().contains("reentrant"));
}

#[test]
fn test_lock_type_default_is_exclusive() {
    assert_eq!(LockType::default(), LockType::Exclusive);
}

#[test]
fn test_owners_are_unique() {
    let a = Owner::new();
    let b = Owner::new();
    assert_ne!(a, b);
    assert!(a.as_str().contains('@'));
}

#[test]
fn test_interrupt_is_shared_between_clones() {
    let interrupt = Interrupt::new();
    let other = interrupt.clone();
    assert!(interrupt.check("k").is_ok());

    other.interrupt();
    assert!(interrupt.is_interrupted());
    assert!(matches!(
        interrupt.check("k"),
        Err(LockError::AcquisitionInterrupted(_))
    ));
}

#[test]
fn test_wait_deadline_caps_unrepresentable_waits() {
    let now = Instant::now();
    assert_eq!(
        types::wait_deadline(now, Duration::from_millis(5)),
        now + Duration::from_millis(5)
    );
    assert!(types::wait_deadline(now, Duration::MAX) > now + Duration::from_secs(3600));
}

// ============================================================================
// InMemoryBackend
// ============================================================================

#[test]
fn test_memory_exclusive_blocks_second_owner() {
    let backend = InMemoryBackend::new();
    let first = open(&backend, LockType::Exclusive, "lock:a");
    let second = open(&backend, LockType::Exclusive, "lock:a");

    assert!(acquired(&first, NO_WAIT));
    assert!(first.is_owned_by_caller());
    assert!(!acquired(&second, Duration::from_millis(20)));
    assert!(!second.is_owned_by_caller());

    assert_eq!(first.release().unwrap(), ReleaseOutcome::Released);
    assert!(acquired(&second, NO_WAIT));
}

#[test]
fn test_memory_different_keys_do_not_contend() {
    let backend = InMemoryBackend::new();
    let a = open(&backend, LockType::Exclusive, "lock:order:1");
    let b = open(&backend, LockType::Exclusive, "lock:order:2");

    assert!(acquired(&a, NO_WAIT));
    assert!(acquired(&b, NO_WAIT));
    assert!(backend.is_locked("lock:order:1"));
    assert!(backend.is_locked("lock:order:2"));
}

#[test]
fn test_memory_waiter_acquires_after_release() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:w");
    assert!(acquired(&holder, NO_WAIT));

    let waiter_backend = backend.clone();
    let waiter = thread::spawn(move || {
        let handle = open(&waiter_backend, LockType::Exclusive, "lock:w");
        acquired(&handle, LONG_WAIT)
    });

    thread::sleep(Duration::from_millis(30));
    holder.release().unwrap();
    assert!(waiter.join().unwrap());
}

#[test]
#[serial]
fn test_memory_mutual_exclusion_for_exclusive_families() {
    for lock_type in [
        LockType::Exclusive,
        LockType::Fair,
        LockType::Spin,
        LockType::Fenced,
        LockType::WriteExclusive,
    ] {
        let backend = InMemoryBackend::with_poll_interval(Duration::from_millis(1));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let handle = open(&backend, lock_type, "lock:shared");
                    assert!(acquired(&handle, LONG_WAIT));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                    handle.release().unwrap();
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(
            max_inside.load(Ordering::SeqCst),
            1,
            "{} allowed concurrent holders",
            lock_type
        );
        assert!(!backend.is_locked("lock:shared"));
    }
}

#[test]
fn test_memory_readers_coexist_and_exclude_writer() {
    let backend = InMemoryBackend::new();
    let reader_a = open(&backend, LockType::ReadShared, "lock:doc");
    let reader_b = open(&backend, LockType::ReadShared, "lock:doc");
    let writer = open(&backend, LockType::WriteExclusive, "lock:doc");

    assert!(acquired(&reader_a, NO_WAIT));
    assert!(acquired(&reader_b, NO_WAIT));
    assert!(!acquired(&writer, Duration::from_millis(20)));

    reader_a.release().unwrap();
    assert!(!acquired(&writer, Duration::from_millis(20)));

    reader_b.release().unwrap();
    assert!(acquired(&writer, NO_WAIT));

    let late_reader = open(&backend, LockType::ReadShared, "lock:doc");
    assert!(!acquired(&late_reader, Duration::from_millis(20)));

    writer.release().unwrap();
    assert!(acquired(&late_reader, NO_WAIT));
}

#[test]
fn test_memory_two_writers_exclude_each_other() {
    let backend = InMemoryBackend::new();
    let first = open(&backend, LockType::WriteExclusive, "lock:doc");
    let second = open(&backend, LockType::WriteExclusive, "lock:doc");

    assert!(acquired(&first, NO_WAIT));
    assert!(!acquired(&second, Duration::from_millis(20)));
}

#[test]
#[serial]
fn test_memory_fair_lock_serves_waiters_in_arrival_order() {
    let backend = InMemoryBackend::with_poll_interval(Duration::from_millis(2));
    let gate = open(&backend, LockType::Fair, "lock:fifo");
    assert!(acquired(&gate, NO_WAIT));

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();
    for arrival in 0..5 {
        let backend = backend.clone();
        let order = Arc::clone(&order);
        waiters.push(thread::spawn(move || {
            let handle = open(&backend, LockType::Fair, "lock:fifo");
            assert!(acquired(&handle, LONG_WAIT));
            order.lock().unwrap().push(arrival);
            thread::sleep(Duration::from_millis(5));
            handle.release().unwrap();
        }));
        // Let this waiter enqueue before the next one arrives.
        thread::sleep(Duration::from_millis(40));
    }

    gate.release().unwrap();
    for waiter in waiters {
        waiter.join().unwrap();
    }
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_memory_cancelled_fair_waiter_leaves_the_queue() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Fair, "lock:q");
    assert!(acquired(&holder, NO_WAIT));

    let interrupt = Interrupt::new();
    interrupt.interrupt();
    let cancelled = open(&backend, LockType::Fair, "lock:q");
    assert!(
        cancelled
            .try_acquire(LONG_WAIT, Lease::KeepAlive, &interrupt)
            .is_err()
    );

    let timed_out = open(&backend, LockType::Fair, "lock:q");
    assert!(!acquired(&timed_out, Duration::from_millis(10)));

    holder.release().unwrap();
    let next = open(&backend, LockType::Fair, "lock:q");
    assert!(acquired(&next, NO_WAIT));
}

#[test]
fn test_memory_fenced_tokens_increase() {
    let backend = InMemoryBackend::new();
    let mut tokens = Vec::new();
    for _ in 0..3 {
        let handle = open(&backend, LockType::Fenced, "lock:fence");
        assert_eq!(handle.fencing_token(), None);
        assert!(acquired(&handle, NO_WAIT));
        tokens.push(handle.fencing_token().unwrap());
        handle.release().unwrap();
    }
    assert_eq!(tokens, vec![1, 2, 3]);
}

#[test]
fn test_memory_fixed_lease_expires() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:lease");
    assert!(
        holder
            .try_acquire(
                NO_WAIT,
                Lease::Fixed(Duration::from_millis(20)),
                &Interrupt::new()
            )
            .unwrap()
    );
    assert!(holder.is_owned_by_caller());

    thread::sleep(Duration::from_millis(50));
    assert!(!holder.is_owned_by_caller());

    let next = open(&backend, LockType::Exclusive, "lock:lease");
    assert!(acquired(&next, NO_WAIT));
    assert_eq!(holder.release().unwrap(), ReleaseOutcome::NotOwned);
    assert!(next.is_owned_by_caller());
}

#[test]
fn test_memory_forgets_keys_whose_leases_expired() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:gone");
    assert!(
        holder
            .try_acquire(
                NO_WAIT,
                Lease::Fixed(Duration::from_millis(5)),
                &Interrupt::new()
            )
            .unwrap()
    );
    assert_eq!(backend.tracked_keys(), 1);

    thread::sleep(Duration::from_millis(20));
    assert_eq!(holder.release().unwrap(), ReleaseOutcome::NotOwned);
    assert_eq!(backend.tracked_keys(), 0);
}

#[test]
fn test_memory_timed_out_waiters_leave_no_state() {
    let backend = InMemoryBackend::new();
    for lock_type in [LockType::Exclusive, LockType::Fair, LockType::Spin] {
        let holder = open(&backend, lock_type, "lock:busy");
        assert!(
            holder
                .try_acquire(
                    NO_WAIT,
                    Lease::Fixed(Duration::from_millis(60)),
                    &Interrupt::new()
                )
                .unwrap()
        );

        let waiter = open(&backend, lock_type, "lock:busy");
        assert!(!acquired(&waiter, Duration::from_millis(5)));
        thread::sleep(Duration::from_millis(100));

        let late = open(&backend, lock_type, "lock:busy");
        assert!(!late.is_owned_by_caller());
        assert_eq!(backend.tracked_keys(), 0, "{} left state behind", lock_type);
    }
}

#[test]
fn test_memory_unbounded_wait_is_interruptible() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:max");
    assert!(acquired(&holder, NO_WAIT));

    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    let waiter_backend = backend.clone();
    let waiter = thread::spawn(move || {
        let handle = open(&waiter_backend, LockType::Exclusive, "lock:max");
        handle.try_acquire(Duration::MAX, Lease::KeepAlive, &interrupt)
    });

    thread::sleep(Duration::from_millis(20));
    trigger.interrupt();
    assert!(matches!(
        waiter.join().unwrap(),
        Err(LockError::AcquisitionInterrupted(_))
    ));
}

#[test]
fn test_memory_keep_alive_lock_does_not_expire() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:keep");
    assert!(acquired(&holder, NO_WAIT));
    thread::sleep(Duration::from_millis(30));
    assert!(holder.is_owned_by_caller());
}

#[test]
fn test_memory_interrupt_aborts_wait() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:int");
    assert!(acquired(&holder, NO_WAIT));

    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    let waiter_backend = backend.clone();
    let started = Instant::now();
    let waiter = thread::spawn(move || {
        let handle = open(&waiter_backend, LockType::Exclusive, "lock:int");
        let result = handle.try_acquire(LONG_WAIT, Lease::KeepAlive, &interrupt);
        (result, handle.is_owned_by_caller())
    });

    thread::sleep(Duration::from_millis(30));
    trigger.interrupt();
    let (result, owned) = waiter.join().unwrap();

    assert!(matches!(result, Err(LockError::AcquisitionInterrupted(_))));
    assert!(!owned);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_memory_spin_lock_honours_interrupt() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Spin, "lock:spin");
    assert!(acquired(&holder, NO_WAIT));

    let interrupt = Interrupt::new();
    interrupt.interrupt();
    let waiter = open(&backend, LockType::Spin, "lock:spin");
    assert!(matches!(
        waiter.try_acquire(LONG_WAIT, Lease::KeepAlive, &interrupt),
        Err(LockError::AcquisitionInterrupted(_))
    ));
}

#[test]
fn test_memory_force_unlock_revokes_ownership() {
    let backend = InMemoryBackend::new();
    let holder = open(&backend, LockType::Exclusive, "lock:f");
    assert!(acquired(&holder, NO_WAIT));

    backend.force_unlock("lock:f").unwrap();
    assert!(!holder.is_owned_by_caller());
    assert!(!backend.is_locked("lock:f"));
}

// ============================================================================
// FileBackend
// ============================================================================

#[test]
fn test_file_name_escaping() {
    assert_eq!(file_name_for("lock:order/42"), "lock%3Aorder%2F42");
    assert_eq!(file_name_for("plain-key_1.x"), "plain-key_1.x");
}

#[test]
fn test_file_exclusive_acquire_and_release() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::new(temp_dir.path().join("locks"))
        .with_poll_interval(Duration::from_millis(5));

    let first = open(&backend, LockType::Exclusive, "lock:job");
    let second = open(&backend, LockType::Exclusive, "lock:job");

    assert!(acquired(&first, NO_WAIT));
    let path = backend.lock_path("lock:job");
    assert!(path.exists());

    let meta = LockMetadata::from_file(&path).unwrap();
    assert_eq!(meta.key, "lock:job");
    assert_eq!(meta.owner, first.owner().as_str());
    assert_eq!(meta.pid, Some(std::process::id()));
    assert!(!meta.is_expired());

    assert!(!acquired(&second, Duration::from_millis(20)));
    assert!(first.is_owned_by_caller());
    assert!(!second.is_owned_by_caller());

    assert_eq!(first.release().unwrap(), ReleaseOutcome::Released);
    assert!(!path.exists());
    assert!(acquired(&second, NO_WAIT));
}

#[test]
fn test_file_expired_lock_is_taken_over() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::new(temp_dir.path()).with_poll_interval(Duration::from_millis(5));

    let stale = open(&backend, LockType::Spin, "lock:stale");
    assert!(
        stale
            .try_acquire(
                NO_WAIT,
                Lease::Fixed(Duration::from_millis(10)),
                &Interrupt::new()
            )
            .unwrap()
    );
    thread::sleep(Duration::from_millis(30));
    assert!(!stale.is_owned_by_caller());

    let next = open(&backend, LockType::Spin, "lock:stale");
    assert!(acquired(&next, Duration::from_millis(100)));
    assert!(next.is_owned_by_caller());
    assert_eq!(stale.release().unwrap(), ReleaseOutcome::NotOwned);
    assert!(backend.lock_path("lock:stale").exists());
}

#[test]
fn test_file_unbounded_wait_on_free_key() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::new(temp_dir.path());

    let holder = open(&backend, LockType::Exclusive, "lock:max");
    assert!(acquired(&holder, Duration::MAX));
}

#[test]
fn test_file_without_metadata_blocks_until_abandoned() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::new(temp_dir.path())
        .with_poll_interval(Duration::from_millis(5))
        .with_keep_alive_lease(Duration::from_millis(150));
    let path = backend.lock_path("lock:crashed");
    std::fs::write(&path, "").unwrap();

    let fresh = open(&backend, LockType::Exclusive, "lock:crashed");
    assert!(!acquired(&fresh, Duration::from_millis(10)));

    thread::sleep(Duration::from_millis(200));
    let next = open(&backend, LockType::Exclusive, "lock:crashed");
    assert!(acquired(&next, Duration::from_millis(200)));
    let meta = LockMetadata::from_file(&path).unwrap();
    assert_eq!(meta.owner, next.owner().as_str());
}

#[test]
fn test_file_keep_alive_uses_configured_lease() {
    let temp_dir = TempDir::new().unwrap();
    let backend =
        FileBackend::new(temp_dir.path()).with_keep_alive_lease(Duration::from_millis(10));

    let holder = open(&backend, LockType::Exclusive, "lock:ka");
    assert!(acquired(&holder, NO_WAIT));
    thread::sleep(Duration::from_millis(30));
    assert!(!holder.is_owned_by_caller());
}

#[test]
fn test_file_backend_rejects_unsupported_families() {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::new(temp_dir.path());

    for lock_type in [
        LockType::Fair,
        LockType::Fenced,
        LockType::ReadShared,
        LockType::WriteExclusive,
    ] {
        let err = acquire_handle(&backend, lock_type, "lock:x").unwrap_err();
        match err {
            LockError::UnsupportedLockOperation {
                lock_type: requested,
                backend,
            } => {
                assert_eq!(requested, lock_type.as_str());
                assert_eq!(backend, "file");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

// ============================================================================
// Dispatch and HeldLock
// ============================================================================

#[test]
fn test_dispatch_opens_the_requested_family() {
    let script = Script::granting();
    let backend = ScriptedBackend::new(Arc::clone(&script));

    for lock_type in LockType::ALL {
        let handle = acquire_handle(&backend, lock_type, "lock:k").unwrap();
        assert_eq!(handle.lock_type(), lock_type);
        assert_eq!(handle.key(), "lock:k");
    }
    let opened: Vec<LockType> = script.opened().into_iter().map(|(t, _)| t).collect();
    assert_eq!(opened, LockType::ALL.to_vec());
}

#[test]
fn test_held_lock_releases_exactly_once_on_drop() {
    let script = Script::granting();
    let backend = ScriptedBackend::new(Arc::clone(&script));
    let sink = MemorySink::new();

    let handle = open(&backend, LockType::Exclusive, "lock:once");
    assert!(acquired(&handle, NO_WAIT));
    {
        let _held = handle.hold(&sink);
    }

    assert_eq!(script.releases(), 1);
    assert_eq!(sink.count(LockEventAction::Released), 1);
}

#[test]
fn test_held_lock_manual_release_does_not_release_again_on_drop() {
    let script = Script::granting();
    let backend = ScriptedBackend::new(Arc::clone(&script));
    let sink = MemorySink::new();

    let handle = open(&backend, LockType::Exclusive, "lock:manual");
    assert!(acquired(&handle, NO_WAIT));
    let held = handle.hold(&sink);
    assert_eq!(held.release().unwrap(), ReleaseOutcome::Released);

    assert_eq!(script.releases(), 1);
}

#[test]
fn test_held_lock_skips_release_when_ownership_lost() {
    let script = Script::granting();
    let backend = ScriptedBackend::new(Arc::clone(&script));
    let sink = MemorySink::new();

    let handle = open(&backend, LockType::Exclusive, "lock:lost");
    assert!(acquired(&handle, NO_WAIT));
    let held = handle.hold(&sink);
    script.lose_ownership();
    drop(held);

    assert_eq!(script.releases(), 0);
    assert_eq!(sink.count(LockEventAction::OwnershipLost), 1);
    assert_eq!(sink.count(LockEventAction::Released), 0);
}

#[test]
fn test_held_lock_reports_release_failure() {
    let script = Script::granting();
    script.fail_release.store(true, Ordering::SeqCst);
    let backend = ScriptedBackend::new(Arc::clone(&script));
    let sink = MemorySink::new();

    let handle = open(&backend, LockType::Exclusive, "lock:fail");
    assert!(acquired(&handle, NO_WAIT));
    drop(handle.hold(&sink));

    assert_eq!(script.releases(), 1);
    assert_eq!(sink.count(LockEventAction::ReleaseFailed), 1);
}
