//! Implementation of the `locksmith demo` command.
//!
//! Runs the bounded-counter scenario against the configured backend and
//! reports the outcome. A lost or doubled update fails the command with
//! the work-failure exit code.

use crate::cli::{DemoArgs, DemoDirection};
use anyhow::bail;
use locksmith::config::Config;
use locksmith::error::LockError;
use locksmith::locks::acquire_handle;
use locksmith::scenario::{Direction, ScenarioOptions, run_scenario};
use std::time::Duration;

/// Execute the `locksmith demo` command.
pub fn cmd_demo(config: &Config, args: DemoArgs) -> anyhow::Result<()> {
    let direction = match args.direction {
        DemoDirection::Decrement => Direction::Decrement,
        DemoDirection::Increment => Direction::Increment,
    };
    if args.callers == 0 {
        bail!(LockError::Config(
            "--callers must be greater than 0".to_string()
        ));
    }
    let options = ScenarioOptions {
        callers: args.callers,
        start: args.start,
        floor: args.floor,
        ceiling: args.ceiling,
        lock_type: args.lock_type,
        wait: Duration::from_millis(args.wait_ms),
        pause: Duration::from_millis(args.pause_ms),
    };

    let interceptor = config.build_interceptor();
    // Fail before spawning callers if the backend lacks this lock type.
    acquire_handle(interceptor.backend(), options.lock_type, "demo")?;

    let report = run_scenario(&interceptor, direction, &options);

    println!(
        "Scenario: {} ({} callers, start {}, bounds {}..={}, lock {}, backend {})",
        direction.method(),
        report.callers,
        report.start,
        options.floor,
        options.ceiling,
        options.lock_type,
        interceptor.backend().name()
    );
    println!("  succeeded:    {:>4}", report.succeeded);
    println!("  rejected:     {:>4}", report.rejected);
    println!("  not acquired: {:>4}", report.not_acquired);
    println!("  errors:       {:>4}", report.errors);
    println!("  final value:  {:>4}", report.final_value);
    println!("  max overlap:  {:>4}", report.max_concurrency);

    if !report.is_consistent() {
        bail!(
            "counter invariant violated: {} successful updates from {} but final value is {}",
            report.succeeded,
            report.start,
            report.final_value
        );
    }
    if options.lock_type.is_exclusive() && report.max_concurrency > 1 {
        bail!(
            "mutual exclusion violated: {} callers updated the counter at once",
            report.max_concurrency
        );
    }
    Ok(())
}
