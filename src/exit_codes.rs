//! Exit code constants for the locksmith CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid configuration, unsupported lock type)
//! - 4: Lock not acquired within the wait time
//! - 5: Lock acquisition interrupted
//! - 6: The guarded work itself failed

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or key resolution failure.
pub const USER_ERROR: i32 = 1;

/// Lock acquisition failure: the lock was still held when the wait time ran out.
pub const LOCK_FAILURE: i32 = 4;

/// The acquisition wait was cancelled.
pub const INTERRUPTED: i32 = 5;

/// The guarded unit of work reported a domain failure.
pub const WORK_FAILURE: i32 = 6;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, USER_ERROR, LOCK_FAILURE, INTERRUPTED, WORK_FAILURE];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
