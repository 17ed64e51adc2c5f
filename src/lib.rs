//! locksmith: declarative lock interception.
//!
//! A guarded operation carries a `LockDeclaration`. For every call the
//! `LockInterceptor` resolves a lock key from the declaration and the call's
//! arguments, opens a lock of the declared type on a `LockBackend`, makes a
//! single bounded acquisition attempt, runs the work only when the lock was
//! acquired, and releases it on every exit path iff the caller still owns it.
//!
//! # Modules
//!
//! - `declaration`: per-operation lock settings
//! - `invocation`: the call being guarded
//! - `key`: key templates and the Key Resolver
//! - `locks`: lock types, the backend seam, the dispatch table, reference backends
//! - `interceptor`: the acquire / run / release engine
//! - `config`: YAML configuration and wiring
//! - `events`: diagnostic events and sinks
//! - `scenario`: the bounded-counter scenario used by the demo and tests

pub mod config;
pub mod declaration;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod interceptor;
pub mod invocation;
pub mod key;
pub mod locks;
pub mod scenario;

#[cfg(test)]
mod test_support;
