//! Interception Engine: run a unit of work under a declared lock.
//!
//! Per call the engine resolves the key, opens a handle of the declared
//! type, makes one bounded acquisition attempt, runs the work only if the
//! lock was acquired, and releases the lock on every exit path iff the
//! caller still owns it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use locksmith::declaration::LockDeclaration;
//! use locksmith::error::LockError;
//! use locksmith::interceptor::LockInterceptor;
//! use locksmith::invocation::InvocationContext;
//! use locksmith::locks::InMemoryBackend;
//!
//! let interceptor = LockInterceptor::builder(Arc::new(InMemoryBackend::new())).build();
//! let declaration = LockDeclaration::new("#sku");
//! let ctx = InvocationContext::new("InventoryService", "reserve").arg("sku", "A-1");
//!
//! let reserved = interceptor.run_under_lock(Some(&declaration), &ctx, || {
//!     Ok::<_, LockError>(1)
//! });
//! assert_eq!(reserved, Ok(1));
//! ```

use crate::declaration::LockDeclaration;
use crate::error::LockError;
use crate::events::{EventSink, LockEvent, LockEventAction, TracingSink};
use crate::invocation::InvocationContext;
use crate::key::KeyResolver;
use crate::locks::{HeldLock, Interrupt, Lease, LockBackend, ReleaseOutcome, acquire_handle};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;


/// Registry key for a guarded operation: `Type::method`.
pub fn registry_key(type_name: &str, method: &str) -> String {
    format!("{}::{}", type_name, method)
}

/// Wraps units of work in acquire / run / release.
///
/// Holds only immutable state, so one interceptor can be shared through an
/// `Arc` by any number of threads.
pub struct LockInterceptor {
    backend: Arc<dyn LockBackend>,
    resolver: KeyResolver,
    declarations: BTreeMap<String, LockDeclaration>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for LockInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockInterceptor")
            .field("backend", &self.backend.name())
            .field("resolver", &self.resolver)
            .field("declarations", &self.declarations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Builder for `LockInterceptor`.
pub struct LockInterceptorBuilder {
    backend: Arc<dyn LockBackend>,
    resolver: KeyResolver,
    declarations: BTreeMap<String, LockDeclaration>,
    sink: Arc<dyn EventSink>,
}

impl LockInterceptorBuilder {
    pub fn resolver(mut self, resolver: KeyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Register the declaration for `Type::method`.
    pub fn declaration(mut self, name: impl Into<String>, declaration: LockDeclaration) -> Self {
        self.declarations.insert(name.into(), declaration);
        self
    }

    pub fn declarations(mut self, declarations: BTreeMap<String, LockDeclaration>) -> Self {
        self.declarations.extend(declarations);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> LockInterceptor {
        LockInterceptor {
            backend: self.backend,
            resolver: self.resolver,
            declarations: self.declarations,
            sink: self.sink,
        }
    }
}

impl LockInterceptor {
    pub fn builder(backend: Arc<dyn LockBackend>) -> LockInterceptorBuilder {
        LockInterceptorBuilder {
            backend,
            resolver: KeyResolver::default(),
            declarations: BTreeMap::new(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn backend(&self) -> &dyn LockBackend {
        self.backend.as_ref()
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// The declaration registered for this call site, if any.
    pub fn declaration_for(&self, ctx: &InvocationContext) -> Option<&LockDeclaration> {
        self.declarations
            .get(&registry_key(&ctx.target.type_name, &ctx.method))
    }

    /// Run `work` under `declaration`.
    ///
    /// Returns the work's own result, or a `LockError` converted into `E`
    /// when the key cannot be resolved, the lock type is unsupported, the
    /// wait runs out (`NotAcquired` with the failure message), or the wait
    /// is interrupted. Without a declaration the work runs unlocked.
    pub fn run_under_lock<T, E, F>(
        &self,
        declaration: Option<&LockDeclaration>,
        ctx: &InvocationContext,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        self.run_under_lock_interruptible(declaration, ctx, &Interrupt::new(), work)
    }

    /// `run_under_lock`, with a signal that cancels the acquisition wait.
    pub fn run_under_lock_interruptible<T, E, F>(
        &self,
        declaration: Option<&LockDeclaration>,
        ctx: &InvocationContext,
        interrupt: &Interrupt,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        let Some(declaration) = declaration else {
            tracing::warn!(call = %ctx.call_site(), "no lock declaration for guarded call, running without a lock");
            self.sink.record(
                &LockEvent::new(LockEventAction::Unguarded)
                    .with_details(json!({
                        "call": ctx.call_site(),
                        "instance": ctx.target.instance,
                    })),
            );
            return work();
        };

        let held = self.acquire(declaration, ctx, interrupt)?;
        let result = work();
        drop(held);
        result
    }

    /// Run `work` under the declaration registered for `ctx`'s call site.
    pub fn run_registered<T, E, F>(&self, ctx: &InvocationContext, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        self.run_under_lock(self.declaration_for(ctx), ctx, work)
    }

    fn acquire(
        &self,
        declaration: &LockDeclaration,
        ctx: &InvocationContext,
        interrupt: &Interrupt,
    ) -> Result<HeldLock<'_>, LockError> {
        let key = self.resolver.resolve(declaration, ctx).inspect_err(|e| {
            tracing::warn!(call = %ctx.call_site(), error = %e, "failed to resolve lock key");
        })?;
        let lock_type = declaration.lock_type;
        let handle = acquire_handle(self.backend.as_ref(), lock_type, &key)?;

        let wait = declaration.wait_duration();
        let lease = declaration.lease();
        let event = |action| {
            LockEvent::new(action)
                .with_key(key.as_str())
                .with_lock_type(lock_type)
        };

        match handle.try_acquire(wait, lease, interrupt) {
            Ok(true) => {
                tracing::debug!(key = %key, lock_type = %lock_type, "lock acquired");
                self.sink.record(&event(LockEventAction::Acquired).with_details(json!({
                    "wait_ms": wait.as_millis() as u64,
                    "lease_ms": lease_millis(lease),
                    "fencing_token": handle.fencing_token(),
                    "instance": ctx.target.instance,
                })));
                Ok(handle.hold(self.sink.as_ref()))
            }
            Ok(false) => {
                tracing::debug!(key = %key, lock_type = %lock_type, wait_ms = wait.as_millis() as u64, "lock not acquired within wait time");
                self.sink.record(
                    &event(LockEventAction::Rejected)
                        .with_details(json!({
                            "wait_ms": wait.as_millis() as u64,
                            "instance": ctx.target.instance,
                        })),
                );
                Err(LockError::NotAcquired(declaration.failure_message.clone()))
            }
            Err(err @ LockError::AcquisitionInterrupted(_)) => {
                tracing::error!(key = %key, error = %err, "lock acquisition interrupted");
                // The backend may have granted the lock as the wait was cancelled.
                let released = if handle.is_owned_by_caller() {
                    match handle.release() {
                        Ok(outcome) => outcome == ReleaseOutcome::Released,
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "failed to release lock after interruption");
                            false
                        }
                    }
                } else {
                    false
                };
                self.sink.record(&event(LockEventAction::Interrupted).with_details(json!({
                    "cause": err.to_string(),
                    "released": released,
                })));
                Err(err)
            }
            Err(err) => Err(err),
        }
    }
}

fn lease_millis(lease: Lease) -> Value {
    match lease {
        Lease::Fixed(d) => json!(d.as_millis() as u64),
        Lease::KeepAlive => Value::Null,
    }
}
