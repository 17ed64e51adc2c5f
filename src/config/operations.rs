//! Config loading, validation, and wiring operations.

use super::model::Config;
use super::types::BackendKind;
use crate::error::{LockError, Result};
use crate::events::{EventSink, NdjsonSink, TracingSink};
use crate::interceptor::LockInterceptor;
use crate::key::{KeyResolver, KeyTemplate, validate_template};
use crate::locks::{FileBackend, InMemoryBackend, LockBackend, acquire_handle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(LockError::Config)` - Read or parse error, or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            LockError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| LockError::Config(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| LockError::Config(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `key_prefix` and `key_delimiter` must be non-empty
    /// - `backend.poll_interval_ms` and `backend.keep_alive_lease_secs` must be positive
    /// - declaration names must have the form `Type::method`
    /// - each declaration must be valid and its key template must parse
    /// - with the file backend, declarations may only use lock types it supports
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.is_empty() {
            return Err(LockError::Config(
                "config validation failed: key_prefix must be non-empty".to_string(),
            ));
        }

        if self.key_delimiter.is_empty() {
            return Err(LockError::Config(
                "config validation failed: key_delimiter must be non-empty".to_string(),
            ));
        }

        if self.backend.poll_interval_ms == 0 {
            return Err(LockError::Config(
                "config validation failed: backend.poll_interval_ms must be greater than 0"
                    .to_string(),
            ));
        }

        if self.backend.keep_alive_lease_secs == 0 {
            return Err(LockError::Config(
                "config validation failed: backend.keep_alive_lease_secs must be greater than 0"
                    .to_string(),
            ));
        }

        let backend = self.build_backend();
        for (name, declaration) in &self.declarations {
            let well_formed = name
                .split_once("::")
                .is_some_and(|(ty, method)| !ty.is_empty() && !method.is_empty());
            if !well_formed {
                return Err(LockError::Config(format!(
                    "config validation failed: declaration '{}' must be named 'Type::method'",
                    name
                )));
            }

            declaration.validate().map_err(|e| {
                LockError::Config(format!("declaration '{}': {}", name, e))
            })?;

            if KeyTemplate::is_template(&declaration.key) {
                validate_template(&declaration.key).map_err(|e| {
                    LockError::Config(format!(
                        "config validation failed: declaration '{}': {}",
                        name, e
                    ))
                })?;
            }

            // Opening a handle is side-effect free; it only checks the lock family.
            if let Err(e) = acquire_handle(backend.as_ref(), declaration.lock_type, name) {
                return Err(LockError::Config(format!(
                    "config validation failed: declaration '{}': {}",
                    name, e
                )));
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.backend.poll_interval_ms)
    }

    /// Construct the configured lock backend.
    pub fn build_backend(&self) -> Arc<dyn LockBackend> {
        match self.backend.kind {
            BackendKind::Memory => Arc::new(InMemoryBackend::with_poll_interval(self.poll_interval())),
            BackendKind::File => Arc::new(
                FileBackend::new(&self.backend.lock_dir)
                    .with_poll_interval(self.poll_interval())
                    .with_keep_alive_lease(Duration::from_secs(self.backend.keep_alive_lease_secs)),
            ),
        }
    }

    pub fn build_resolver(&self) -> KeyResolver {
        KeyResolver::new(&self.key_prefix, &self.key_delimiter)
    }

    /// The NDJSON sink when `events_file` is set, otherwise tracing.
    pub fn build_sink(&self) -> Arc<dyn EventSink> {
        match &self.events_file {
            Some(path) => Arc::new(NdjsonSink::new(path)),
            None => Arc::new(TracingSink),
        }
    }

    /// Wire backend, resolver, declaration registry and event sink.
    pub fn build_interceptor(&self) -> LockInterceptor {
        LockInterceptor::builder(self.build_backend())
            .resolver(self.build_resolver())
            .declarations(self.declarations.clone())
            .sink(self.build_sink())
            .build()
    }
}
