//! Error types for locksmith.
//!
//! Uses thiserror for derive macros. Every variant maps to an exit code and
//! to a caller-facing message; contention failures surface the declaration's
//! failure message verbatim, configuration defects surface a generic signal.

use crate::exit_codes;
use thiserror::Error;

/// Message shown to callers for misconfiguration (resolution/dispatch defects).
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Why a lock key could not be derived for an invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyResolutionError {
    /// The key template is not syntactically well-formed.
    #[error("invalid lock key template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// The template evaluated to no value (null, undefined, or blank).
    #[error("lock key template '{template}' resolved to an empty value")]
    EmptyResolvedValue { template: String },

    /// The template binds parameters by name but the invocation exposes none.
    #[error("lock key template '{template}' needs parameter names, but {target}.{method} does not expose them")]
    MissingParameterNames {
        template: String,
        target: String,
        method: String,
    },

    /// The expression capability rejected the template.
    #[error("failed to evaluate lock key template '{template}': {reason}")]
    Evaluation { template: String, reason: String },
}

/// Main error type for lock interception.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock key could not be derived.
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),

    /// The backend does not provide the requested lock semantics.
    #[error("lock type '{lock_type}' is not supported by the {backend} backend")]
    UnsupportedLockOperation { lock_type: String, backend: String },

    /// The wait time elapsed without acquiring the lock.
    #[error("{0}")]
    NotAcquired(String),

    /// The acquisition wait was cancelled from outside.
    #[error("lock acquisition interrupted: {0}")]
    AcquisitionInterrupted(String),

    /// The lock backend failed.
    #[error("lock backend error: {0}")]
    Backend(String),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(String),
}

impl LockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::KeyResolution(_) => exit_codes::USER_ERROR,
            LockError::UnsupportedLockOperation { .. } => exit_codes::USER_ERROR,
            LockError::Config(_) => exit_codes::USER_ERROR,
            LockError::Backend(_) => exit_codes::USER_ERROR,
            LockError::NotAcquired(_) => exit_codes::LOCK_FAILURE,
            LockError::AcquisitionInterrupted(_) => exit_codes::INTERRUPTED,
        }
    }

    /// The text a caller of a guarded operation should see.
    ///
    /// Contention yields the configured failure message, interruption its
    /// cause; everything else indicates misconfiguration and is masked.
    pub fn user_message(&self) -> String {
        match self {
            LockError::NotAcquired(message) => message.clone(),
            LockError::AcquisitionInterrupted(_) => self.to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Whether this is the normal contention outcome.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::NotAcquired(_))
    }
}

/// Result type alias for locksmith operations.
pub type Result<T> = std::result::Result<T, LockError>;
