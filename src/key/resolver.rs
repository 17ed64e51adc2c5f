//! Lock key derivation.

use super::evaluator::{EvalError, ExpressionEvaluator, PathEvaluator};
use super::template::{KeyTemplate, Segment};
use crate::declaration::LockDeclaration;
use crate::error::KeyResolutionError;
use crate::invocation::InvocationContext;
use std::fmt;
use std::sync::Arc;

/// Namespace prepended to every lock key.
pub const DEFAULT_KEY_PREFIX: &str = "lock:";

/// Separator between type and method in derived keys.
pub const DEFAULT_KEY_DELIMITER: &str = ":";

/// Derives the concrete lock key for one invocation.
#[derive(Clone)]
pub struct KeyResolver {
    prefix: String,
    delimiter: String,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("prefix", &self.prefix)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX, DEFAULT_KEY_DELIMITER)
    }
}

impl KeyResolver {
    pub fn new(prefix: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: delimiter.into(),
            evaluator: Arc::new(PathEvaluator),
        }
    }

    /// Swap the expression capability used for `#` templates.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Resolve the lock key for `ctx` under `declaration`.
    ///
    /// - empty template: `prefix + Type + delimiter + method`
    /// - no `#`: the template verbatim, prefixed
    /// - otherwise: the template evaluated against the call's named arguments
    pub fn resolve(
        &self,
        declaration: &LockDeclaration,
        ctx: &InvocationContext,
    ) -> Result<String, KeyResolutionError> {
        let template = declaration.key.as_str();

        if template.is_empty() {
            let key = format!(
                "{}{}{}{}",
                self.prefix, ctx.target.type_name, self.delimiter, ctx.method
            );
            tracing::debug!(key = %key, call = %ctx.call_site(), "derived default lock key");
            return Ok(key);
        }

        let value = if KeyTemplate::is_template(template) {
            self.evaluate(template, ctx)?
        } else {
            template.to_string()
        };

        if value.trim().is_empty() {
            return Err(KeyResolutionError::EmptyResolvedValue {
                template: template.to_string(),
            });
        }

        let key = format!("{}{}", self.prefix, value);
        tracing::debug!(key = %key, template, call = %ctx.call_site(), "resolved lock key");
        Ok(key)
    }

    fn evaluate(&self, template: &str, ctx: &InvocationContext) -> Result<String, KeyResolutionError> {
        let parsed = validate_template(template)?;

        // Escapes only; nothing to bind.
        if !parsed.has_placeholders() {
            return Ok(parsed
                .segments()
                .iter()
                .filter_map(|s| match s {
                    Segment::Literal(text) => Some(text.as_str()),
                    Segment::Placeholder { .. } => None,
                })
                .collect());
        }

        let bindings = ctx.bindings(template)?;
        match self.evaluator.evaluate(template, &bindings) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(KeyResolutionError::EmptyResolvedValue {
                template: template.to_string(),
            }),
            Err(EvalError::Syntax(reason)) => Err(KeyResolutionError::InvalidTemplate {
                template: template.to_string(),
                reason,
            }),
            Err(e) => Err(KeyResolutionError::Evaluation {
                template: template.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Check that a `#` template is well-formed.
pub fn validate_template(template: &str) -> Result<KeyTemplate, KeyResolutionError> {
    KeyTemplate::parse(template).map_err(|e| KeyResolutionError::InvalidTemplate {
        template: template.to_string(),
        reason: e.to_string(),
    })
}
