//! Pluggable expression evaluation for key templates.
//!
//! The resolver only needs "evaluate this template against these named
//! values". `PathEvaluator` does variable substitution and dotted
//! navigation over JSON values; anything richer can be plugged in through
//! `ExpressionEvaluator`.

use super::template::{KeyTemplate, Segment};
use crate::invocation::Bindings;
use serde_json::Value;
use thiserror::Error;

/// Why an expression could not be evaluated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The template does not follow the evaluator's syntax.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A placeholder resolved to an object or array instead of a scalar.
    #[error("'{expression}' does not resolve to a scalar value")]
    NonScalar { expression: String },

    /// Any other evaluator-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Evaluates a key template against named argument values.
pub trait ExpressionEvaluator: Send + Sync {
    /// Returns `Ok(None)` when the template has no value for these bindings.
    fn evaluate(&self, template: &str, bindings: &Bindings) -> Result<Option<String>, EvalError>;
}

/// Substitutes `#name.path` placeholders with scalar JSON values.
///
/// Strings render without quotes, numbers and booleans through `Display`.
/// Null, unbound variables and missing fields mean "no value".
#[derive(Debug, Clone, Copy, Default)]
pub struct PathEvaluator;

impl ExpressionEvaluator for PathEvaluator {
    fn evaluate(&self, template: &str, bindings: &Bindings) -> Result<Option<String>, EvalError> {
        let parsed = KeyTemplate::parse(template).map_err(|e| EvalError::Syntax(e.to_string()))?;

        let mut out = String::with_capacity(template.len());
        for segment in parsed.segments() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder { variable, path } => {
                    let Some(value) = lookup(bindings.get(variable), path) else {
                        return Ok(None);
                    };
                    match value {
                        Value::Null => return Ok(None),
                        Value::String(s) => out.push_str(s),
                        Value::Number(n) => out.push_str(&n.to_string()),
                        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
                        Value::Array(_) | Value::Object(_) => {
                            return Err(EvalError::NonScalar {
                                expression: segment.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(Some(out))
    }
}

fn lookup<'a>(root: Option<&'a Value>, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root?, |value, part| match value {
        Value::Object(map) => map.get(part),
        Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
