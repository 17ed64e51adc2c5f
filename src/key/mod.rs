//! Key Resolver: derives the lock key for each guarded invocation.
//!
//! - `template`: the `#name.path` placeholder grammar
//! - `evaluator`: the swappable expression capability (`PathEvaluator` by default)
//! - `resolver`: `KeyResolver`, which applies prefix and default-key rules
//!
//! Resolution is deterministic: identical templates with identical argument
//! bindings always produce the same key.

mod evaluator;
mod resolver;
mod template;


pub use evaluator::{EvalError, ExpressionEvaluator, PathEvaluator};
pub use resolver::{DEFAULT_KEY_DELIMITER, DEFAULT_KEY_PREFIX, KeyResolver, validate_template};
pub use template::{KeyTemplate, PLACEHOLDER_MARKER, Segment, TemplateSyntaxError};
