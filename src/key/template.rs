//! Key template grammar.
//!
//! # Syntax
//!
//! - `#name` - the argument bound to parameter `name`
//! - `#name.field.0` - navigate into that argument (numeric segments index arrays)
//! - `##` - renders as a literal `#`
//!
//! Any other `#` is a syntax error. Text outside placeholders passes
//! through unchanged.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// The character that marks a template placeholder.
pub const PLACEHOLDER_MARKER: char = '#';

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"##|#([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)|#")
        .expect("Invalid key template regex")
});

/// A malformed key template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason} at position {position}")]
pub struct TemplateSyntaxError {
    pub position: usize,
    pub reason: String,
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder { variable: String, path: Vec<String> },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(text) => f.write_str(&text.replace('#', "##")),
            Segment::Placeholder { variable, path } => {
                write!(f, "#{}", variable)?;
                for part in path {
                    write!(f, ".{}", part)?;
                }
                Ok(())
            }
        }
    }
}

/// A parsed key template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    segments: Vec<Segment>,
}

impl KeyTemplate {
    /// Whether `template` contains placeholder syntax at all.
    pub fn is_template(template: &str) -> bool {
        template.contains(PLACEHOLDER_MARKER)
    }

    pub fn parse(template: &str) -> Result<Self, TemplateSyntaxError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for caps in TOKEN_REGEX.captures_iter(template) {
            let Some(token) = caps.get(0) else {
                continue;
            };
            literal.push_str(&template[last..token.start()]);
            last = token.end();

            if token.as_str() == "##" {
                literal.push(PLACEHOLDER_MARKER);
                continue;
            }

            let Some(expr) = caps.get(1) else {
                return Err(TemplateSyntaxError {
                    position: token.start(),
                    reason: "'#' must be followed by a parameter name (use '##' for a literal '#')"
                        .to_string(),
                });
            };

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let mut parts = expr.as_str().split('.').map(str::to_string);
            let variable = parts.next().unwrap_or_default();
            segments.push(Segment::Placeholder {
                variable,
                path: parts.collect(),
            });
        }

        literal.push_str(&template[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_placeholders(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(variable: &str, path: &[&str]) -> Segment {
        Segment::Placeholder {
            variable: variable.to_string(),
            path: path.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_placeholder() {
        let t = KeyTemplate::parse("#orderId").unwrap();
        assert_eq!(t.segments(), &[placeholder("orderId", &[])]);
    }

    #[test]
    fn test_mixed_literals_and_paths() {
        let t = KeyTemplate::parse("order-#order.id:#user.roles.0").unwrap();
        assert_eq!(
            t.segments(),
            &[
                Segment::Literal("order-".to_string()),
                placeholder("order", &["id"]),
                Segment::Literal(":".to_string()),
                placeholder("user", &["roles", "0"]),
            ]
        );
    }

    #[test]
    fn test_trailing_dot_is_literal() {
        let t = KeyTemplate::parse("#sku.").unwrap();
        assert_eq!(
            t.segments(),
            &[placeholder("sku", &[]), Segment::Literal(".".to_string())]
        );
    }

    #[test]
    fn test_escaped_marker() {
        let t = KeyTemplate::parse("tag##1").unwrap();
        assert_eq!(t.segments(), &[Segment::Literal("tag#1".to_string())]);
        assert!(!t.has_placeholders());
    }

    #[test]
    fn test_dangling_marker_is_rejected() {
        let err = KeyTemplate::parse("user:#").unwrap_err();
        assert_eq!(err.position, 5);

        assert!(KeyTemplate::parse("#1abc").is_err());
        assert!(KeyTemplate::parse("# name").is_err());
    }

    #[test]
    fn test_display_round_trips_source_syntax() {
        let source = "a##b-#x.y";
        let t = KeyTemplate::parse(source).unwrap();
        let rendered: String = t.segments().iter().map(|s| s.to_string()).collect();
        assert_eq!(rendered, source);
    }

    #[test]
    fn test_is_template() {
        assert!(KeyTemplate::is_template("#id"));
        assert!(!KeyTemplate::is_template("inventory"));
    }
}
