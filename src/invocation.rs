//! Invocation context: the concrete call a lock is taken for.
//!
//! Only used to derive the default key or to bind template variables;
//! nothing here outlives the call.

use crate::error::{KeyResolutionError, LockError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Named argument values a key template is evaluated against.
pub type Bindings = Map<String, Value>;

/// Identity of the object a guarded method is called on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetIdentity {
    /// Type name, used in default keys (e.g. `InventoryService`).
    pub type_name: String,
    /// Instance identity, if the caller has one.
    pub instance: Option<String>,
}

/// One call to a guarded operation.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub target: TargetIdentity,
    pub method: String,
    /// Parameter names in declaration order; `None` when the call site
    /// only exposes positional arguments.
    pub parameter_names: Option<Vec<String>>,
    pub arguments: Vec<Value>,
}

impl InvocationContext {
    pub fn new(type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            target: TargetIdentity {
                type_name: type_name.into(),
                instance: None,
            },
            method: method.into(),
            parameter_names: Some(Vec::new()),
            arguments: Vec::new(),
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.target.instance = Some(instance.into());
        self
    }

    /// Append a named argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameter_names
            .get_or_insert_with(Vec::new)
            .push(name.into());
        self.arguments.push(value.into());
        self
    }

    /// Append a named argument serialized from any `Serialize` value.
    pub fn arg_serialized<T: Serialize>(self, name: impl Into<String>, value: &T) -> Result<Self> {
        let name = name.into();
        let value = serde_json::to_value(value).map_err(|e| {
            LockError::Config(format!("failed to serialize argument '{}': {}", name, e))
        })?;
        Ok(self.arg(name, value))
    }

    /// Replace the arguments with unnamed positional values.
    pub fn positional(mut self, values: Vec<Value>) -> Self {
        self.parameter_names = None;
        self.arguments = values;
        self
    }

    /// `Type.method`, for logs and errors.
    pub fn call_site(&self) -> String {
        format!("{}.{}", self.target.type_name, self.method)
    }

    /// Bind each parameter name to its positional argument.
    ///
    /// Only called for templates with placeholders, so a call without any
    /// named parameter fails, as does a name count that does not match the
    /// argument count.
    pub fn bindings(&self, template: &str) -> std::result::Result<Bindings, KeyResolutionError> {
        let missing = || KeyResolutionError::MissingParameterNames {
            template: template.to_string(),
            target: self.target.type_name.clone(),
            method: self.method.clone(),
        };

        let names = self.parameter_names.as_ref().ok_or_else(missing)?;
        if names.is_empty() || names.len() != self.arguments.len() {
            return Err(missing());
        }

        Ok(names
            .iter()
            .cloned()
            .zip(self.arguments.iter().cloned())
            .collect())
    }
}
