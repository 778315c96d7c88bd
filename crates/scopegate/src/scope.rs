//! Token Scopes
//!
//! A scope is either one opaque identifier or an ordered list of them. The
//! cache key for a scope keeps the caller's order exactly: `["a", "b"]` and
//! `["b", "a"]` are different keys.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{AppError, AppResult};

/// Separator between list elements in a cache key
pub const KEY_SEPARATOR: &str = ":";

/// Permission scope(s) a token is requested for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scope {
    Single(String),
    List(Vec<String>),
}

impl Scope {
    /// Validate an untyped value.
    ///
    /// Only a string or an array whose elements are all strings is accepted.
    pub fn from_value(value: &Value) -> AppResult<Self> {
        match value {
            Value::String(s) => Ok(Scope::Single(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(String::from).ok_or_else(|| {
                        AppError::invalid_argument(format!(
                            "scope list elements must be strings, got {}",
                            json_type(item)
                        ))
                    })
                })
                .collect::<AppResult<Vec<_>>>()
                .map(Scope::List),
            other => Err(AppError::invalid_argument(format!(
                "wants scope should be string or array, got {}",
                json_type(other)
            ))),
        }
    }

    /// Cache key for this scope
    pub fn cache_key(&self) -> String {
        match self {
            Scope::Single(s) => s.clone(),
            Scope::List(items) => items.join(KEY_SEPARATOR),
        }
    }

    /// Scope elements in order
    pub fn as_slice(&self) -> &[String] {
        match self {
            Scope::Single(s) => std::slice::from_ref(s),
            Scope::List(items) => items,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        Scope::Single(s.to_string())
    }
}

impl From<String> for Scope {
    fn from(s: String) -> Self {
        Scope::Single(s)
    }
}

impl From<Vec<String>> for Scope {
    fn from(items: Vec<String>) -> Self {
        Scope::List(items)
    }
}

impl<const N: usize> From<[&str; N]> for Scope {
    fn from(items: [&str; N]) -> Self {
        Scope::List(items.iter().map(|s| s.to_string()).collect())
    }
}

impl TryFrom<Value> for Scope {
    type Error = AppError;

    fn try_from(value: Value) -> AppResult<Self> {
        Scope::from_value(&value)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
