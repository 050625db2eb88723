//! Typed access to the raw JSON arguments of one tool invocation.
//!
//! Decoding is lenient for the `*_or` accessors: a field that is
//! absent or has the wrong JSON type yields the fallback. The `require_*`
//! accessors fail instead. Numbers decode through both the integer and the
//! floating accessors; integers read from a fractional number truncate.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Arguments passed to a tool handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    fields: Map<String, Value>,
}

impl ToolArgs {
    /// Wrap a raw arguments value. Anything but an object is treated as
    /// empty.
    pub fn new(raw: Value) -> Self {
        match raw {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Whether the caller supplied `key` at all, even as `null` or `false`.
    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    // ===== Required =====

    pub fn require_string(&self, key: &str) -> Result<String> {
        self.typed(key, "a string", |v| v.as_str().map(String::from))
    }

    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.typed(key, "an integer", as_i64)
    }

    pub fn require_f64(&self, key: &str) -> Result<f64> {
        self.typed(key, "a number", Value::as_f64)
    }

    pub fn require_bool(&self, key: &str) -> Result<bool> {
        self.typed(key, "a boolean", Value::as_bool)
    }

    // ===== Defaulted =====

    pub fn string_or(&self, key: &str, fallback: &str) -> String {
        self.optional_string(key)
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn i64_or(&self, key: &str, fallback: i64) -> i64 {
        self.fields.get(key).and_then(as_i64).unwrap_or(fallback)
    }

    pub fn f64_or(&self, key: &str, fallback: f64) -> f64 {
        self.fields
            .get(key)
            .and_then(Value::as_f64)
            .unwrap_or(fallback)
    }

    pub fn bool_or(&self, key: &str, fallback: bool) -> bool {
        self.fields
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(fallback)
    }

    /// The string value for `key`, if present and a string.
    pub fn optional_string(&self, key: &str) -> Option<String> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// String elements of an array field. Non-string elements are skipped;
    /// an absent or non-array field is empty.
    pub fn string_array(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn typed<T>(&self, key: &str, expected: &str, decode: impl Fn(&Value) -> Option<T>) -> Result<T> {
        let value = self
            .fields
            .get(key)
            .ok_or_else(|| Error::MissingField(key.to_string()))?;
        decode(value).ok_or_else(|| {
            Error::InvalidToolArguments(format!("field {} must be {}", key, expected))
        })
    }
}

impl From<Value> for ToolArgs {
    fn from(raw: Value) -> Self {
        Self::new(raw)
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().map(|n| i64::try_from(n).unwrap_or(i64::MAX)))
        .or_else(|| value.as_f64().map(|f| f as i64))
}
