//! Runtime values carried by component states, actions and configuration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single state, action or configuration value.
///
/// Numbers share one `f64` representation; whether a number must be whole
/// or bounded is a constraint of the [`Type`](crate::types::Type) it is
/// validated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Primitive kind of this value.
    #[must_use]
    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Bool(_) => Primitive::Boolean,
            Self::Number(_) => Primitive::Number,
            Self::Text(_) => Primitive::String,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a raw JSON value (typically driver configuration).
    ///
    /// Returns `None` for `null`, arrays and objects, which no [`Type`](crate::types::Type)
    /// accepts.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

/// Text is written verbatim (no quotes) so error messages read
/// `Wrong value 'abc' …` rather than `Wrong value '"abc"' …`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Number(n) => n.fmt(f),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Primitive kind shared by values, types and action handler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Boolean,
    Number,
    String,
}

impl Primitive {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Rust type usable as the single parameter of an action handler.
///
/// The builder compares [`PRIMITIVE`](Self::PRIMITIVE) with the primitive of
/// the declared member type, so a handler taking `bool` can never be bound to
/// a `range` action.
pub trait PrimitiveValue: Sized + Send + 'static {
    const PRIMITIVE: Primitive;

    /// Extract from an already validated value.
    fn from_value(value: &Value) -> Option<Self>;
}

impl PrimitiveValue for bool {
    const PRIMITIVE: Primitive = Primitive::Boolean;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl PrimitiveValue for f64 {
    const PRIMITIVE: Primitive = Primitive::Number;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_number()
    }
}

impl PrimitiveValue for i64 {
    const PRIMITIVE: Primitive = Primitive::Number;

    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_number()
            .filter(|n| n.fract() == 0.0 && n.abs() <= crate::types::MAX_SAFE_INTEGER)
            .map(|n| n as i64)
    }
}

impl PrimitiveValue for u8 {
    const PRIMITIVE: Primitive = Primitive::Number;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from_value(value: &Value) -> Option<Self> {
        value
            .as_number()
            .filter(|n| n.fract() == 0.0 && (0.0..=255.0).contains(n))
            .map(|n| n as u8)
    }
}

impl PrimitiveValue for String {
    const PRIMITIVE: Primitive = Primitive::String;

    fn from_value(value: &Value) -> Option<Self> {
        value.as_text().map(str::to_string)
    }
}

/// Name of the JSON kind of a raw configuration value, `undefined` when absent.
#[must_use]
pub fn json_kind(json: Option<&serde_json::Value>) -> &'static str {
    match json {
        None => "undefined",
        Some(serde_json::Value::Null) => "null",
        Some(serde_json::Value::Bool(_)) => "boolean",
        Some(serde_json::Value::Number(_)) => "number",
        Some(serde_json::Value::String(_)) => "string",
        Some(serde_json::Value::Array(_)) => "array",
        Some(serde_json::Value::Object(_)) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_whole_number_without_fraction() {
        assert_eq!(Value::Number(400.0).to_string(), "400");
        assert_eq!(Value::Number(3.5).to_string(), "3.5");
    }

    #[test]
    fn should_display_text_without_quotes() {
        assert_eq!(Value::from("abc").to_string(), "abc");
    }

    #[test]
    fn should_serialize_untagged() {
        assert_eq!(serde_json::to_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(serde_json::to_string(&Value::Number(21.5)).unwrap(), "21.5");
        assert_eq!(serde_json::to_string(&Value::from("on")).unwrap(), "\"on\"");
    }

    #[test]
    fn should_convert_scalar_json_only() {
        assert_eq!(
            Value::from_json(&serde_json::json!(42)),
            Some(Value::Number(42.0))
        );
        assert_eq!(Value::from_json(&serde_json::json!(null)), None);
        assert_eq!(Value::from_json(&serde_json::json!([1])), None);
    }

    #[test]
    fn should_name_json_kinds() {
        assert_eq!(json_kind(None), "undefined");
        assert_eq!(json_kind(Some(&serde_json::json!("x"))), "string");
        assert_eq!(json_kind(Some(&serde_json::json!(1))), "number");
        assert_eq!(json_kind(Some(&serde_json::json!({}))), "object");
    }

    #[test]
    fn should_extract_handler_parameters() {
        assert_eq!(i64::from_value(&Value::Number(12.0)), Some(12));
        assert_eq!(i64::from_value(&Value::Number(1.5)), None);
        assert_eq!(u8::from_value(&Value::Number(256.0)), None);
        assert_eq!(bool::from_value(&Value::Number(1.0)), None);
        assert_eq!(
            String::from_value(&Value::from("x")),
            Some("x".to_string())
        );
    }
}
