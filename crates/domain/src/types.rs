//! Value types: validation, display names and the byte-level codec.
//!
//! ## Wire encoding
//!
//! | Type | Display name | Encoding |
//! |------|--------------|----------|
//! | [`Type::Bool`] | `bool` | 1 byte, `0x00` / `0x01` |
//! | [`Type::Integer`] | `integer` | 8 bytes, `i64` little-endian |
//! | [`Type::Float`] | `float` | 8 bytes, `f64` little-endian |
//! | [`Type::Uint8`] | `uint8` | 1 byte |
//! | [`Type::Range`] | `range[min;max]` | 8 bytes, `i64` little-endian |
//! | [`Type::Enum`] | `enum[a,b,c]` | UTF-8 bytes |
//! | [`Type::Text`] | `text` | UTF-8 bytes |
//!
//! Widths and endianness are part of the bus protocol and must not change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CodecError, TypeError, TypeMismatchError};
use crate::value::{Primitive, Value};

/// Largest integer exactly representable by an `f64` (2^53 - 1).
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A primitive value type with its parameters.
///
/// Prefer the checked constructors [`Type::range`] and [`Type::enumeration`]
/// over building the parameterised variants directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    Integer,
    Float,
    Uint8,
    /// Whole numbers within inclusive bounds.
    Range { min: i64, max: i64 },
    /// Case-sensitive set of allowed strings, in declaration order.
    Enum(Vec<String>),
    Text,
}

impl Type {
    /// Inclusive integer range.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidRange`] when `min > max`.
    pub fn range(min: i64, max: i64) -> Result<Self, TypeError> {
        if min > max {
            return Err(TypeError::InvalidRange { min, max });
        }
        Ok(Self::Range { min, max })
    }

    /// Enumerated strings.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::EmptyEnum`] for an empty set, and
    /// [`TypeError::InvalidEnumValue`] for empty values or values containing
    /// characters reserved by the display name (`,` `[` `]`).
    pub fn enumeration<I, S>(values: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(TypeError::EmptyEnum);
        }
        if let Some(bad) = values
            .iter()
            .find(|v| v.is_empty() || v.contains([',', '[', ']']))
        {
            return Err(TypeError::InvalidEnumValue(bad.clone()));
        }
        Ok(Self::Enum(values))
    }

    /// Primitive kind of the values this type accepts.
    #[must_use]
    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Bool => Primitive::Boolean,
            Self::Integer | Self::Float | Self::Uint8 | Self::Range { .. } => Primitive::Number,
            Self::Enum(_) | Self::Text => Primitive::String,
        }
    }

    /// Human-readable, stable name (e.g. `range[-1;100]`).
    #[must_use]
    pub fn display_name(&self) -> String {
        self.to_string()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_)) | (Self::Text, Value::Text(_)) => true,
            (Self::Integer, Value::Number(n)) => is_safe_integer(*n),
            (Self::Float, Value::Number(n)) => n.is_finite(),
            (Self::Uint8, Value::Number(n)) => is_safe_integer(*n) && (0.0..=255.0).contains(n),
            (Self::Range { min, max }, Value::Number(n)) => {
                is_safe_integer(*n) && *n >= *min as f64 && *n <= *max as f64
            }
            (Self::Enum(values), Value::Text(s)) => values.iter().any(|v| v == s),
            _ => false,
        }
    }

    /// Validate, producing the standard mismatch error.
    ///
    /// # Errors
    ///
    /// Returns [`TypeMismatchError`] when [`validate`](Self::validate) is false.
    pub fn check(&self, value: &Value) -> Result<(), TypeMismatchError> {
        if self.validate(value) {
            Ok(())
        } else {
            Err(TypeMismatchError {
                value: value.to_string(),
                type_name: self.display_name(),
            })
        }
    }

    /// Value used for a state member that declares no initial value.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Integer | Self::Float | Self::Uint8 => Value::Number(0.0),
            Self::Range { min, max } => Value::Number(0_i64.max(*min).min(*max) as f64),
            Self::Enum(values) => Value::Text(values.first().cloned().unwrap_or_default()),
            Self::Text => Value::Text(String::new()),
        }
    }

    /// Encode a value for the bus.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Value`] if the value does not validate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        self.check(value)?;
        let bytes = match self {
            Self::Bool => value.as_bool().map(|b| vec![u8::from(b)]),
            Self::Integer | Self::Range { .. } => {
                value.as_number().map(|n| (n as i64).to_le_bytes().to_vec())
            }
            Self::Float => value.as_number().map(|n| n.to_le_bytes().to_vec()),
            Self::Uint8 => value.as_number().map(|n| vec![n as u8]),
            Self::Enum(_) | Self::Text => value.as_text().map(|s| s.as_bytes().to_vec()),
        };
        bytes.ok_or_else(|| self.malformed())
    }

    /// Decode a bus payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Length`] for a payload of the wrong width,
    /// [`CodecError::Malformed`] for bytes that are not a value of this type,
    /// and [`CodecError::Value`] if the decoded value fails validation
    /// (e.g. out of range).
    #[allow(clippy::cast_precision_loss)]
    pub fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let value = match self {
            Self::Bool => match self.fixed::<1>(bytes)? {
                [0] => Value::Bool(false),
                [1] => Value::Bool(true),
                _ => return Err(self.malformed()),
            },
            Self::Integer | Self::Range { .. } => {
                Value::Number(i64::from_le_bytes(self.fixed::<8>(bytes)?) as f64)
            }
            Self::Float => Value::Number(f64::from_le_bytes(self.fixed::<8>(bytes)?)),
            Self::Uint8 => Value::Number(f64::from(self.fixed::<1>(bytes)?[0])),
            Self::Enum(_) | Self::Text => Value::Text(
                String::from_utf8(bytes.to_vec()).map_err(|_| self.malformed())?,
            ),
        };
        self.check(&value)?;
        Ok(value)
    }

    fn fixed<const N: usize>(&self, bytes: &[u8]) -> Result<[u8; N], CodecError> {
        bytes.try_into().map_err(|_| CodecError::Length {
            type_name: self.display_name(),
            expected: N,
            actual: bytes.len(),
        })
    }

    fn malformed(&self) -> CodecError {
        CodecError::Malformed {
            type_name: self.display_name(),
        }
    }
}

fn is_safe_integer(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Integer => f.write_str("integer"),
            Self::Float => f.write_str("float"),
            Self::Uint8 => f.write_str("uint8"),
            Self::Range { min, max } => write!(f, "range[{min};{max}]"),
            Self::Enum(values) => write!(f, "enum[{}]", values.join(",")),
            Self::Text => f.write_str("text"),
        }
    }
}

impl FromStr for Type {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || TypeError::Unknown(s.to_string());
        match s {
            "bool" => return Ok(Self::Bool),
            "integer" => return Ok(Self::Integer),
            "float" => return Ok(Self::Float),
            "uint8" => return Ok(Self::Uint8),
            "text" => return Ok(Self::Text),
            _ => {}
        }
        if let Some(args) = s.strip_prefix("range[").and_then(|r| r.strip_suffix(']')) {
            let (min, max) = args.split_once(';').ok_or_else(unknown)?;
            let min = min.parse().map_err(|_| unknown())?;
            let max = max.parse().map_err(|_| unknown())?;
            return Self::range(min, max);
        }
        if let Some(args) = s.strip_prefix("enum[").and_then(|r| r.strip_suffix(']')) {
            return Self::enumeration(args.split(','));
        }
        Err(unknown())
    }
}

impl Serialize for Type {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Type {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn percent() -> Type {
        Type::range(0, 100).unwrap()
    }

    fn colors() -> Type {
        Type::enumeration(["red", "green", "blue"]).unwrap()
    }

    #[test]
    fn should_display_canonical_names() {
        assert_eq!(Type::Bool.display_name(), "bool");
        assert_eq!(Type::Float.display_name(), "float");
        assert_eq!(Type::range(-1, 100).unwrap().display_name(), "range[-1;100]");
        assert_eq!(
            Type::enumeration(["a", "b", "c"]).unwrap().display_name(),
            "enum[a,b,c]"
        );
    }

    #[test]
    fn should_validate_range_bounds_inclusively() {
        let t = percent();
        assert!(t.validate(&Value::Number(0.0)));
        assert!(t.validate(&Value::Number(100.0)));
        assert!(!t.validate(&Value::Number(-1.0)));
        assert!(!t.validate(&Value::Number(101.0)));
        assert!(!t.validate(&Value::Number(50.5)));
        assert!(!t.validate(&Value::Bool(true)));
    }

    #[test]
    fn should_validate_enum_membership_case_sensitively() {
        let t = colors();
        assert!(t.validate(&Value::from("red")));
        assert!(!t.validate(&Value::from("Red")));
        assert!(!t.validate(&Value::from("purple")));
    }

    #[test]
    fn should_reject_non_finite_floats() {
        assert!(Type::Float.validate(&Value::Number(-12.25)));
        assert!(!Type::Float.validate(&Value::Number(f64::NAN)));
        assert!(!Type::Float.validate(&Value::Number(f64::INFINITY)));
    }

    #[test]
    fn should_validate_uint8_and_integer() {
        assert!(Type::Uint8.validate(&Value::Number(255.0)));
        assert!(!Type::Uint8.validate(&Value::Number(256.0)));
        assert!(Type::Integer.validate(&Value::Number(-42.0)));
        assert!(!Type::Integer.validate(&Value::Number(0.5)));
        assert!(!Type::Integer.validate(&Value::Number(MAX_SAFE_INTEGER * 2.0)));
    }

    #[test]
    fn should_roundtrip_valid_values_through_codec() {
        let cases = [
            (Type::Bool, Value::Bool(true)),
            (Type::Bool, Value::Bool(false)),
            (Type::Integer, Value::Number(-9_000_000_000.0)),
            (Type::Float, Value::Number(3.5)),
            (Type::Uint8, Value::Number(200.0)),
            (Type::range(-1, 100).unwrap(), Value::Number(-1.0)),
            (colors(), Value::from("blue")),
            (Type::Text, Value::from("héllo")),
        ];
        for (t, v) in cases {
            let bytes = t.encode(&v).unwrap();
            assert_eq!(t.decode(&bytes).unwrap(), v, "type {t}");
        }
    }

    #[test]
    fn should_use_documented_widths() {
        assert_eq!(Type::Bool.encode(&Value::Bool(true)).unwrap(), vec![1]);
        assert_eq!(
            percent().encode(&Value::Number(1.0)).unwrap(),
            vec![1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            Type::Float.encode(&Value::Number(1.0)).unwrap(),
            1.0_f64.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn should_refuse_to_encode_invalid_value() {
        let err = percent().encode(&Value::Number(400.0)).unwrap_err();
        assert_eq!(err.to_string(), "Wrong value '400' for type 'range[0;100]'");
    }

    #[test]
    fn should_reject_malformed_payloads() {
        assert!(matches!(
            Type::Bool.decode(&[2]),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            Type::Float.decode(&[0, 1]),
            Err(CodecError::Length {
                expected: 8,
                actual: 2,
                ..
            })
        ));
        assert!(matches!(
            Type::Text.decode(&[0xff, 0xfe]),
            Err(CodecError::Malformed { .. })
        ));
        assert!(matches!(
            percent().decode(&400_i64.to_le_bytes()),
            Err(CodecError::Value(_))
        ));
    }

    #[test]
    fn should_report_display_name_in_mismatch() {
        let err = colors().check(&Value::from("pink")).unwrap_err();
        assert_eq!(err.to_string(), "Wrong value 'pink' for type 'enum[red,green,blue]'");
    }

    #[test]
    fn should_parse_display_names_back() {
        for t in [
            Type::Bool,
            Type::Integer,
            Type::Float,
            Type::Uint8,
            Type::Text,
            Type::range(-1, 100).unwrap(),
            colors(),
        ] {
            assert_eq!(t.display_name().parse::<Type>().unwrap(), t);
        }
        assert!(matches!(
            "range[5;1]".parse::<Type>(),
            Err(TypeError::InvalidRange { min: 5, max: 1 })
        ));
        assert!(matches!("blob".parse::<Type>(), Err(TypeError::Unknown(_))));
    }

    #[test]
    fn should_reject_invalid_constructor_parameters() {
        assert!(Type::range(10, 0).is_err());
        assert_eq!(
            Type::enumeration(Vec::<String>::new()),
            Err(TypeError::EmptyEnum)
        );
        assert!(Type::enumeration(["a,b"]).is_err());
    }

    #[test]
    fn should_compare_by_kind_and_parameters() {
        assert_eq!(percent(), Type::range(0, 100).unwrap());
        assert_ne!(percent(), Type::range(0, 99).unwrap());
    }

    #[test]
    fn should_pick_valid_defaults() {
        assert_eq!(
            Type::range(10, 20).unwrap().default_value(),
            Value::Number(10.0)
        );
        assert_eq!(colors().default_value(), Value::from("red"));
        for t in [Type::Bool, Type::Uint8, Type::Text, percent()] {
            assert!(t.validate(&t.default_value()));
        }
    }

    #[test]
    fn should_serialize_as_display_name() {
        let json = serde_json::to_string(&percent()).unwrap();
        assert_eq!(json, "\"range[0;100]\"");
        let parsed: Type = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, percent());
    }
}
