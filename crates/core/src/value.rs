//! Property values stored in rows
//!
//! A row carries an ordered bag of named properties. Each property holds one
//! [`Value`], mirroring the primitive property types of a partitioned table
//! service.
//!
//! ## Type Rules
//!
//! - No implicit type coercions: `Int(1) != Float(1.0)`
//! - `Bytes` are not `String`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named properties of a row, ordered by name
pub type Properties = BTreeMap<String, Value>;

/// A single property value
///
/// Equality is structural with IEEE-754 semantics for `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// Double-precision float
    Float(f64),
    /// UTF-8 text
    String(String),
    /// Binary blob
    Bytes(Vec<u8>),
}

impl Value {
    /// Name of the variant, as used in `PropertyType` errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
        }
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        *self == Value::Null
    }

    /// The boolean, if this is a `Bool`
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// The integer, if this is an `Int`
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// The float, if this is a `Float` (an `Int` is not widened)
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(x) = self {
            Some(*x)
        } else {
            None
        }
    }

    /// The text, if this is a `String`
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }

    /// The blob, if this is `Bytes`
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(bytes) = self {
            Some(bytes.as_slice())
        } else {
            None
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => |$v:ident| $make:expr),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from($v: $ty) -> Self {
                    $make
                }
            }
        )*
    };
}

value_from! {
    () => |_unit| Value::Null,
    bool => |b| Value::Bool(b),
    i32 => |n| Value::Int(i64::from(n)),
    i64 => |n| Value::Int(n),
    f64 => |x| Value::Float(x),
    &str => |s| Value::String(s.to_owned()),
    String => |s| Value::String(s),
    Vec<u8> => |bytes| Value::Bytes(bytes),
}

/// Rust types that can be read back out of a [`Value`]
///
/// Used by typed property accessors. `Option<T>` reads `Null` (or a missing
/// property) as `None`.
pub trait PropertyValue: Sized {
    /// Type name used in error messages
    const TYPE_NAME: &'static str;

    /// Extract from a value, `None` on type mismatch
    fn from_value(value: &Value) -> Option<Self>;

    /// Convert into a value
    fn into_value(self) -> Value;

    /// Value to assume when the property is absent
    fn missing() -> Option<Self> {
        None
    }
}

impl PropertyValue for bool {
    const TYPE_NAME: &'static str = "Bool";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl PropertyValue for i64 {
    const TYPE_NAME: &'static str = "Int";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl PropertyValue for f64 {
    const TYPE_NAME: &'static str = "Float";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_float()
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl PropertyValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl PropertyValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Bytes";

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bytes().map(<[u8]>::to_vec)
    }

    fn into_value(self) -> Value {
        Value::Bytes(self)
    }
}

impl<T: PropertyValue> PropertyValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return Some(None);
        }
        T::from_value(value).map(Some)
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn missing() -> Option<Self> {
        Some(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality_never_coerces() {
        assert_ne!(Value::from(1i64), Value::from(1.0));
        assert_ne!(Value::from(b"a".to_vec()), Value::from("a"));
        assert_ne!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(-0.0), Value::from(0.0));
        assert_eq!(Value::from(3i32), Value::Int(3));
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from(7i64).as_int(), Some(7));
        assert_eq!(Value::from("v1").as_str(), Some("v1"));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert!(Value::from(()).is_null());
        assert_eq!(Value::from("v1").as_int(), None);
        assert_eq!(Value::from(2.5).type_name(), "Float");
    }

    #[test]
    fn test_property_value_option_reads_null() {
        assert_eq!(Option::<i64>::from_value(&Value::Null), Some(None));
        assert_eq!(Option::<i64>::from_value(&Value::Int(3)), Some(Some(3)));
        assert_eq!(Option::<i64>::from_value(&Value::from("x")), None);
        assert_eq!(Option::<i64>::missing(), Some(None));
        assert_eq!(i64::missing(), None);
    }

    #[test]
    fn test_property_value_round_trip_types() {
        assert_eq!(String::from_value(&"s".to_string().into_value()), Some("s".to_string()));
        assert_eq!(Vec::<u8>::from_value(&vec![1u8, 2].into_value()), Some(vec![1, 2]));
        assert_eq!(f64::from_value(&Value::Int(1)), None);
    }
}
