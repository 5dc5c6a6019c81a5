//! Tagged scalar values
//!
//! `Value` is the unit every property list and the context blackboard are
//! built from. It is a closed sum type: the active variant *is* the type tag,
//! so a value can never disagree with its own type.
//!
//! # Example
//!
//! ```rust
//! use feedback_store::{Value, ValueType};
//!
//! let volume = Value::Int(80);
//! assert_eq!(volume.value_type(), ValueType::Int);
//! assert_eq!(volume.as_int(), Some(80));
//!
//! // Mismatched accessors never panic, they just return nothing
//! assert_eq!(volume.as_str(), None);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Int,
    UInt,
    Bool,
    Pointer,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Bool => "bool",
            ValueType::Pointer => "pointer",
        };
        f.write_str(name)
    }
}

/// A tagged scalar property value
///
/// Equality requires an identical tag and payload. `Pointer` values hold an
/// opaque address and compare by address only; they are never dereferenced.
///
/// The serialized form is externally tagged, e.g. `{"int": 80}` or
/// `{"string": "ringtone.mp3"}`. Pointers are process-local and are not
/// serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    String(String),
    Int(i32),
    UInt(u32),
    Bool(bool),
    #[serde(skip)]
    Pointer(usize),
}

impl Value {
    /// Get the type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::String(_) => ValueType::String,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Bool(_) => ValueType::Bool,
            Value::Pointer(_) => ValueType::Pointer,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Value::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<usize> {
        match self {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// Build a pointer value from a reference's address
    ///
    /// Only the address is kept; the referent's lifetime is the caller's
    /// business.
    pub fn pointer_to<T>(target: &T) -> Self {
        Value::Pointer(target as *const T as usize)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}u", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Pointer(p) => write!(f, "{:#x}", p),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::UInt(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            ".*".prop_map(Value::String),
            any::<i32>().prop_map(Value::Int),
            any::<u32>().prop_map(Value::UInt),
            any::<bool>().prop_map(Value::Bool),
            any::<usize>().prop_map(Value::Pointer),
        ]
    }

    #[test]
    fn test_type_tag_matches_variant() {
        assert_eq!(Value::from("x").value_type(), ValueType::String);
        assert_eq!(Value::from(-1).value_type(), ValueType::Int);
        assert_eq!(Value::from(1u32).value_type(), ValueType::UInt);
        assert_eq!(Value::from(true).value_type(), ValueType::Bool);
        assert_eq!(Value::Pointer(0x10).value_type(), ValueType::Pointer);
    }

    #[test]
    fn test_mismatched_accessors_return_none() {
        let value = Value::UInt(5);
        assert_eq!(value.as_uint(), Some(5));
        assert_eq!(value.as_int(), None);
        assert_eq!(value.as_bool(), None);
        assert_eq!(value.as_str(), None);
        assert_eq!(value.as_pointer(), None);
    }

    #[test]
    fn test_int_and_uint_are_distinct() {
        assert_ne!(Value::Int(1), Value::UInt(1));
    }

    #[test]
    fn test_pointer_equality_is_address_only() {
        let a = String::from("tone");
        let b = String::from("tone");

        // Same contents, different allocations
        assert_ne!(Value::pointer_to(&a), Value::pointer_to(&b));
        assert_eq!(Value::pointer_to(&a), Value::pointer_to(&a));

        // Strings compare by contents under the String tag
        assert_eq!(Value::from(a.as_str()), Value::from(b.as_str()));
    }

    #[test]
    fn test_serde_externally_tagged() {
        let json = serde_json::to_string(&Value::Int(80)).unwrap();
        assert_eq!(json, r#"{"int":80}"#);

        let parsed: Value = serde_json::from_str(r#"{"string":"ringtone.mp3"}"#).unwrap();
        assert_eq!(parsed, Value::from("ringtone.mp3"));

        let parsed: Value = serde_json::from_str(r#"{"uint":3}"#).unwrap();
        assert_eq!(parsed, Value::UInt(3));

        assert!(serde_json::to_string(&Value::Pointer(1)).is_err());
    }

    proptest! {
        #[test]
        fn prop_equality_is_reflexive(value in value_strategy()) {
            prop_assert_eq!(value.clone(), value);
        }

        #[test]
        fn prop_different_tags_never_equal(a in value_strategy(), b in value_strategy()) {
            if a.value_type() != b.value_type() {
                prop_assert_ne!(a, b);
            }
        }
    }
}
