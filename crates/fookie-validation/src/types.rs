//! The fixed type registry
//!
//! Each function returns a fresh [`Validator`] for one of the built-in
//! value types a schema field can declare. The set is closed; anything
//! beyond it goes through [`crate::custom`].

use crate::validator::Validator;
use serde_json::Value;

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

/// Any JSON string.
pub fn text() -> Validator {
    Validator::new("Text", |v| v.is_string())
}

/// Any JSON number, integral or not.
pub fn float() -> Validator {
    Validator::new("Float", |v| v.is_number())
}

/// A JSON number with no fractional part.
pub fn integer() -> Validator {
    Validator::new("Integer", is_integer)
}

/// Any JSON array.
pub fn array() -> Validator {
    Validator::new("Array", |v| v.is_array())
}

/// A JSON boolean.
pub fn boolean() -> Validator {
    Validator::new("Boolean", |v| v.is_boolean())
}

/// A byte buffer encoded as an array of integers in `0..=255`.
pub fn buffer() -> Validator {
    Validator::new("Buffer", |v| match v {
        Value::Array(items) => items
            .iter()
            .all(|i| i.as_u64().map(|b| b <= 255).unwrap_or(false)),
        _ => false,
    })
}

/// A plain JSON object.
pub fn plain() -> Validator {
    Validator::new("Plain", |v| v.is_object())
}

/// A string holding exactly one character.
pub fn char() -> Validator {
    Validator::new("Char", |v| {
        v.as_str().map(|s| s.chars().count() == 1).unwrap_or(false)
    })
}

/// Functions have no JSON representation; this validator rejects every
/// value. It exists so the registry stays enumerable and a schema naming
/// it fails loudly instead of silently accepting anything.
pub fn function() -> Validator {
    Validator::new("Function", |_| false)
}

/// An epoch-milliseconds number or an RFC 3339 string.
pub fn timestamp() -> Validator {
    Validator::new("Timestamp", |v| match v {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        _ => false,
    })
}

/// An array whose elements are all strings.
pub fn string_array() -> Validator {
    Validator::new("StringArray", |v| match v {
        Value::Array(items) => items.iter().all(|i| i.is_string()),
        _ => false,
    })
}

/// An array whose elements are all numbers.
pub fn float_array() -> Validator {
    Validator::new("FloatArray", |v| match v {
        Value::Array(items) => items.iter().all(|i| i.is_number()),
        _ => false,
    })
}

/// An array whose elements are all integral numbers.
pub fn integer_array() -> Validator {
    Validator::new("IntegerArray", |v| match v {
        Value::Array(items) => items.iter().all(is_integer),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_accepts_strings_only() {
        let v = text();
        assert!(v.check(&json!("hello")));
        assert!(!v.check(&json!(1)));
        assert!(!v.check(&json!(null)));
    }

    #[test]
    fn integer_rejects_fractions() {
        let v = integer();
        assert!(v.check(&json!(42)));
        assert!(v.check(&json!(-7)));
        assert!(!v.check(&json!(1.5)));
        assert!(!v.check(&json!("42")));
    }

    #[test]
    fn float_accepts_any_number() {
        let v = float();
        assert!(v.check(&json!(1.5)));
        assert!(v.check(&json!(3)));
        assert!(!v.check(&json!("3.2")));
    }

    #[test]
    fn char_requires_single_character() {
        let v = char();
        assert!(v.check(&json!("a")));
        assert!(v.check(&json!("ß")));
        assert!(!v.check(&json!("ab")));
        assert!(!v.check(&json!("")));
    }

    #[test]
    fn buffer_is_byte_array() {
        let v = buffer();
        assert!(v.check(&json!([0, 128, 255])));
        assert!(!v.check(&json!([0, 256])));
        assert!(!v.check(&json!([-1])));
        assert!(!v.check(&json!("bytes")));
    }

    #[test]
    fn timestamp_accepts_epoch_and_rfc3339() {
        let v = timestamp();
        assert!(v.check(&json!(1_700_000_000_000_i64)));
        assert!(v.check(&json!("2024-01-15T10:30:00Z")));
        assert!(!v.check(&json!("yesterday")));
        assert!(!v.check(&json!(true)));
    }

    #[test]
    fn typed_arrays_check_every_element() {
        assert!(string_array().check(&json!(["a", "b"])));
        assert!(!string_array().check(&json!(["a", 1])));
        assert!(float_array().check(&json!([1.0, 2, 3.5])));
        assert!(!float_array().check(&json!([1.0, "2"])));
        assert!(integer_array().check(&json!([1, 2, 3])));
        assert!(!integer_array().check(&json!([1, 2.5])));
    }

    #[test]
    fn function_rejects_everything() {
        let v = function();
        assert!(!v.check(&json!("fn")));
        assert!(!v.check(&json!({})));
        assert!(!v.check(&json!(null)));
    }

    #[test]
    fn plain_accepts_objects() {
        let v = plain();
        assert!(v.check(&json!({"a": 1})));
        assert!(!v.check(&json!([1])));
    }
}
