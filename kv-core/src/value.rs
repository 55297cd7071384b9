//! # Value
//!
//! The tagged variant stored behind every key: integers, floats, strings,
//! lists, hashes, and sets. Real Redis-alikes store these dynamically typed;
//! here the dynamic typing is collapsed into one enum with explicit
//! type-check helpers so handlers get `WrongType` instead of a runtime panic.

use std::collections::{HashMap, HashSet};

use kv_common::KvError;

/// A single keyspace value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(Vec<u8>),
    List(Vec<Value>),
    Hash(HashMap<Vec<u8>, Value>),
    Set(HashSet<Vec<u8>>),
}

impl Value {
    /// Implements `AdaptType`: numeric strings entering the system are
    /// coerced to `Integer` if they parse as whole numbers, else `Float`,
    /// else left as `String`.
    pub fn adapt(bytes: &[u8]) -> Value {
        if let Ok(text) = std::str::from_utf8(bytes) {
            if let Ok(i) = text.parse::<i64>() {
                return Value::Integer(i);
            }
            if let Ok(f) = text.parse::<f64>() {
                return Value::Float(f);
            }
        }
        Value::String(bytes.to_vec())
    }

    /// Short type name used in `WrongType` error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }

    /// Renders the value as the bytes a RESP bulk reply would carry, for
    /// scalar variants. Collection variants have no single bulk-string
    /// representation and are handled per-command instead.
    pub fn as_display_bytes(&self) -> Vec<u8> {
        match self {
            Value::Integer(i) => i.to_string().into_bytes(),
            Value::Float(f) => format_float(*f).into_bytes(),
            Value::String(bytes) => bytes.clone(),
            Value::List(_) | Value::Hash(_) | Value::Set(_) => {
                String::from_utf8_lossy(b"").into_owned().into_bytes()
            }
        }
    }

    /// Borrows the value as a list, or `WrongType` if it isn't one.
    pub fn as_list(&self, key: &str) -> Result<&Vec<Value>, KvError> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(KvError::WrongType { key: key.to_string(), expected: "list" }),
        }
    }

    /// Mutably borrows the value as a list, or `WrongType` if it isn't one.
    pub fn as_list_mut(&mut self, key: &str) -> Result<&mut Vec<Value>, KvError> {
        match self {
            Value::List(items) => Ok(items),
            _ => Err(KvError::WrongType { key: key.to_string(), expected: "list" }),
        }
    }

    /// Borrows the value as a hash, or `WrongType` if it isn't one.
    pub fn as_hash(&self, key: &str) -> Result<&HashMap<Vec<u8>, Value>, KvError> {
        match self {
            Value::Hash(fields) => Ok(fields),
            _ => Err(KvError::WrongType { key: key.to_string(), expected: "hash" }),
        }
    }

    /// Mutably borrows the value as a hash, or `WrongType` if it isn't one.
    pub fn as_hash_mut(&mut self, key: &str) -> Result<&mut HashMap<Vec<u8>, Value>, KvError> {
        match self {
            Value::Hash(fields) => Ok(fields),
            _ => Err(KvError::WrongType { key: key.to_string(), expected: "hash" }),
        }
    }

    /// Borrows the value as a set, or `WrongType` if it isn't one.
    pub fn as_set(&self, key: &str) -> Result<&HashSet<Vec<u8>>, KvError> {
        match self {
            Value::Set(members) => Ok(members),
            _ => Err(KvError::WrongType { key: key.to_string(), expected: "set" }),
        }
    }

    /// Mutably borrows the value as a set, or `WrongType` if it isn't one.
    pub fn as_set_mut(&mut self, key: &str) -> Result<&mut HashSet<Vec<u8>>, KvError> {
        match self {
            Value::Set(members) => Ok(members),
            _ => Err(KvError::WrongType { key: key.to_string(), expected: "set" }),
        }
    }

    /// Returns the value as `f64` for arithmetic commands (`HINCRBYFLOAT`),
    /// or `FieldNotANumber` if it holds a non-numeric string/collection.
    pub fn as_f64(&self, field: &str) -> Result<f64, KvError> {
        match self {
            Value::Integer(i) => Ok(*i as f64),
            Value::Float(f) => Ok(*f),
            Value::String(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| KvError::FieldNotANumber(field.to_string())),
            _ => Err(KvError::FieldNotANumber(field.to_string())),
        }
    }

    /// Returns the value as `i64` for strict integer arithmetic (`HINCRBY`);
    /// unlike `as_f64`, a float-valued field is rejected.
    pub fn as_i64_strict(&self, field: &str) -> Result<i64, KvError> {
        match self {
            Value::Integer(i) => Ok(*i),
            Value::String(bytes) => std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| KvError::FieldNotANumber(field.to_string())),
            _ => Err(KvError::FieldNotANumber(field.to_string())),
        }
    }
}

fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{:.0}", value)
    } else {
        let mut text = format!("{}", value);
        if !text.contains('.') && !text.contains('e') {
            text.push_str(".0");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapt_prefers_integer_then_float_then_string() {
        assert_eq!(Value::adapt(b"1245678910"), Value::Integer(1245678910));
        assert!(matches!(Value::adapt(b"45782.11341"), Value::Float(_)));
        assert_eq!(Value::adapt(b"hello"), Value::String(b"hello".to_vec()));
    }

    #[test]
    fn wrong_type_on_list_access_reports_key() {
        let value = Value::Integer(1);
        let err = value.as_list("k1").unwrap_err();
        assert_eq!(err.wire_message(), "value at key k1 is not a list");
    }

    #[test]
    fn as_i64_strict_rejects_float_field() {
        let value = Value::Float(11.5);
        let err = value.as_i64_strict("f1").unwrap_err();
        assert_eq!(err.wire_message(), "value at field f1 is not a number");
    }

    #[test]
    fn as_f64_accepts_integer_and_numeric_string() {
        assert_eq!(Value::Integer(11).as_f64("f1").unwrap(), 11.0);
        assert_eq!(Value::String(b"3.5".to_vec()).as_f64("f1").unwrap(), 3.5);
    }
}
