//! Dynamic leaf payloads
//!
//! Every leaf of the state tree holds a `Value`. Processes read values
//! through their ports and return values in updates; updaters and dividers
//! are defined over this type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A leaf value
///
/// Serializes untagged, so a snapshot of values is plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a map value from key/value pairs
    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn empty_map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// Child of a map value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Nested lookup through map values
    pub fn get_in<S: AsRef<str>>(&self, keys: &[S]) -> Option<&Value> {
        keys.iter().try_fold(self, |value, key| value.get(key.as_ref()))
    }

    /// Numeric child of a map value, `None` if missing or not a number
    pub fn f64_at(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Sum used by the accumulate updater
    ///
    /// Integers stay integers unless mixed with floats; `Null` acts as the
    /// identity so accumulating into a fresh leaf just stores the update.
    pub fn add(&self, other: &Value) -> Result<Value, String> {
        match (self, other) {
            (Value::Null, v) => Ok(v.clone()),
            (v, Value::Null) => Ok(v.clone()),
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| format!("integer overflow adding {} and {}", a, b)),
            (Value::List(a), Value::List(b)) => {
                let mut joined = a.clone();
                joined.extend(b.iter().cloned());
                Ok(Value::List(joined))
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x + y)),
                _ => Err(format!("cannot accumulate {} into {}", b.type_name(), a.type_name())),
            },
        }
    }

    /// Map union used by the merge updater; keys in `other` win
    pub fn merge(&self, other: &Value) -> Result<Value, String> {
        match (self, other) {
            (Value::Null, Value::Map(b)) => Ok(Value::Map(b.clone())),
            (Value::Map(a), Value::Map(b)) => {
                let mut merged = a.clone();
                for (key, value) in b {
                    merged.insert(key.clone(), value.clone());
                }
                Ok(Value::Map(merged))
            }
            (a, b) => Err(format!("cannot merge {} into {}", b.type_name(), a.type_name())),
        }
    }

    /// Even split: each daughter receives half
    pub fn halve(&self) -> Result<(Value, Value), String> {
        match self.as_f64() {
            Some(v) => {
                let half = v / 2.0;
                Ok((Value::Float(half), Value::Float(half)))
            }
            None => Err(format!("cannot split a {} value", self.type_name())),
        }
    }

    /// Integer split; the remainder unit goes to the first daughter
    pub fn split_discrete(&self) -> Result<(Value, Value), String> {
        match self {
            Value::Int(v) => {
                let second = v / 2;
                Ok((Value::Int(v - second), Value::Int(second)))
            }
            _ => Err(format!("discrete split needs an int, got {}", self.type_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(text) => write!(f, "{}", text),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<toml::Value> for Value {
    fn from(v: toml::Value) -> Self {
        match v {
            toml::Value::String(s) => Value::Text(s),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::Float(f) => Value::Float(f),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(d) => Value::Text(d.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            toml::Value::Table(table) => {
                Value::Map(table.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_integers() {
        assert_eq!(Value::Int(2).add(&Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(Value::Int(2).add(&Value::Float(0.5)).unwrap(), Value::Float(2.5));
        assert_eq!(Value::Null.add(&Value::Float(1.5)).unwrap(), Value::Float(1.5));
    }

    #[test]
    fn test_add_rejects_text() {
        assert!(Value::from("a").add(&Value::Int(1)).is_err());
        assert!(Value::Int(i64::MAX).add(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_merge_is_union() {
        let a = Value::map([("x", 1), ("y", 2)]);
        let b = Value::map([("y", 20), ("z", 30)]);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged, Value::map([("x", 1), ("y", 20), ("z", 30)]));
    }

    #[test]
    fn test_split_discrete_remainder_first() {
        let (a, b) = Value::Int(7).split_discrete().unwrap();
        assert_eq!(a, Value::Int(4));
        assert_eq!(b, Value::Int(3));
        assert!(Value::Float(7.0).split_discrete().is_err());
    }

    #[test]
    fn test_halve() {
        let (a, b) = Value::Float(3.0).halve().unwrap();
        assert_eq!(a, Value::Float(1.5));
        assert_eq!(b, Value::Float(1.5));
    }

    #[test]
    fn test_untagged_json() {
        let value = Value::map([("n", Value::Int(1)), ("f", Value::Float(0.5)), ("on", Value::Bool(true))]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"f":0.5,"n":1,"on":true}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_get_in() {
        let value = Value::map([("global", Value::map([("volume", 1.5)]))]);
        assert_eq!(value.get_in(&["global", "volume"]), Some(&Value::Float(1.5)));
        assert_eq!(value.get_in(&["global", "mass"]), None);
    }
}
