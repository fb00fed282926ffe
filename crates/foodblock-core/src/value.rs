//! JSON-like value model for block `state` and raw `refs` input.
//!
//! [`Value`] is the tagged variant every block field is built from. It
//! deliberately differs from `serde_json::Value` in one way: floats are stored
//! verbatim, so a non-finite number survives construction and is rejected by
//! the canonicalizer instead of being silently turned into `null`.
//!
//! Null omission is a pure transform ([`Value::without_nulls`],
//! [`strip_nulls`]) applied by the block factory before hashing.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered field map used for `state` and raw `refs`.
pub type Map = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------------

/// A JSON number, keeping integers exact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer above `i64::MAX`.
    UInt(u64),
    /// Floating point value. May be non-finite in memory.
    Float(f64),
}

impl Number {
    /// Lossy conversion used for numeric comparisons (`max`/`min` merges).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::UInt(u) => u as f64,
            Self::Float(f) => f,
        }
    }

    /// `false` only for NaN and the infinities.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        match self {
            Self::Int(_) | Self::UInt(_) => true,
            Self::Float(f) => f.is_finite(),
        }
    }

    /// Numeric ordering. Integer pairs compare exactly; anything involving a
    /// float compares through `f64`, and NaN is unordered.
    #[must_use]
    pub fn numeric_cmp(self, other: Self) -> Option<Ordering> {
        match (self.as_integer(), other.as_integer()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }

    fn as_integer(self) -> Option<i128> {
        match self {
            Self::Int(i) => Some(i128::from(i)),
            Self::UInt(u) => Some(i128::from(u)),
            Self::Float(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// Recursive value: `null | bool | number | string | array | object`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<Number> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_array(&self) -> Option<&Vec<Self>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Consume the value, returning the inner map for objects.
    #[must_use]
    pub fn into_object(self) -> Option<Map> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Remove `null` recursively.
    ///
    /// Returns `None` when the value itself is `null`. Null object entries are
    /// dropped and null array elements are removed (the array shrinks).
    #[must_use]
    pub fn without_nulls(self) -> Option<Self> {
        match self {
            Self::Null => None,
            Self::Array(items) => Some(Self::Array(
                items.into_iter().filter_map(Self::without_nulls).collect(),
            )),
            Self::Object(map) => Some(Self::Object(strip_nulls(map))),
            other => Some(other),
        }
    }
}

/// Remove null entries from a map, recursing into nested objects and arrays.
#[must_use]
pub fn strip_nulls(map: Map) -> Map {
    map.into_iter()
        .filter_map(|(key, value)| value.without_nulls().map(|v| (key, v)))
        .collect()
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Number(Number::Int(i64::from(i)))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Number(Number::Int(i))
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Self::Number(Number::Int(i64::from(u)))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        i64::try_from(u).map_or(Self::Number(Number::UInt(u)), |i| {
            Self::Number(Number::Int(i))
        })
    }
}

impl From<usize> for Value {
    fn from(u: usize) -> Self {
        Self::from(u as u64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Number(Number::Float(f))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Self>> for Value {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Object(map)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Number(Number::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Self::Number(Number::UInt(u))
                } else {
                    Self::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Self::Object(obj.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl FromIterator<(String, Self)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, Self)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().collect())
    }
}
