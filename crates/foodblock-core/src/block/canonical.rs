//! Canonical serialization for block hashing and signing.
//!
//! Produces compact JSON over `{"refs": .., "state": .., "type": ..}` that is
//! byte-identical across implementations for the same logical block.
//!
//! Rules:
//! - Compact: no whitespace between tokens.
//! - Object keys NFC-normalized, then sorted by byte order at every depth.
//! - Strings NFC-normalized, then JSON-escaped.
//! - Integers render as plain digits. Floats use the shortest round-trip
//!   decimal without an exponent; integral floats have no fraction and `-0`
//!   renders as `0`. NaN and the infinities are rejected.
//! - `null` is omitted: object keys disappear and array elements are dropped.
//! - Arrays under a key literally named `refs` whose elements are all strings
//!   are sorted (set semantics). Every other array keeps caller order.

use std::borrow::Cow;
use std::fmt::Write as _;

use unicode_normalization::{UnicodeNormalization, is_nfc};

use crate::error::ErrorCode;
use crate::value::{Map, Number, Value};

/// Key whose subtree gets set semantics for string arrays.
const REFS_KEY: &str = "refs";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from canonicalization. Both are fatal for hashing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanonicalError {
    /// A NaN or infinite float was found.
    #[error("non-finite number at `{path}`: NaN and Infinity have no canonical form")]
    NonFiniteNumber {
        /// Dotted path to the offending value, e.g. `state.readings[2]`.
        path: String,
    },

    /// Two distinct keys normalize to the same NFC string.
    #[error("keys collide after NFC normalization at `{path}`: {key:?}")]
    DuplicateKey {
        /// Path of the object holding the colliding keys.
        path: String,
        /// The normalized key.
        key: String,
    },
}

impl CanonicalError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NonFiniteNumber { .. } => ErrorCode::NonFiniteNumber,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
        }
    }

    /// Prefix the error path with the segment the error surfaced through.
    pub(crate) fn within(self, segment: &str) -> Self {
        let join = |path: String| {
            if path.is_empty() {
                segment.to_owned()
            } else if path.starts_with('[') {
                format!("{segment}{path}")
            } else {
                format!("{segment}.{path}")
            }
        };
        match self {
            Self::NonFiniteNumber { path } => Self::NonFiniteNumber { path: join(path) },
            Self::DuplicateKey { path, key } => Self::DuplicateKey {
                path: join(path),
                key,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Canonical form of `(type, state, refs)`.
///
/// `refs` is a raw map so that the canonical form can be computed for
/// unvalidated input; the factory validates refs before hashing.
///
/// # Examples
///
/// ```
/// use foodblock_core::block::canonical::canonical;
/// use foodblock_core::value::{Map, Value};
///
/// let mut state = Map::new();
/// state.insert("b".into(), Value::from(2));
/// state.insert("a".into(), Value::from(1));
/// let text = canonical("test", &state, &Map::new()).unwrap();
/// assert_eq!(text, r#"{"refs":{},"state":{"a":1,"b":2},"type":"test"}"#);
/// ```
///
/// # Errors
///
/// Returns [`CanonicalError`] for non-finite numbers or keys that collide
/// after NFC normalization.
pub fn canonical(block_type: &str, state: &Map, refs: &Map) -> Result<String, CanonicalError> {
    let mut buf = String::with_capacity(128);
    buf.push_str("{\"refs\":");
    write_object(refs, true, &mut buf).map_err(|e| e.within("refs"))?;
    buf.push_str(",\"state\":");
    write_object(state, false, &mut buf).map_err(|e| e.within("state"))?;
    buf.push_str(",\"type\":");
    write_string(&nfc(block_type), &mut buf);
    buf.push('}');
    Ok(buf)
}

/// Canonical form of a single value, outside any `refs` subtree.
///
/// A top-level `null` renders as `null`; nested nulls are omitted as usual.
///
/// # Errors
///
/// Same as [`canonical`].
pub fn canonicalize_value(value: &Value) -> Result<String, CanonicalError> {
    let mut buf = String::new();
    if value.is_null() {
        buf.push_str("null");
    } else {
        write_value(value, false, &mut buf)?;
    }
    Ok(buf)
}

/// Canonical rendering of a number.
///
/// # Errors
///
/// Returns [`CanonicalError::NonFiniteNumber`] (with an empty path) for NaN
/// and the infinities.
pub fn canonical_number(n: Number) -> Result<String, CanonicalError> {
    let mut buf = String::new();
    write_number(n, &mut buf)?;
    Ok(buf)
}

/// NFC-normalize, borrowing when the input is already normalized.
#[must_use]
pub fn nfc(s: &str) -> Cow<'_, str> {
    if is_nfc(s) {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(s.nfc().collect())
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Write a non-null value.
fn write_value(value: &Value, in_refs: bool, buf: &mut String) -> Result<(), CanonicalError> {
    match value {
        // Callers filter nulls out before descending.
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => write_number(*n, buf)?,
        Value::String(s) => write_string(&nfc(s), buf),
        Value::Array(items) => write_array(items, in_refs, buf)?,
        Value::Object(map) => write_object(map, in_refs, buf)?,
    }
    Ok(())
}

fn write_array(items: &[Value], in_refs: bool, buf: &mut String) -> Result<(), CanonicalError> {
    buf.push('[');
    let hash_list = items
        .iter()
        .filter(|v| !v.is_null())
        .all(|v| matches!(v, Value::String(_)));
    if in_refs && hash_list {
        let mut hashes: Vec<Cow<'_, str>> = items
            .iter()
            .filter_map(Value::as_str)
            .map(nfc)
            .collect();
        hashes.sort();
        for (i, hash) in hashes.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            write_string(hash, buf);
        }
    } else {
        let present = items.iter().enumerate().filter(|(_, v)| !v.is_null());
        for (n, (i, item)) in present.enumerate() {
            if n > 0 {
                buf.push(',');
            }
            write_value(item, in_refs, buf).map_err(|e| e.within(&format!("[{i}]")))?;
        }
    }
    buf.push(']');
    Ok(())
}

fn write_object(map: &Map, in_refs: bool, buf: &mut String) -> Result<(), CanonicalError> {
    let mut entries: Vec<(Cow<'_, str>, &Value)> = map
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (nfc(k), v))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(CanonicalError::DuplicateKey {
            path: String::new(),
            key: pair[0].0.to_string(),
        });
    }

    buf.push('{');
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 {
            buf.push(',');
        }
        write_string(key, buf);
        buf.push(':');
        let child_in_refs = in_refs || key == REFS_KEY;
        write_value(value, child_in_refs, buf).map_err(|e| e.within(key))?;
    }
    buf.push('}');
    Ok(())
}

fn write_number(n: Number, buf: &mut String) -> Result<(), CanonicalError> {
    match n {
        Number::Int(i) => {
            let _ = write!(buf, "{i}");
        }
        Number::UInt(u) => {
            let _ = write!(buf, "{u}");
        }
        Number::Float(f) if !f.is_finite() => {
            return Err(CanonicalError::NonFiniteNumber {
                path: String::new(),
            });
        }
        Number::Float(f) if f == 0.0 => buf.push('0'),
        // `Display` for f64 is shortest round-trip and never uses an exponent.
        Number::Float(f) => {
            let _ = write!(buf, "{f}");
        }
    }
    Ok(())
}

/// JSON string literal. The escape table is part of the hash contract.
fn write_string(s: &str, buf: &mut String) {
    buf.push('"');
    for ch in s.chars() {
        match ch {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0C}' => buf.push_str("\\f"),
            c if c < '\u{20}' => {
                let _ = write!(buf, "\\u{:04x}", u32::from(c));
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: serde_json::Value) -> Map {
        Value::from(v).into_object().expect("object")
    }

    fn state_only(state: serde_json::Value) -> String {
        canonical("t", &map(state), &Map::new()).expect("canonical")
    }

    #[test]
    fn empty_block() {
        assert_eq!(
            canonical("t", &Map::new(), &Map::new()).expect("canonical"),
            r#"{"refs":{},"state":{},"type":"t"}"#
        );
    }

    #[test]
    fn object_keys_sorted() {
        assert_eq!(
            state_only(json!({"z": 1, "a": 2, "m": 3})),
            r#"{"refs":{},"state":{"a":2,"m":3,"z":1},"type":"t"}"#
        );
    }

    #[test]
    fn nested_object_keys_sorted() {
        assert_eq!(
            canonicalize_value(&Value::from(json!({"b": {"d": {"f": 1, "e": 2}, "c": 3}, "a": 4})))
                .expect("canonical"),
            r#"{"a":4,"b":{"c":3,"d":{"e":2,"f":1}}}"#
        );
    }

    #[test]
    fn nulls_are_omitted_everywhere() {
        assert_eq!(
            canonicalize_value(&Value::from(json!({"a": null, "b": [1, null, 2], "c": {"d": null}})))
                .expect("canonical"),
            r#"{"b":[1,2],"c":{}}"#
        );
    }

    #[test]
    fn top_level_null_value() {
        assert_eq!(canonicalize_value(&Value::Null).expect("canonical"), "null");
    }

    #[test]
    fn refs_string_arrays_are_sorted() {
        let refs = map(json!({"inputs": ["c", "a", "b"]}));
        assert_eq!(
            canonical("t", &Map::new(), &refs).expect("canonical"),
            r#"{"refs":{"inputs":["a","b","c"]},"state":{},"type":"t"}"#
        );
    }

    #[test]
    fn nulls_in_refs_arrays_do_not_block_sorting() {
        let refs = map(json!({"inputs": ["c", null, "a"]}));
        assert_eq!(
            canonical("t", &Map::new(), &refs).expect("canonical"),
            r#"{"refs":{"inputs":["a","c"]},"state":{},"type":"t"}"#
        );
    }

    #[test]
    fn state_arrays_keep_order() {
        assert_eq!(
            state_only(json!({"steps": ["c", "a", "b"]})),
            r#"{"refs":{},"state":{"steps":["c","a","b"]},"type":"t"}"#
        );
    }

    #[test]
    fn refs_key_inside_state_switches_to_set_semantics() {
        assert_eq!(
            state_only(json!({"nested": {"refs": {"x": ["b", "a"]}}, "list": ["b", "a"]})),
            r#"{"refs":{},"state":{"list":["b","a"],"nested":{"refs":{"x":["a","b"]}}},"type":"t"}"#
        );
    }

    #[test]
    fn mixed_arrays_in_refs_keep_order() {
        let value = Value::from(json!({"refs": {"x": ["b", 1, "a"]}}));
        assert_eq!(
            canonicalize_value(&value).expect("canonical"),
            r#"{"refs":{"x":["b",1,"a"]}}"#
        );
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(canonical_number(Number::Int(-42)).expect("n"), "-42");
        assert_eq!(canonical_number(Number::UInt(u64::MAX)).expect("n"), "18446744073709551615");
        assert_eq!(canonical_number(Number::Float(4.5)).expect("n"), "4.5");
        assert_eq!(canonical_number(Number::Float(5.0)).expect("n"), "5");
        assert_eq!(canonical_number(Number::Float(0.1)).expect("n"), "0.1");
        assert_eq!(canonical_number(Number::Float(1e21)).expect("n"), "1000000000000000000000");
        assert_eq!(canonical_number(Number::Float(1e-7)).expect("n"), "0.0000001");
    }

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(canonical_number(Number::Float(-0.0)).expect("n"), "0");
    }

    #[test]
    fn integral_float_hashes_like_integer() {
        let mut floats = Map::new();
        floats.insert("n".into(), Value::from(5.0));
        assert_eq!(
            state_only(json!({"n": 5})),
            canonical("t", &floats, &Map::new()).expect("canonical")
        );
    }

    #[test]
    fn non_finite_numbers_fail_with_path() {
        let mut state = Map::new();
        state.insert(
            "readings".into(),
            Value::Array(vec![Value::from(1), Value::from(f64::INFINITY)]),
        );
        let err = canonical("t", &state, &Map::new()).expect_err("infinite");
        assert_eq!(
            err,
            CanonicalError::NonFiniteNumber {
                path: "state.readings[1]".into()
            }
        );
        assert_eq!(err.code(), ErrorCode::NonFiniteNumber);

        assert!(canonical_number(Number::Float(f64::NAN)).is_err());
    }

    #[test]
    fn strings_are_nfc_normalized() {
        let composed = state_only(json!({"name": "caf\u{e9}"}));
        let decomposed = state_only(json!({"name": "cafe\u{301}"}));
        assert_eq!(composed, decomposed);
    }

    #[test]
    fn keys_are_nfc_normalized() {
        let composed = state_only(json!({"caf\u{e9}": 1}));
        let decomposed = state_only(json!({"cafe\u{301}": 1}));
        assert_eq!(composed, decomposed);
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let err = canonical(
            "t",
            &map(json!({"caf\u{e9}": 1, "cafe\u{301}": 2})),
            &Map::new(),
        )
        .expect_err("collision");
        assert!(matches!(err, CanonicalError::DuplicateKey { ref path, .. } if path == "state"));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            canonicalize_value(&Value::from("he said \"hi\"\\\n\t\u{8}\u{c}\u{1}")).expect("c"),
            "\"he said \\\"hi\\\"\\\\\\n\\t\\b\\f\\u0001\""
        );
    }

    #[test]
    fn unicode_passes_through_unescaped() {
        let text = state_only(json!({"emoji": "🎉", "cjk": "日本語"}));
        assert!(text.contains("🎉"));
        assert!(text.contains("日本語"));
    }

    #[test]
    fn no_whitespace() {
        let text = state_only(json!({"key": "value", "list": [1, 2]}));
        assert!(!text.contains(' '));
        assert!(!text.contains('\n'));
    }

    #[test]
    fn idempotent_through_reparse() {
        let first = canonicalize_value(&Value::from(json!({"b": 1, "a": {"d": 2.5, "c": [3]}})))
            .expect("canonical");
        let reparsed: Value = serde_json::from_str(&first).expect("parse");
        assert_eq!(canonicalize_value(&reparsed).expect("canonical"), first);
    }
}
