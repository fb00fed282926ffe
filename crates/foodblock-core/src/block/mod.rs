//! Content-addressed blocks.
//!
//! A [`Block`] is the immutable record `{hash, type, state, refs}`. Its hash is
//! SHA-256 over the canonical form of `(type, state, refs)`, so two blocks with
//! the same logical content always share a hash and "updating" an entity means
//! creating a new block that points at the old one via `refs.updates`.
//!
//! # Sub-modules
//!
//! - [`canonical`]: deterministic serialization used as the hash and
//!   signature pre-image.
//! - [`hash`]: SHA-256 helpers and block hash verification.
//! - [`factory`]: block construction (`create`, `update`, `merge_update`,
//!   `tombstone`), null stripping and ref validation.
//! - [`sign`]: Ed25519 [`SignedBlock`](sign::SignedBlock) wrapper.
//! - [`uri`]: `fb:` URIs.

pub mod canonical;
pub mod factory;
pub mod hash;
pub mod sign;
pub mod uri;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Map, Value};

/// Ref role naming the previous version of an entity.
pub const UPDATES_ROLE: &str = "updates";

// ---------------------------------------------------------------------------
// Refs
// ---------------------------------------------------------------------------

/// A typed edge target: one hash or a set of hashes.
///
/// Arrays have set semantics for hashing (they are sorted in the canonical
/// form) but keep caller order here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    One(String),
    Many(Vec<String>),
}

impl RefValue {
    /// Iterate every hash carried by this ref.
    pub fn hashes(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            Self::One(hash) => std::slice::from_ref(hash),
            Self::Many(hashes) => hashes,
        };
        slice.iter().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes().any(|h| h == hash)
    }

    /// The hash when this is a single-valued ref.
    #[must_use]
    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::One(hash) => Some(hash),
            Self::Many(_) => None,
        }
    }
}

impl From<&str> for RefValue {
    fn from(hash: &str) -> Self {
        Self::One(hash.to_owned())
    }
}

impl From<String> for RefValue {
    fn from(hash: String) -> Self {
        Self::One(hash)
    }
}

impl From<Vec<String>> for RefValue {
    fn from(hashes: Vec<String>) -> Self {
        Self::Many(hashes)
    }
}

impl From<&RefValue> for Value {
    fn from(r: &RefValue) -> Self {
        match r {
            RefValue::One(hash) => Self::String(hash.clone()),
            RefValue::Many(hashes) => {
                Self::Array(hashes.iter().cloned().map(Self::String).collect())
            }
        }
    }
}

/// Role → target map. Values are always strings or string arrays.
pub type Refs = BTreeMap<String, RefValue>;

/// Render typed refs back into a raw value map (for canonicalization).
#[must_use]
pub fn refs_to_map(refs: &Refs) -> Map {
    refs.iter()
        .map(|(role, target)| (role.clone(), Value::from(target)))
        .collect()
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// An immutable content-addressed record.
///
/// Fields are private: blocks come from the [`factory`] or from the wire, and
/// [`Block::verify`] checks that a wire block's hash matches its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    hash: String,
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    state: Map,
    #[serde(default)]
    refs: Refs,
}

impl Block {
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn block_type(&self) -> &str {
        &self.block_type
    }

    #[must_use]
    pub const fn state(&self) -> &Map {
        &self.state
    }

    #[must_use]
    pub const fn refs(&self) -> &Refs {
        &self.refs
    }

    /// The previous version this block supersedes, if it is an update.
    ///
    /// Only a single-valued `updates` ref counts; an array is not a version
    /// link.
    #[must_use]
    pub fn updates(&self) -> Option<&str> {
        self.refs.get(UPDATES_ROLE).and_then(RefValue::as_single)
    }

    /// Roles through which this block references `hash`.
    pub fn roles_referencing<'a>(&'a self, hash: &'a str) -> impl Iterator<Item = &'a str> {
        self.refs
            .iter()
            .filter(move |(_, target)| target.contains(hash))
            .map(|(role, _)| role.as_str())
    }

    /// Every hash this block references, in role order.
    pub fn referenced_hashes(&self) -> impl Iterator<Item = &str> {
        self.refs.values().flat_map(RefValue::hashes)
    }

    /// The canonical pre-image of this block's hash.
    ///
    /// # Errors
    ///
    /// Returns [`canonical::CanonicalError`] if the content has no canonical
    /// form (possible only for blocks not built by the factory).
    pub fn canonical(&self) -> Result<String, canonical::CanonicalError> {
        canonical::canonical(&self.block_type, &self.state, &refs_to_map(&self.refs))
    }

    /// Recompute the hash and compare it with the stored one.
    #[must_use]
    pub fn verify(&self) -> bool {
        hash::verify_block_hash(self).unwrap_or(false)
    }

    /// Split into `(hash, type, state, refs)`.
    #[must_use]
    pub fn into_parts(self) -> (String, String, Map, Refs) {
        (self.hash, self.block_type, self.state, self.refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_block(refs: serde_json::Value) -> Block {
        serde_json::from_value(json!({
            "hash": "h",
            "type": "transfer.order",
            "state": {},
            "refs": refs,
        }))
        .expect("wire block")
    }

    #[test]
    fn ref_value_hashes() {
        let one = RefValue::from("a");
        let many = RefValue::from(vec!["b".to_owned(), "c".to_owned()]);
        assert_eq!(one.hashes().collect::<Vec<_>>(), ["a"]);
        assert_eq!(many.hashes().collect::<Vec<_>>(), ["b", "c"]);
        assert!(many.contains("c"));
        assert_eq!(many.as_single(), None);
    }

    #[test]
    fn updates_requires_single_ref() {
        assert_eq!(wire_block(json!({"updates": "p"})).updates(), Some("p"));
        assert_eq!(wire_block(json!({"updates": ["p"]})).updates(), None);
        assert_eq!(wire_block(json!({})).updates(), None);
    }

    #[test]
    fn roles_referencing_scans_arrays() {
        let block = wire_block(json!({"buyer": "x", "inputs": ["y", "x"], "seller": "z"}));
        let roles: Vec<_> = block.roles_referencing("x").collect();
        assert_eq!(roles, ["buyer", "inputs"]);
    }

    #[test]
    fn wire_rejects_non_string_refs() {
        let result = serde_json::from_value::<Block>(json!({
            "hash": "h", "type": "t", "state": {}, "refs": {"bad": 5}
        }));
        assert!(result.is_err());

        let mixed = serde_json::from_value::<Block>(json!({
            "hash": "h", "type": "t", "state": {}, "refs": {"bad": ["a", 1]}
        }));
        assert!(mixed.is_err());
    }

    #[test]
    fn wire_form_uses_type_key() {
        let block = wire_block(json!({"seller": "s"}));
        let text = serde_json::to_value(&block).expect("serialize");
        assert_eq!(text["type"], "transfer.order");
        assert_eq!(text["refs"]["seller"], "s");
    }
}
