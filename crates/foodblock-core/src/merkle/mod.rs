//! Merkle trees over block state for selective disclosure.
//!
//! # Tree shape
//!
//! - One leaf per state field, ordered by NFC-normalized key (the order the
//!   canonical form uses):
//!   `leaf = SHA256(key + ":" + merkle_value(value))`.
//! - Adjacent nodes are paired left to right. The two sibling hashes are
//!   sorted before concatenation, so a parent does not depend on which side
//!   a child sits. An unpaired last node is promoted unchanged.
//! - An empty state has root `SHA256("")`.
//!
//! `merkle_value` is the raw (NFC) string for strings and the canonical JSON
//! form for everything else (`null` for null).
//!
//! # Proofs
//!
//! A [`Disclosure`] carries one authentication path per disclosed field,
//! concatenated in sorted field order. Within a path, layers strictly
//! increase; a new path starts where the layer does not.

pub mod snapshot;

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::block::canonical::{CanonicalError, canonicalize_value, nfc};
use crate::block::hash::sha256_hex;
use crate::value::{Map, Value};

/// Which side of the pair a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

/// One sibling hash on an authentication path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofEntry {
    pub hash: String,
    pub position: Position,
    /// Tree layer of the sibling; leaves are layer 0.
    pub layer: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleTree {
    pub root: String,
    /// Field name → leaf hash.
    pub leaves: BTreeMap<String, String>,
    /// Layer 0 is the leaves in key order; the last layer holds the root
    /// (when non-empty).
    pub layers: Vec<Vec<String>>,
}

/// A subset of state fields plus the proof tying them to `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disclosure {
    pub disclosed: Map,
    pub proof: Vec<ProofEntry>,
    pub root: String,
}

/// Root of the empty tree.
#[must_use]
pub fn empty_root() -> String {
    sha256_hex("")
}

/// Leaf hash for one field.
///
/// # Errors
///
/// Returns [`CanonicalError`] when `value` has no canonical form.
pub fn leaf_hash(key: &str, value: &Value) -> Result<String, CanonicalError> {
    let rendered = match value {
        Value::String(s) => nfc(s).into_owned(),
        other => canonicalize_value(other).map_err(|e| e.within(key))?,
    };
    Ok(sha256_hex(format!("{}:{rendered}", nfc(key))))
}

/// Parent of two sibling hashes (order-independent).
#[must_use]
pub fn hash_pair(a: &str, b: &str) -> String {
    if a <= b {
        sha256_hex(format!("{a}{b}"))
    } else {
        sha256_hex(format!("{b}{a}"))
    }
}

/// Build the Merkle tree of `state`.
///
/// # Errors
///
/// Returns [`CanonicalError`] when a field value has no canonical form or
/// two keys collide after NFC normalization.
pub fn merkleize(state: &Map) -> Result<MerkleTree, CanonicalError> {
    build_tree(&normalized_fields(state)?)
}

/// Disclose `fields` of `state` with proofs against the full state's root.
///
/// Field names match state keys after NFC normalization, and disclosed
/// fields are keyed by their normalized names. Unknown and repeated field
/// names are ignored.
///
/// # Errors
///
/// Same as [`merkleize`].
pub fn selective_disclose(state: &Map, fields: &[&str]) -> Result<Disclosure, CanonicalError> {
    let entries = normalized_fields(state)?;
    let tree = build_tree(&entries)?;
    let wanted: BTreeSet<Cow<'_, str>> = fields.iter().map(|f| nfc(f)).collect();

    let mut disclosed = Map::new();
    let mut proof = Vec::new();
    for (idx, (key, value)) in entries.iter().enumerate() {
        if !wanted.contains(key.as_str()) {
            continue;
        }
        disclosed.insert(key.clone(), (*value).clone());
        proof.extend(authentication_path(&tree.layers, idx));
    }

    Ok(Disclosure {
        disclosed,
        proof,
        root: tree.root,
    })
}

/// State fields under their NFC keys, in normalized key order.
fn normalized_fields(state: &Map) -> Result<Vec<(String, &Value)>, CanonicalError> {
    let mut entries: Vec<(String, &Value)> = state
        .iter()
        .map(|(key, value)| (nfc(key).into_owned(), value))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(pair) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(CanonicalError::DuplicateKey {
            path: String::new(),
            key: pair[0].0.clone(),
        });
    }
    Ok(entries)
}

fn build_tree(entries: &[(String, &Value)]) -> Result<MerkleTree, CanonicalError> {
    let leaves = entries
        .iter()
        .map(|(key, value)| Ok((key.clone(), leaf_hash(key, value)?)))
        .collect::<Result<BTreeMap<_, _>, CanonicalError>>()?;

    let mut layers: Vec<Vec<String>> = vec![leaves.values().cloned().collect()];
    while let Some(current) = layers.last().filter(|layer| layer.len() > 1) {
        let next: Vec<String> = current
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [single] => single.clone(),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
        layers.push(next);
    }

    let root = layers
        .last()
        .and_then(|layer| layer.first())
        .cloned()
        .unwrap_or_else(empty_root);

    Ok(MerkleTree {
        root,
        leaves,
        layers,
    })
}

fn authentication_path(layers: &[Vec<String>], leaf_idx: usize) -> Vec<ProofEntry> {
    let mut path = Vec::new();
    let mut idx = leaf_idx;
    for (layer, nodes) in layers.iter().enumerate().take(layers.len().saturating_sub(1)) {
        let (sibling, position) = if idx % 2 == 0 {
            (idx + 1, Position::Right)
        } else {
            (idx - 1, Position::Left)
        };
        if let Some(hash) = nodes.get(sibling) {
            path.push(ProofEntry {
                hash: hash.clone(),
                position,
                layer,
            });
        }
        idx /= 2;
    }
    path
}

/// Check that every disclosed field reconstructs `root` through its own path.
///
/// Never errors: malformed input is `false`. An empty disclosure verifies
/// only against the empty root with an empty proof.
#[must_use]
pub fn verify_proof(disclosed: &Map, proof: &[ProofEntry], root: &str) -> bool {
    if disclosed.is_empty() {
        return proof.is_empty() && root == empty_root();
    }

    let Ok(entries) = normalized_fields(disclosed) else {
        return false;
    };
    let paths = split_paths(proof);
    if paths.len() != entries.len() {
        return false;
    }

    entries.iter().zip(paths).all(|((key, value), path)| {
        let Ok(mut current) = leaf_hash(key, value) else {
            return false;
        };
        for entry in path {
            current = hash_pair(&current, &entry.hash);
        }
        current == root
    })
}

/// Cut a concatenated proof into per-field paths.
fn split_paths(proof: &[ProofEntry]) -> Vec<&[ProofEntry]> {
    if proof.is_empty() {
        return vec![proof];
    }
    let mut paths = Vec::new();
    let mut start = 0;
    for i in 1..proof.len() {
        if proof[i].layer <= proof[i - 1].layer {
            paths.push(&proof[start..i]);
            start = i;
        }
    }
    paths.push(&proof[start..]);
    paths
}
