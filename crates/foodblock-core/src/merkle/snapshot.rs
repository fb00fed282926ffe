//! `observe.snapshot` blocks: a Merkle root over a set of block hashes.
//!
//! A snapshot commits to exactly which blocks existed when it was taken.
//! Verification recomputes the root from the blocks a peer holds.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::merkleize;
use crate::block::Block;
use crate::block::canonical::CanonicalError;
use crate::block::factory::{self, BlockError};
use crate::error::ErrorCode;
use crate::value::{Map, Value};

pub const SNAPSHOT_TYPE: &str = "observe.snapshot";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot needs at least one block")]
    Empty,

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl SnapshotError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Empty => ErrorCode::EmptySnapshot,
            Self::Block(e) => e.code(),
            Self::Canonical(e) => e.code(),
        }
    }
}

/// Optional period a snapshot covers (RFC 3339 strings).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVerification {
    pub valid: bool,
    /// Hashes listed by the snapshot but absent from the provided blocks.
    pub missing: Vec<String>,
}

/// Count blocks by type.
#[must_use]
pub fn summarize(blocks: &[Block]) -> Summary {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for block in blocks {
        *by_type.entry(block.block_type().to_owned()).or_default() += 1;
    }
    Summary {
        total: blocks.len(),
        by_type,
    }
}

/// Merkle root over `{hash: hash}` for a set of hashes.
fn hash_set_root<'a>(hashes: impl IntoIterator<Item = &'a str>) -> Result<String, CanonicalError> {
    let state: Map = hashes
        .into_iter()
        .map(|h| (h.to_owned(), Value::from(h)))
        .collect();
    Ok(merkleize(&state)?.root)
}

/// Build a snapshot of `blocks`.
///
/// # Errors
///
/// [`SnapshotError::Empty`] for an empty batch; block construction errors
/// otherwise.
pub fn create_snapshot(
    blocks: &[Block],
    summary: Option<&str>,
    date_range: Option<&DateRange>,
) -> Result<Block, SnapshotError> {
    let hashes: BTreeSet<&str> = blocks
        .iter()
        .map(Block::hash)
        .filter(|h| !h.is_empty())
        .collect();
    if hashes.is_empty() {
        return Err(SnapshotError::Empty);
    }

    let root = hash_set_root(hashes.iter().copied())?;
    let sorted: Vec<Value> = hashes.iter().map(|h| Value::from(*h)).collect();
    let by_type: Map = summarize(blocks)
        .by_type
        .into_iter()
        .map(|(t, n)| (t, Value::from(n)))
        .collect();

    let mut state = Map::new();
    state.insert("merkle_root".into(), Value::from(root));
    state.insert("block_count".into(), Value::from(hashes.len()));
    state.insert("block_hashes".into(), Value::Array(sorted.clone()));
    state.insert("by_type".into(), Value::Object(by_type));
    state.insert("created_at".into(), Value::from(Utc::now().to_rfc3339()));
    if let Some(text) = summary.filter(|s| !s.is_empty()) {
        state.insert("summary".into(), Value::from(text));
    }
    if let Some(range) = date_range {
        let mut period = Map::new();
        period.insert("start".into(), Value::from(range.start.as_str()));
        period.insert("end".into(), Value::from(range.end.as_str()));
        state.insert("date_range".into(), Value::Object(period));
    }

    let mut refs = Map::new();
    refs.insert("blocks".into(), Value::Array(sorted));

    let snapshot = factory::create(SNAPSHOT_TYPE, state, refs)?;
    tracing::debug!(hash = %snapshot.hash(), blocks = hashes.len(), "created snapshot");
    Ok(snapshot)
}

/// Check `blocks` against a snapshot: every listed hash must be present and
/// the recomputed root must match.
#[must_use]
pub fn verify_snapshot(snapshot: &Block, blocks: &[Block]) -> SnapshotVerification {
    let expected: BTreeSet<&str> = snapshot
        .state()
        .get("block_hashes")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let provided: BTreeSet<&str> = blocks.iter().map(Block::hash).collect();

    let missing: Vec<String> = expected
        .difference(&provided)
        .map(|h| (*h).to_owned())
        .collect();

    let recorded_root = snapshot.state().get("merkle_root").and_then(Value::as_str);
    let root_matches = !expected.is_empty()
        && missing.is_empty()
        && hash_set_root(expected.iter().copied())
            .is_ok_and(|root| Some(root.as_str()) == recorded_root);

    SnapshotVerification {
        valid: missing.is_empty() && root_matches,
        missing,
    }
}
