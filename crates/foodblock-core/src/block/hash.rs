//! SHA-256 content addressing.
//!
//! - `hash(type, state, refs) = hex(SHA256(canonical(type, state, refs)))`.
//! - Hashes are 64 lowercase hex characters with no prefix.

use sha2::{Digest, Sha256};

use super::Block;
use super::canonical::{CanonicalError, canonical};
use crate::value::Map;

/// Length of a hex-encoded SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Hex SHA-256 of arbitrary bytes.
#[must_use]
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}

/// Hash of the canonical form of `(type, state, refs)`.
///
/// # Errors
///
/// Propagates [`CanonicalError`] from canonicalization.
pub fn compute_hash(block_type: &str, state: &Map, refs: &Map) -> Result<String, CanonicalError> {
    Ok(sha256_hex(canonical(block_type, state, refs)?))
}

/// Check that a block's stored hash matches its content.
///
/// # Errors
///
/// Propagates [`CanonicalError`] when the content cannot be canonicalized.
pub fn verify_block_hash(block: &Block) -> Result<bool, CanonicalError> {
    Ok(sha256_hex(block.canonical()?) == block.hash())
}

/// `true` if `s` looks like a block hash (64 lowercase hex chars).
#[must_use]
pub fn is_block_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
