//! Fork resolution.
//!
//! A merge produces an `observe.merge` block whose `refs.merges` names both
//! heads (in the order given) and whose `state` is the resolved content plus
//! a `strategy` marker.
//!
//! # Strategies
//!
//! - [`merge`]: whole-state resolution. `manual` takes a caller-supplied
//!   state; `a_wins` / `b_wins` adopt one side verbatim.
//! - [`auto_merge`]: field-by-field over the union of both states. Values
//!   that are canonically equal pass through, one-sided values are taken as
//!   is, and divergent values need a [`FieldStrategy`]. A divergent field
//!   without one is a [`MergeError::FieldConflict`]; nothing is resolved
//!   silently.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::Block;
use crate::block::canonical::{CanonicalError, canonicalize_value};
use crate::block::factory::{self, BlockError};
use crate::error::ErrorCode;
use crate::resolve::Resolve;
use crate::value::{Map, Value};

/// Type of merge blocks.
pub const MERGE_TYPE: &str = "observe.merge";

/// Ref role naming the merged heads.
pub const MERGES_ROLE: &str = "merges";

/// State key recording how a merge was resolved.
pub const STRATEGY_KEY: &str = "strategy";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("manual merge requires a state")]
    ManualStateMissing,

    #[error("could not resolve block {hash}")]
    Unresolved { hash: String },

    #[error("auto-merge conflict on field \"{field}\": manual resolution required")]
    FieldConflict { field: String },

    #[error("field \"{field}\": strategy {strategy} needs numeric values on both sides")]
    IncomparableValues {
        field: String,
        strategy: FieldStrategy,
    },

    #[error("unknown merge strategy: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl MergeError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ManualStateMissing => ErrorCode::ManualStateMissing,
            Self::Unresolved { .. } => ErrorCode::UnresolvedBlock,
            Self::FieldConflict { .. } => ErrorCode::FieldConflict,
            Self::IncomparableValues { .. } => ErrorCode::IncomparableValues,
            Self::UnknownStrategy(_) => ErrorCode::UnknownStrategy,
            Self::Block(e) => e.code(),
            Self::Canonical(e) => e.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Whole-state merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    Manual,
    AWins,
    BWins,
}

impl MergeStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AWins => "a_wins",
            Self::BWins => "b_wins",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "a_wins" => Ok(Self::AWins),
            "b_wins" => Ok(Self::BWins),
            other => Err(MergeError::UnknownStrategy(other.to_owned())),
        }
    }
}

/// Per-field resolution for [`auto_merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStrategy {
    /// Last writer wins: `b` is the later writer.
    #[serde(alias = "last_writer_wins")]
    Lww,
    /// Larger number; ties take `b`.
    Max,
    /// Smaller number; ties take `b`.
    Min,
}

impl FieldStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lww => "lww",
            Self::Max => "max",
            Self::Min => "min",
        }
    }

    fn resolve(self, field: &str, a: &Value, b: &Value) -> Result<Value, MergeError> {
        if self == Self::Lww {
            return Ok(b.clone());
        }

        let (Some(na), Some(nb)) = (a.as_number(), b.as_number()) else {
            return Err(MergeError::IncomparableValues {
                field: field.to_owned(),
                strategy: self,
            });
        };
        let ordering = na.numeric_cmp(nb);
        let a_wins = match self {
            Self::Max => ordering == Some(Ordering::Greater),
            Self::Min => ordering == Some(Ordering::Less),
            Self::Lww => false,
        };
        Ok(if a_wins { a.clone() } else { b.clone() })
    }
}

impl fmt::Display for FieldStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldStrategy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lww" | "last_writer_wins" => Ok(Self::Lww),
            "max" => Ok(Self::Max),
            "min" => Ok(Self::Min),
            other => Err(MergeError::UnknownStrategy(other.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Resolve the fork between heads `a` and `b` with a whole-state strategy.
///
/// # Errors
///
/// - [`MergeError::ManualStateMissing`] for `Manual` without `manual_state`.
/// - [`MergeError::Unresolved`] when the winning side does not resolve.
/// - [`MergeError::Block`] if the merge block cannot be built.
pub async fn merge<R: Resolve>(
    a: &str,
    b: &str,
    resolver: &R,
    strategy: MergeStrategy,
    manual_state: Option<Map>,
) -> Result<Block, MergeError> {
    let chosen = match strategy {
        MergeStrategy::Manual => manual_state.ok_or(MergeError::ManualStateMissing)?,
        MergeStrategy::AWins => resolve_required(a, resolver).await?.state().clone(),
        MergeStrategy::BWins => resolve_required(b, resolver).await?.state().clone(),
    };

    let block = merge_block(a, b, strategy.as_str(), chosen)?;
    debug!(a, b, %strategy, hash = %block.hash(), "merged fork");
    Ok(block)
}

/// Resolve the fork between heads `a` and `b` field by field.
///
/// `field_strategies` names the strategy for each field that may diverge.
///
/// # Errors
///
/// - [`MergeError::Unresolved`] when either side does not resolve.
/// - [`MergeError::FieldConflict`] for a divergent field with no strategy.
/// - [`MergeError::IncomparableValues`] for `max` / `min` on a non-number.
/// - [`MergeError::Canonical`] when a state value has no canonical form.
pub async fn auto_merge<R: Resolve>(
    a: &str,
    b: &str,
    resolver: &R,
    field_strategies: &BTreeMap<String, FieldStrategy>,
) -> Result<Block, MergeError> {
    let block_a = resolve_required(a, resolver).await?;
    let block_b = resolve_required(b, resolver).await?;
    let (state_a, state_b) = (block_a.state(), block_b.state());

    let keys: BTreeSet<&String> = state_a.keys().chain(state_b.keys()).collect();
    let mut merged = Map::new();

    for key in keys {
        let value = match (state_a.get(key), state_b.get(key)) {
            (Some(va), Some(vb)) => {
                if canonicalize_value(va)? == canonicalize_value(vb)? {
                    va.clone()
                } else {
                    let strategy = field_strategies.get(key).ok_or_else(|| {
                        MergeError::FieldConflict { field: key.clone() }
                    })?;
                    strategy.resolve(key, va, vb)?
                }
            }
            (Some(only), None) | (None, Some(only)) => only.clone(),
            (None, None) => continue,
        };
        merged.insert(key.clone(), value);
    }

    let block = merge_block(a, b, "auto", merged)?;
    debug!(a, b, hash = %block.hash(), "auto-merged fork");
    Ok(block)
}

async fn resolve_required<R: Resolve>(hash: &str, resolver: &R) -> Result<Block, MergeError> {
    resolver.resolve(hash).await.ok_or_else(|| MergeError::Unresolved {
        hash: hash.to_owned(),
    })
}

/// `{strategy, ...resolved}` with `refs.merges = [a, b]`. A `strategy` key in
/// `resolved` replaces the marker.
fn merge_block(a: &str, b: &str, strategy: &str, resolved: Map) -> Result<Block, MergeError> {
    let mut state = Map::new();
    state.insert(STRATEGY_KEY.to_owned(), Value::from(strategy));
    state.extend(resolved);

    let mut refs = Map::new();
    refs.insert(
        MERGES_ROLE.to_owned(),
        Value::Array(vec![Value::from(a), Value::from(b)]),
    );

    Ok(factory::create(MERGE_TYPE, state, refs)?)
}
