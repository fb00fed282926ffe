//! Fork detection between two chain heads.
//!
//! # Algorithm
//!
//! Walk `a`'s update chain recording every hash, then walk `b`'s chain until
//! it reaches a hash recorded by the first walk. That hash is the common
//! ancestor. Both walks carry their own visited set and depth bound.
//!
//! Update chains are singly linked, so once the two walks meet they coincide
//! from there on: swapping `a` and `b` yields the same ancestor.
//!
//! # Edge cases
//!
//! - `a == b`: no conflict; the ancestor is `a`.
//! - One head is an ancestor of the other: the older head is the common
//!   ancestor ([`ConflictReport::is_fast_forward`]).
//! - Disjoint histories or unresolved hashes: no ancestor, no conflict.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, trace};

use crate::block::Block;
use crate::config::{DEFAULT_CONFLICT_DEPTH, LimitsConfig};
use crate::resolve::Resolve;

/// Outcome of [`detect_conflict`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub is_conflict: bool,
    pub common_ancestor: Option<String>,
    /// Blocks of `a`'s chain newer than the ancestor (the whole walk when no
    /// ancestor was found).
    pub chain_a: Vec<Block>,
    /// Blocks of `b`'s chain newer than the ancestor.
    pub chain_b: Vec<Block>,
    pub head_a: String,
    pub head_b: String,
}

impl ConflictReport {
    /// `true` when one head descends from the other, so no merge block is
    /// needed.
    #[must_use]
    pub fn is_fast_forward(&self) -> bool {
        self.common_ancestor
            .as_deref()
            .is_some_and(|ancestor| ancestor == self.head_a || ancestor == self.head_b)
    }
}

/// [`detect_conflict_with_depth`] with the default depth bound.
pub async fn detect_conflict<R: Resolve>(a: &str, b: &str, resolver: &R) -> ConflictReport {
    detect_conflict_with_depth(a, b, resolver, DEFAULT_CONFLICT_DEPTH).await
}

/// [`detect_conflict_with_depth`] bounded by `limits.conflict_depth`.
pub async fn detect_conflict_with_limits<R: Resolve>(
    a: &str,
    b: &str,
    resolver: &R,
    limits: &LimitsConfig,
) -> ConflictReport {
    detect_conflict_with_depth(a, b, resolver, limits.conflict_depth).await
}

/// Find the common ancestor of heads `a` and `b`.
///
/// Each chain walk visits at most `max_depth` blocks.
pub async fn detect_conflict_with_depth<R: Resolve>(
    a: &str,
    b: &str,
    resolver: &R,
    max_depth: usize,
) -> ConflictReport {
    let mut report = ConflictReport {
        is_conflict: false,
        common_ancestor: None,
        chain_a: Vec::new(),
        chain_b: Vec::new(),
        head_a: a.to_owned(),
        head_b: b.to_owned(),
    };

    if a == b {
        report.common_ancestor = Some(a.to_owned());
        return report;
    }

    // Walk A, recording every hash before it is resolved, so an unresolved
    // tip can still be met by B.
    let mut visited_a: HashSet<String> = HashSet::new();
    let mut order_a: Vec<String> = Vec::new();
    let mut current = Some(a.to_owned());
    while let Some(hash) = current.take() {
        if order_a.len() >= max_depth || !visited_a.insert(hash.clone()) {
            break;
        }
        order_a.push(hash.clone());
        let Some(block) = resolver.resolve(&hash).await else {
            break;
        };
        current = block.updates().map(str::to_owned);
        report.chain_a.push(block);
    }

    // Walk B until it meets A.
    let mut visited_b: HashSet<String> = HashSet::new();
    let mut current = Some(b.to_owned());
    while let Some(hash) = current.take() {
        if visited_a.contains(&hash) {
            report.common_ancestor = Some(hash);
            break;
        }
        if report.chain_b.len() >= max_depth || !visited_b.insert(hash.clone()) {
            break;
        }
        let Some(block) = resolver.resolve(&hash).await else {
            break;
        };
        trace!(hash = %hash, "conflict walk b");
        current = block.updates().map(str::to_owned);
        report.chain_b.push(block);
    }

    if let Some(ancestor) = &report.common_ancestor {
        let keep = order_a.iter().position(|h| h == ancestor).unwrap_or(order_a.len());
        report.chain_a.truncate(keep);
        report.is_conflict = true;
    }

    debug!(
        a,
        b,
        ancestor = report.common_ancestor.as_deref().unwrap_or("-"),
        is_conflict = report.is_conflict,
        "conflict detection finished"
    );
    report
}
