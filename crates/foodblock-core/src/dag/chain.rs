//! Chain walking along `refs.updates`.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::block::Block;
use crate::config::LimitsConfig;
use crate::resolve::{Resolve, ResolveForward};

/// Version history of `start`, newest first.
///
/// Stops at the first unresolved hash, after `max_depth` blocks, or on a
/// revisited hash.
pub async fn chain<R: Resolve>(start: &str, resolver: &R, max_depth: usize) -> Vec<Block> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut history = Vec::new();
    let mut current = Some(start.to_owned());

    while let Some(hash) = current.take() {
        if history.len() >= max_depth {
            debug!(start, max_depth, "chain truncated at depth limit");
            break;
        }
        if !visited.insert(hash.clone()) {
            debug!(hash = %hash, "chain cycle detected");
            break;
        }
        let Some(block) = resolver.resolve(&hash).await else {
            debug!(hash = %hash, "chain stopped at unresolved block");
            break;
        };

        trace!(hash = %hash, depth = history.len(), "chain step");
        current = block.updates().map(str::to_owned);
        history.push(block);
    }

    history
}

/// Latest version of the entity containing `start`.
///
/// Walks forward through the child whose `refs.updates` is the current hash.
/// Stops when no child exists, after `max_depth` steps, or on a revisit.
///
/// Under a fork the resolver's first matching child is taken and a warning is
/// logged; which head wins is then unspecified. Use
/// [`detect_conflict`](super::conflict::detect_conflict) and
/// [`merge`](super::merge::merge) to resolve forks explicitly.
pub async fn head<F: ResolveForward>(start: &str, resolver: &F, max_depth: usize) -> String {
    let mut visited: HashSet<String> = HashSet::from([start.to_owned()]);
    let mut current = start.to_owned();
    let mut steps = 0;

    loop {
        let children: Vec<Block> = resolver
            .resolve_forward(&current)
            .await
            .into_iter()
            .filter(|child| child.updates() == Some(current.as_str()))
            .collect();

        let Some(next) = children.first() else {
            break;
        };
        if steps >= max_depth {
            debug!(start, max_depth, "head truncated at depth limit");
            break;
        }
        if children.len() > 1 {
            warn!(
                hash = %current,
                forks = children.len(),
                chosen = %next.hash(),
                "fork detected while resolving head"
            );
        }
        if !visited.insert(next.hash().to_owned()) {
            debug!(hash = %next.hash(), "head cycle detected");
            break;
        }

        current = next.hash().to_owned();
        steps += 1;
    }

    current
}

// ---------------------------------------------------------------------------
// Provenance tree
// ---------------------------------------------------------------------------

/// A block with every resolvable block it references, by role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvenanceNode {
    pub block: Block,
    /// Role → subtrees, in the role's ref order. Unresolved or already
    /// expanded hashes are absent; roles with no subtrees are omitted.
    pub ancestors: BTreeMap<String, Vec<ProvenanceNode>>,
}

impl ProvenanceNode {
    /// Number of blocks in this subtree.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self
            .ancestors
            .values()
            .flatten()
            .map(Self::size)
            .sum::<usize>()
    }
}

/// Follow every ref recursively from `start`.
///
/// Each hash is expanded at most once per call; nodes deeper than
/// `max_depth` levels below the root are not expanded. Returns `None` when
/// `start` does not resolve or `max_depth` is zero.
pub async fn tree<R: Resolve>(start: &str, resolver: &R, max_depth: usize) -> Option<ProvenanceNode> {
    let mut visited = HashSet::new();
    expand(start.to_owned(), resolver, 0, max_depth, &mut visited).await
}

type NodeFuture<'a> = Pin<Box<dyn Future<Output = Option<ProvenanceNode>> + 'a>>;

fn expand<'a, R: Resolve>(
    hash: String,
    resolver: &'a R,
    depth: usize,
    max_depth: usize,
    visited: &'a mut HashSet<String>,
) -> NodeFuture<'a>
where
    R: 'a,
{
    Box::pin(async move {
        if depth >= max_depth || !visited.insert(hash.clone()) {
            return None;
        }
        let Some(block) = resolver.resolve(&hash).await else {
            debug!(hash = %hash, "provenance tree stopped at unresolved block");
            return None;
        };

        let mut ancestors: BTreeMap<String, Vec<ProvenanceNode>> = BTreeMap::new();
        for (role, target) in block.refs() {
            let mut subtrees = Vec::new();
            for ref_hash in target.hashes() {
                if let Some(node) =
                    expand(ref_hash.to_owned(), resolver, depth + 1, max_depth, visited).await
                {
                    subtrees.push(node);
                }
            }
            if !subtrees.is_empty() {
                ancestors.insert(role.clone(), subtrees);
            }
        }

        Some(ProvenanceNode { block, ancestors })
    })
}

// ---------------------------------------------------------------------------
// Configured bounds
// ---------------------------------------------------------------------------

/// [`chain`] bounded by `limits.chain_depth`.
pub async fn chain_with_limits<R: Resolve>(
    start: &str,
    resolver: &R,
    limits: &LimitsConfig,
) -> Vec<Block> {
    chain(start, resolver, limits.chain_depth).await
}

/// [`head`] bounded by `limits.head_depth`.
pub async fn head_with_limits<F: ResolveForward>(
    start: &str,
    resolver: &F,
    limits: &LimitsConfig,
) -> String {
    head(start, resolver, limits.head_depth).await
}

/// [`tree`] bounded by `limits.tree_depth`.
pub async fn tree_with_limits<R: Resolve>(
    start: &str,
    resolver: &R,
    limits: &LimitsConfig,
) -> Option<ProvenanceNode> {
    tree(start, resolver, limits.tree_depth).await
}
