//! Resolver capabilities and an in-memory block index.
//!
//! The engine owns no store. Every traversal takes a resolver:
//!
//! - [`Resolve`]: hash → block (backward lookups along refs).
//! - [`ResolveForward`]: hash → blocks that reference it (forward lookups).
//!
//! Both return futures so blocking and cooperative callers share one engine.
//! Plain closures implement them with ready futures:
//!
//! ```ignore
//! let resolve = |hash: &str| index.get(hash).cloned();
//! let history = chain(start, &resolve, 100).await;
//! ```
//!
//! [`BlockIndex`] is a caller-owned index implementing both traits.

use std::collections::{HashMap, HashSet};
use std::future::{Future, ready};

use crate::block::Block;

/// Backward lookup: the block stored under `hash`, if any.
pub trait Resolve {
    fn resolve(&self, hash: &str) -> impl Future<Output = Option<Block>>;
}

/// Forward lookup: blocks whose refs contain `hash`.
///
/// Implementations may over-approximate; callers re-check every candidate.
pub trait ResolveForward {
    fn resolve_forward(&self, hash: &str) -> impl Future<Output = Vec<Block>>;
}

impl<F> Resolve for F
where
    F: Fn(&str) -> Option<Block>,
{
    fn resolve(&self, hash: &str) -> impl Future<Output = Option<Block>> {
        ready(self(hash))
    }
}

impl<F> ResolveForward for F
where
    F: Fn(&str) -> Vec<Block>,
{
    fn resolve_forward(&self, hash: &str) -> impl Future<Output = Vec<Block>> {
        ready(self(hash))
    }
}

// ---------------------------------------------------------------------------
// BlockIndex
// ---------------------------------------------------------------------------

/// In-memory index of blocks by hash, with a reverse reference index.
///
/// Duplicate blocks (same hash) are skipped on insert. Referrers are kept in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    blocks: HashMap<String, Block>,
    /// Target hash → hashes of blocks referencing it.
    referrers: HashMap<String, Vec<String>>,
}

impl BlockIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let mut index = Self::new();
        for block in blocks {
            index.insert(block);
        }
        index
    }

    /// Insert a block. Returns `false` if a block with that hash was already
    /// present.
    pub fn insert(&mut self, block: Block) -> bool {
        if self.blocks.contains_key(block.hash()) {
            return false;
        }

        let mut targets: Vec<&str> = block.referenced_hashes().collect();
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            self.referrers
                .entry(target.to_owned())
                .or_default()
                .push(block.hash().to_owned());
        }

        self.blocks.insert(block.hash().to_owned(), block);
        true
    }

    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&Block> {
        self.blocks.get(hash)
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.blocks.contains_key(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks referencing `hash` through any role, oldest insert first.
    pub fn referrers<'a>(&'a self, hash: &str) -> impl Iterator<Item = &'a Block> + 'a {
        self.referrers
            .get(hash)
            .into_iter()
            .flatten()
            .filter_map(|h| self.blocks.get(h))
    }
}

impl Resolve for BlockIndex {
    fn resolve(&self, hash: &str) -> impl Future<Output = Option<Block>> {
        ready(self.get(hash).cloned())
    }
}

impl ResolveForward for BlockIndex {
    fn resolve_forward(&self, hash: &str) -> impl Future<Output = Vec<Block>> {
        ready(self.referrers(hash).cloned().collect())
    }
}

impl Extend<Block> for BlockIndex {
    fn extend<I: IntoIterator<Item = Block>>(&mut self, iter: I) {
        for block in iter {
            self.insert(block);
        }
    }
}

// ---------------------------------------------------------------------------
// Batch ordering
// ---------------------------------------------------------------------------

/// Order a batch so every block comes after the batch blocks it references.
///
/// Refs to blocks outside the batch are ignored. Input order is otherwise
/// preserved, duplicates are dropped, and a (forged) reference cycle is
/// broken at the first block reached.
#[must_use]
pub fn dependency_order(blocks: &[Block]) -> Vec<Block> {
    let by_hash: HashMap<&str, &Block> = blocks.iter().map(|b| (b.hash(), b)).collect();
    let mut placed: HashSet<&str> = HashSet::with_capacity(blocks.len());
    let mut entered: HashSet<&str> = HashSet::with_capacity(blocks.len());
    let mut ordered = Vec::with_capacity(blocks.len());

    for root in blocks {
        // (block, dependencies already pushed)
        let mut stack: Vec<(&Block, bool)> = vec![(root, false)];

        while let Some((block, expanded)) = stack.pop() {
            if placed.contains(block.hash()) {
                continue;
            }
            if expanded {
                placed.insert(block.hash());
                ordered.push(block.clone());
                continue;
            }
            if !entered.insert(block.hash()) {
                continue;
            }

            stack.push((block, true));
            let deps: Vec<&Block> = block
                .referenced_hashes()
                .filter_map(|h| by_hash.get(h).copied())
                .filter(|dep| !placed.contains(dep.hash()) && !entered.contains(dep.hash()))
                .collect();
            stack.extend(deps.into_iter().rev().map(|dep| (dep, false)));
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::factory::{create, update};
    use crate::value::{Map, Value};
    use serde_json::json;

    fn map(v: serde_json::Value) -> Map {
        Value::from(v).into_object().expect("object")
    }

    fn wire(hash: &str, refs: serde_json::Value) -> Block {
        serde_json::from_value(json!({
            "hash": hash, "type": "substance.product", "state": {}, "refs": refs
        }))
        .expect("wire block")
    }

    fn hashes(blocks: &[Block]) -> Vec<&str> {
        blocks.iter().map(Block::hash).collect()
    }

    #[tokio::test]
    async fn closures_are_resolvers() {
        let block = create("actor.producer", Map::new(), Map::new()).expect("create");
        let stored = block.clone();
        let resolve = move |h: &str| (h == stored.hash()).then(|| stored.clone());
        assert_eq!(resolve.resolve(block.hash()).await, Some(block));
        assert_eq!(resolve.resolve("missing").await, None);

        let forward = |_: &str| Vec::<Block>::new();
        assert!(forward.resolve_forward("x").await.is_empty());
    }

    #[tokio::test]
    async fn index_resolves_both_directions() {
        let farm = create("actor.producer", map(json!({"name": "Farm"})), Map::new())
            .expect("create");
        let wheat = create(
            "substance.ingredient",
            map(json!({"name": "Wheat"})),
            map(json!({"source": farm.hash()})),
        )
        .expect("create");
        let index = BlockIndex::from_blocks([farm.clone(), wheat.clone()]);

        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve(wheat.hash()).await, Some(wheat.clone()));
        assert_eq!(index.resolve_forward(farm.hash()).await, vec![wheat]);
        assert!(index.resolve_forward("nobody").await.is_empty());
    }

    #[test]
    fn insert_skips_duplicates() {
        let block = create("actor.producer", Map::new(), Map::new()).expect("create");
        let mut index = BlockIndex::new();
        assert!(index.insert(block.clone()));
        assert!(!index.insert(block.clone()));
        assert_eq!(index.len(), 1);
        assert!(index.contains(block.hash()));
    }

    #[test]
    fn referrer_listed_once_per_target() {
        let mut index = BlockIndex::new();
        index.insert(wire("r", json!({"a": "t", "b": ["t", "t"]})));
        assert_eq!(index.referrers("t").count(), 1);
    }

    #[test]
    fn dependency_order_puts_refs_first() {
        let base = create("substance.product", map(json!({"v": 1})), Map::new()).expect("create");
        let next = update(base.hash(), "substance.product", map(json!({"v": 2})), Map::new())
            .expect("update");
        let last = update(next.hash(), "substance.product", map(json!({"v": 3})), Map::new())
            .expect("update");

        let ordered = dependency_order(&[last.clone(), base.clone(), next.clone()]);
        assert_eq!(hashes(&ordered), [base.hash(), next.hash(), last.hash()]);
    }

    #[test]
    fn dependency_order_ignores_external_refs_and_dedupes() {
        let a = wire("a", json!({"source": "outside"}));
        let b = wire("b", json!({}));
        let ordered = dependency_order(&[a.clone(), b.clone(), a]);
        assert_eq!(hashes(&ordered), ["a", "b"]);
    }

    #[test]
    fn dependency_order_diamond() {
        let d = wire("d", json!({}));
        let b = wire("b", json!({"x": "d"}));
        let c = wire("c", json!({"x": "d"}));
        let a = wire("a", json!({"inputs": ["b", "c"]}));
        let ordered = dependency_order(&[a, b, c, d]);
        assert_eq!(hashes(&ordered), ["d", "b", "c", "a"]);
    }

    #[test]
    fn dependency_order_survives_cycles() {
        let x = wire("x", json!({"next": "y"}));
        let y = wire("y", json!({"next": "x"}));
        let ordered = dependency_order(&[x, y]);
        assert_eq!(hashes(&ordered), ["y", "x"]);
    }
}
