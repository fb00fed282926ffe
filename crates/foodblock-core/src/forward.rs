//! Forward traversal: who references a block, and recall tracing.
//!
//! Resolvers may over-approximate forward candidates; every candidate is
//! re-checked here against its own refs before it counts.
//!
//! # Recall semantics
//!
//! [`recall`] is a breadth-first walk outward through referencing blocks. A
//! candidate joins the frontier only if it is unvisited, connected through
//! an allowed role (when roles are given), and of an allowed type (when
//! types are given). Rejected nodes are pruned: nothing reachable only
//! through them is reported.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;
use tracing::{debug, trace};

use crate::block::Block;
use crate::config::{DEFAULT_RECALL_DEPTH, LimitsConfig};
use crate::resolve::ResolveForward;

/// A block referencing the target, and the role it does so through.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardRef {
    pub block: Block,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardResult {
    pub referencing: Vec<ForwardRef>,
    pub count: usize,
}

/// Every `{block, role}` pair whose ref contains `hash`.
///
/// A block referencing `hash` through several roles yields one entry per
/// role. Duplicate candidates from the resolver are reported once.
pub async fn forward<F: ResolveForward>(hash: &str, resolver: &F) -> ForwardResult {
    let referencing: Vec<ForwardRef> = referrers(hash, resolver)
        .await
        .into_iter()
        .flat_map(|(block, roles)| {
            roles.into_iter().map(move |role| ForwardRef {
                block: block.clone(),
                role,
            })
        })
        .collect();
    let count = referencing.len();
    ForwardResult { referencing, count }
}

/// Verified referrers of `hash` with their connecting roles, in resolver
/// order.
async fn referrers<F: ResolveForward>(hash: &str, resolver: &F) -> Vec<(Block, Vec<String>)> {
    let mut seen: HashSet<String> = HashSet::new();
    resolver
        .resolve_forward(hash)
        .await
        .into_iter()
        .filter_map(|block| {
            let roles: Vec<String> = block.roles_referencing(hash).map(str::to_owned).collect();
            if roles.is_empty() || !seen.insert(block.hash().to_owned()) {
                return None;
            }
            Some((block, roles))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Recall
// ---------------------------------------------------------------------------

/// Filters and bounds for [`recall`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecallOptions {
    /// Levels below the source to explore. Zero explores nothing.
    pub max_depth: usize,
    /// Allowed types: exact names, `prefix.*` wildcards, or `*`. Empty allows
    /// all.
    pub types: Vec<String>,
    /// Allowed connecting roles. Empty allows all.
    pub roles: Vec<String>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_RECALL_DEPTH,
            types: Vec::new(),
            roles: Vec::new(),
        }
    }
}

impl RecallOptions {
    #[must_use]
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_depth: limits.recall_depth,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    fn allows_type(&self, block_type: &str) -> bool {
        self.types.is_empty() || self.types.iter().any(|p| type_matches(p, block_type))
    }

    fn allows_roles(&self, roles: &[String]) -> bool {
        self.roles.is_empty() || roles.iter().any(|r| self.roles.contains(r))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallResult {
    /// Affected blocks in discovery order.
    pub affected: Vec<Block>,
    /// Deepest level reached.
    pub depth: usize,
    /// For each affected block, the hash path from the source to it.
    pub paths: Vec<Vec<String>>,
}

/// `true` if `block_type` matches `pattern`: exact, `prefix.*`, or a bare
/// `*` matching every type.
#[must_use]
pub fn type_matches(pattern: &str, block_type: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    pattern.strip_suffix('*').map_or(pattern == block_type, |prefix| {
        pattern.ends_with(".*") && block_type.starts_with(prefix)
    })
}

/// Everything downstream of `source`, subject to `options`.
pub async fn recall<F: ResolveForward>(
    source: &str,
    resolver: &F,
    options: &RecallOptions,
) -> RecallResult {
    struct Entry {
        hash: String,
        depth: usize,
        path: Vec<String>,
    }

    let mut visited: HashSet<String> = HashSet::from([source.to_owned()]);
    let mut queue: VecDeque<Entry> = VecDeque::from([Entry {
        hash: source.to_owned(),
        depth: 0,
        path: vec![source.to_owned()],
    }]);
    let mut result = RecallResult {
        affected: Vec::new(),
        depth: 0,
        paths: Vec::new(),
    };

    while let Some(entry) = queue.pop_front() {
        if entry.depth >= options.max_depth {
            continue;
        }

        for (block, roles) in referrers(&entry.hash, resolver).await {
            if visited.contains(block.hash()) {
                continue;
            }
            if !options.allows_roles(&roles) || !options.allows_type(block.block_type()) {
                trace!(hash = %block.hash(), block_type = block.block_type(), "recall pruned");
                continue;
            }

            visited.insert(block.hash().to_owned());
            let depth = entry.depth + 1;
            let mut path = entry.path.clone();
            path.push(block.hash().to_owned());

            result.depth = result.depth.max(depth);
            result.paths.push(path.clone());
            queue.push_back(Entry {
                hash: block.hash().to_owned(),
                depth,
                path,
            });
            result.affected.push(block);
        }
    }

    debug!(
        source,
        affected = result.affected.len(),
        depth = result.depth,
        "recall finished"
    );
    result
}

/// Every `substance.*` block downstream of an ingredient.
pub async fn downstream<F: ResolveForward>(ingredient: &str, resolver: &F) -> Vec<Block> {
    let options = RecallOptions::default().with_types(["substance.*"]);
    recall(ingredient, resolver, &options).await.affected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::factory::create;
    use crate::resolve::BlockIndex;
    use crate::value::{Map, Value};
    use serde_json::json;

    fn map(v: serde_json::Value) -> Map {
        Value::from(v).into_object().expect("object")
    }

    fn wire(hash: &str, block_type: &str, refs: serde_json::Value) -> Block {
        serde_json::from_value(json!({
            "hash": hash, "type": block_type, "state": {}, "refs": refs
        }))
        .expect("wire block")
    }

    fn hashes(blocks: &[Block]) -> Vec<&str> {
        blocks.iter().map(Block::hash).collect()
    }

    /// flour → dough (transform) → bread (substance) → order (transfer)
    ///      ↘ cake (substance)
    fn bakery() -> BlockIndex {
        BlockIndex::from_blocks([
            wire("flour", "substance.ingredient", json!({})),
            wire("dough", "transform.mix", json!({"inputs": ["flour", "water"]})),
            wire("bread", "substance.product", json!({"source": "dough"})),
            wire("cake", "substance.product", json!({"inputs": ["flour"]})),
            wire("order", "transfer.order", json!({"item": "bread"})),
        ])
    }

    #[test]
    fn type_pattern_matching() {
        assert!(type_matches("substance.*", "substance.product"));
        assert!(!type_matches("substance.*", "substances"));
        assert!(type_matches("transfer.order", "transfer.order"));
        assert!(!type_matches("transfer.order", "transfer.order.x"));
        assert!(!type_matches("substance*", "substance.product"));
        assert!(type_matches("*", "observe.reading"));
    }

    #[tokio::test]
    async fn bare_wildcard_allows_every_type() {
        let options = RecallOptions::default().with_types(["*"]);
        let result = recall("flour", &bakery(), &options).await;
        assert_eq!(hashes(&result.affected), ["dough", "cake", "bread", "order"]);
    }

    #[tokio::test]
    async fn forward_finds_single_and_array_refs() {
        let index = BlockIndex::from_blocks([
            wire("target", "substance.ingredient", json!({})),
            wire("a", "transfer.order", json!({"item": "target"})),
            wire("b", "transform.mix", json!({"inputs": ["x", "target"], "by": "target"})),
        ]);
        let result = forward("target", &index).await;
        assert_eq!(result.count, 3);
        let pairs: Vec<(&str, &str)> = result
            .referencing
            .iter()
            .map(|r| (r.block.hash(), r.role.as_str()))
            .collect();
        assert_eq!(pairs, [("a", "item"), ("b", "by"), ("b", "inputs")]);
    }

    #[tokio::test]
    async fn forward_revalidates_candidates() {
        let unrelated = wire("u", "transfer.order", json!({"item": "other"}));
        let noisy = move |_: &str| vec![unrelated.clone()];
        assert_eq!(forward("target", &noisy).await.count, 0);
    }

    #[tokio::test]
    async fn recall_without_filters_finds_everything() {
        let result = recall("flour", &bakery(), &RecallOptions::default()).await;
        assert_eq!(hashes(&result.affected), ["dough", "cake", "bread", "order"]);
        assert_eq!(result.depth, 3);
        assert_eq!(result.paths[3], ["flour", "dough", "bread", "order"]);
    }

    #[tokio::test]
    async fn type_filter_prunes_intermediaries() {
        let options = RecallOptions::default().with_types(["substance.*"]);
        let result = recall("flour", &bakery(), &options).await;
        // bread is reachable only through dough (a transform), so it is pruned.
        assert_eq!(hashes(&result.affected), ["cake"]);
        assert_eq!(result.depth, 1);
    }

    #[tokio::test]
    async fn role_filter_requires_a_connecting_role() {
        let options = RecallOptions::default().with_roles(["inputs"]);
        let result = recall("flour", &bakery(), &options).await;
        assert_eq!(hashes(&result.affected), ["dough", "cake"]);
    }

    #[tokio::test]
    async fn max_depth_bounds_the_walk() {
        let one = RecallOptions::default().with_max_depth(1);
        let result = recall("flour", &bakery(), &one).await;
        assert_eq!(hashes(&result.affected), ["dough", "cake"]);

        let zero = RecallOptions::default().with_max_depth(0);
        assert!(recall("flour", &bakery(), &zero).await.affected.is_empty());
    }

    #[tokio::test]
    async fn recall_terminates_on_cycles() {
        let index = BlockIndex::from_blocks([
            wire("a", "substance.product", json!({"next": "b"})),
            wire("b", "substance.product", json!({"next": "a"})),
        ]);
        let result = recall("a", &index, &RecallOptions::default()).await;
        assert_eq!(hashes(&result.affected), ["b"]);
    }

    #[tokio::test]
    async fn downstream_lists_substances() {
        let farm = create("actor.producer", Map::new(), Map::new()).expect("farm");
        let wheat = create(
            "substance.ingredient",
            map(json!({"name": "Wheat"})),
            map(json!({"source": farm.hash()})),
        )
        .expect("wheat");
        let bread = create(
            "substance.product",
            map(json!({"name": "Bread"})),
            map(json!({"inputs": [wheat.hash()]})),
        )
        .expect("bread");
        let index = BlockIndex::from_blocks([farm, wheat.clone(), bread.clone()]);

        let found = downstream(wheat.hash(), &index).await;
        assert_eq!(found, vec![bread]);
    }

    #[test]
    fn options_from_limits() {
        let limits = LimitsConfig {
            recall_depth: 7,
            ..LimitsConfig::default()
        };
        assert_eq!(RecallOptions::from_limits(&limits).max_depth, 7);
    }
}
