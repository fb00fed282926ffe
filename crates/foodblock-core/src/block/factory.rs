//! Block construction.
//!
//! Every constructor runs the same pipeline:
//!
//! 1. Strip nulls recursively from `state` and `refs`.
//! 2. Validate refs: each role maps to a hash string or an array of hash
//!    strings.
//! 3. Inject a random `instance_id` into `state` for event types that lack
//!    one, so repeated identical observations stay distinct.
//! 4. Hash the canonical form.
//!
//! [`BlockFactory`] carries the type registry. The free functions use the
//! default registry.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::Utc;

use super::canonical::CanonicalError;
use super::hash::compute_hash;
use super::{Block, RefValue, Refs, UPDATES_ROLE, refs_to_map};
use crate::config::{EngineConfig, RegistryConfig};
use crate::error::ErrorCode;
use crate::value::{Map, Value, strip_nulls};

/// State key holding the per-event identity.
pub const INSTANCE_ID_KEY: &str = "instance_id";

/// Type of erasure markers.
pub const TOMBSTONE_TYPE: &str = "observe.tombstone";

/// Default tombstone reason.
pub const ERASURE_REQUEST: &str = "erasure_request";

static DEFAULT_FACTORY: LazyLock<BlockFactory> = LazyLock::new(BlockFactory::default);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    #[error("block type is required")]
    EmptyType,

    #[error("previous hash is required for an update")]
    MissingPreviousHash,

    /// A ref value is neither a string nor an array of strings.
    #[error("refs.{role} {reason}")]
    InvalidRef { role: String, reason: &'static str },

    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

impl BlockError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyType => ErrorCode::InvalidType,
            Self::MissingPreviousHash => ErrorCode::MissingPreviousHash,
            Self::InvalidRef { .. } => ErrorCode::InvalidRef,
            Self::MissingField { .. } => ErrorCode::MissingField,
            Self::Canonical(e) => e.code(),
        }
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Classifies block types as events or definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistry {
    event_prefixes: Vec<String>,
    definitional: BTreeSet<String>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new(
        event_prefixes: impl IntoIterator<Item = String>,
        definitional: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            event_prefixes: event_prefixes.into_iter().collect(),
            definitional: definitional.into_iter().collect(),
        }
    }

    /// `true` for `transfer.*`, `transform.*` and `observe.*` types other
    /// than the definitional registry types (with the default registry).
    #[must_use]
    pub fn is_event_type(&self, block_type: &str) -> bool {
        !self.definitional.contains(block_type)
            && self
                .event_prefixes
                .iter()
                .any(|prefix| block_type.starts_with(prefix.as_str()))
    }
}

impl From<&RegistryConfig> for TypeRegistry {
    fn from(cfg: &RegistryConfig) -> Self {
        Self::new(
            cfg.event_prefixes.iter().cloned(),
            cfg.definitional_types.iter().cloned(),
        )
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

// ---------------------------------------------------------------------------
// BlockFactory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BlockFactory {
    registry: TypeRegistry,
}

impl BlockFactory {
    #[must_use]
    pub const fn new(registry: TypeRegistry) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(TypeRegistry::from(&config.registry))
    }

    #[must_use]
    pub const fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Build a block from raw content.
    ///
    /// # Errors
    ///
    /// - [`BlockError::EmptyType`] for an empty type.
    /// - [`BlockError::InvalidRef`] for a ref that is not a string or string
    ///   array (after null stripping).
    /// - [`BlockError::Canonical`] for content without a canonical form.
    pub fn create(&self, block_type: &str, state: Map, refs: Map) -> Result<Block, BlockError> {
        if block_type.is_empty() {
            return Err(BlockError::EmptyType);
        }

        let mut state = strip_nulls(state);
        let refs = validate_refs(strip_nulls(refs))?;

        if self.registry.is_event_type(block_type) && !state.contains_key(INSTANCE_ID_KEY) {
            state.insert(
                INSTANCE_ID_KEY.to_owned(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        let hash = compute_hash(block_type, &state, &refs_to_map(&refs))?;
        tracing::trace!(block_type, hash = %hash, "created block");

        Ok(Block {
            hash,
            block_type: block_type.to_owned(),
            state,
            refs,
        })
    }

    /// Create a new version of an entity. `state` replaces the previous state
    /// entirely; `refs.updates` is forced to `previous_hash`.
    ///
    /// # Errors
    ///
    /// [`BlockError::MissingPreviousHash`] for an empty `previous_hash`, plus
    /// everything [`create`](Self::create) returns.
    pub fn update(
        &self,
        previous_hash: &str,
        block_type: &str,
        state: Map,
        mut refs: Map,
    ) -> Result<Block, BlockError> {
        if previous_hash.is_empty() {
            return Err(BlockError::MissingPreviousHash);
        }
        refs.insert(UPDATES_ROLE.to_owned(), Value::from(previous_hash));
        self.create(block_type, state, refs)
    }

    /// Update with partial-state semantics: `changes` is shallow-merged over
    /// the previous state. A `null` in `changes` removes that field.
    ///
    /// The previous block's refs are not carried over; pass them in
    /// `extra_refs` when they still apply.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub fn merge_update(
        &self,
        previous: &Block,
        changes: Map,
        extra_refs: Map,
    ) -> Result<Block, BlockError> {
        let mut state = previous.state.clone();
        state.extend(changes);
        self.update(&previous.hash, &previous.block_type, state, extra_refs)
    }

    /// Erasure marker for `target_hash`: an update of the target whose refs
    /// also name it as `target`.
    ///
    /// # Errors
    ///
    /// [`BlockError::MissingField`] when `target_hash` or `requested_by` is
    /// empty.
    pub fn tombstone(
        &self,
        target_hash: &str,
        requested_by: &str,
        reason: Option<&str>,
    ) -> Result<Block, BlockError> {
        if target_hash.is_empty() {
            return Err(BlockError::MissingField {
                field: "target_hash",
            });
        }
        if requested_by.is_empty() {
            return Err(BlockError::MissingField {
                field: "requested_by",
            });
        }

        let mut state = Map::new();
        state.insert("reason".into(), Value::from(reason.unwrap_or(ERASURE_REQUEST)));
        state.insert("requested_by".into(), Value::from(requested_by));
        state.insert("requested_at".into(), Value::from(Utc::now().to_rfc3339()));

        let mut refs = Map::new();
        refs.insert("target".into(), Value::from(target_hash));
        refs.insert(UPDATES_ROLE.into(), Value::from(target_hash));

        self.create(TOMBSTONE_TYPE, state, refs)
    }
}

/// The shared factory with the default registry.
#[must_use]
pub fn default_factory() -> &'static BlockFactory {
    &DEFAULT_FACTORY
}

/// [`BlockFactory::create`] with the default registry.
///
/// # Errors
///
/// See [`BlockFactory::create`].
pub fn create(block_type: &str, state: Map, refs: Map) -> Result<Block, BlockError> {
    DEFAULT_FACTORY.create(block_type, state, refs)
}

/// [`BlockFactory::update`] with the default registry.
///
/// # Errors
///
/// See [`BlockFactory::update`].
pub fn update(
    previous_hash: &str,
    block_type: &str,
    state: Map,
    refs: Map,
) -> Result<Block, BlockError> {
    DEFAULT_FACTORY.update(previous_hash, block_type, state, refs)
}

/// [`BlockFactory::merge_update`] with the default registry.
///
/// # Errors
///
/// See [`BlockFactory::merge_update`].
pub fn merge_update(previous: &Block, changes: Map, extra_refs: Map) -> Result<Block, BlockError> {
    DEFAULT_FACTORY.merge_update(previous, changes, extra_refs)
}

/// [`BlockFactory::tombstone`] with the default registry.
///
/// # Errors
///
/// See [`BlockFactory::tombstone`].
pub fn tombstone(
    target_hash: &str,
    requested_by: &str,
    reason: Option<&str>,
) -> Result<Block, BlockError> {
    DEFAULT_FACTORY.tombstone(target_hash, requested_by, reason)
}

/// Convert null-stripped raw refs into typed refs.
fn validate_refs(raw: Map) -> Result<Refs, BlockError> {
    raw.into_iter()
        .map(|(role, value)| {
            let target = match value {
                Value::String(hash) => RefValue::One(hash),
                Value::Array(items) => {
                    let hashes = items
                        .into_iter()
                        .map(|item| match item {
                            Value::String(hash) => Some(hash),
                            _ => None,
                        })
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| BlockError::InvalidRef {
                            role: role.clone(),
                            reason: "array contains a non-string value",
                        })?;
                    RefValue::Many(hashes)
                }
                _ => {
                    return Err(BlockError::InvalidRef {
                        role,
                        reason: "must be a string or an array of strings",
                    });
                }
            };
            Ok((role, target))
        })
        .collect()
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

    #[test]
    fn key_order_does_not_change_hash() {
        let a = create("test", map(json!({"a": 1, "b": 2})), Map::new()).expect("create");
        let b = create("test", map(json!({"b": 2, "a": 1})), Map::new()).expect("create");
        assert_eq!(a.hash(), b.hash());
        assert!(a.verify());
    }

    #[test]
    fn refs_array_order_does_not_change_hash() {
        let a = create(
            "transform.bake",
            map(json!({"instance_id": "fixed"})),
            map(json!({"inputs": ["x", "y", "z"]})),
        )
        .expect("create");
        let b = create(
            "transform.bake",
            map(json!({"instance_id": "fixed"})),
            map(json!({"inputs": ["z", "x", "y"]})),
        )
        .expect("create");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn state_array_order_changes_hash() {
        let a = create("substance.recipe", map(json!({"steps": ["mix", "bake"]})), Map::new())
            .expect("create");
        let b = create("substance.recipe", map(json!({"steps": ["bake", "mix"]})), Map::new())
            .expect("create");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn nulls_are_stripped_from_block() {
        let block = create(
            "substance.product",
            map(json!({"name": "Bread", "price": null, "meta": {"x": null, "y": 1}})),
            map(json!({"seller": "s", "buyer": null})),
        )
        .expect("create");
        assert_eq!(block.state(), &map(json!({"name": "Bread", "meta": {"y": 1}})));
        assert!(!block.refs().contains_key("buyer"));

        let clean = create(
            "substance.product",
            map(json!({"name": "Bread", "meta": {"y": 1}})),
            map(json!({"seller": "s"})),
        )
        .expect("create");
        assert_eq!(block.hash(), clean.hash());
    }

    #[test]
    fn null_elements_in_ref_arrays_are_dropped() {
        let block = create("substance.product", Map::new(), map(json!({"inputs": ["a", null]})))
            .expect("create");
        assert_eq!(
            block.refs()["inputs"],
            RefValue::Many(vec!["a".to_owned()])
        );
    }

    #[test]
    fn invalid_refs_are_rejected() {
        let err = create("t", Map::new(), map(json!({"seller": 5}))).expect_err("number ref");
        assert_eq!(
            err,
            BlockError::InvalidRef {
                role: "seller".into(),
                reason: "must be a string or an array of strings"
            }
        );
        assert_eq!(err.code(), ErrorCode::InvalidRef);

        let err = create("t", Map::new(), map(json!({"inputs": ["a", 1]}))).expect_err("mixed");
        assert!(matches!(err, BlockError::InvalidRef { ref role, .. } if role == "inputs"));

        let err = create("t", Map::new(), map(json!({"x": {"y": "z"}}))).expect_err("object");
        assert!(matches!(err, BlockError::InvalidRef { .. }));
    }

    #[test]
    fn empty_type_is_rejected() {
        assert_eq!(create("", Map::new(), Map::new()), Err(BlockError::EmptyType));
    }

    #[test]
    fn non_finite_state_is_rejected() {
        let mut state = Map::new();
        state.insert("temp".into(), Value::from(f64::NAN));
        let err = create("substance.product", state, Map::new()).expect_err("nan");
        assert_eq!(err.code(), ErrorCode::NonFiniteNumber);
    }

    #[test]
    fn event_types_get_instance_id() {
        let a = create("observe.reading", map(json!({"temp": 4})), Map::new()).expect("create");
        let b = create("observe.reading", map(json!({"temp": 4})), Map::new()).expect("create");
        assert!(a.state().contains_key(INSTANCE_ID_KEY));
        assert_ne!(a.hash(), b.hash(), "repeated observations stay distinct");

        for t in ["transfer.order", "transform.bake"] {
            let block = create(t, Map::new(), Map::new()).expect("create");
            assert!(block.state().contains_key(INSTANCE_ID_KEY), "{t}");
        }
    }

    #[test]
    fn definitional_and_entity_types_have_no_instance_id() {
        for t in ["observe.vocabulary", "observe.schema", "substance.product", "actor.producer"] {
            let block = create(t, Map::new(), Map::new()).expect("create");
            assert!(!block.state().contains_key(INSTANCE_ID_KEY), "{t}");
        }
    }

    #[test]
    fn explicit_instance_id_is_kept() {
        let a = create("observe.reading", map(json!({"instance_id": "i-1"})), Map::new())
            .expect("create");
        let b = create("observe.reading", map(json!({"instance_id": "i-1"})), Map::new())
            .expect("create");
        assert_eq!(a.state()[INSTANCE_ID_KEY], Value::from("i-1"));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn custom_registry_changes_event_classification() {
        let factory = BlockFactory::new(TypeRegistry::new(
            ["substance.".to_owned()],
            Vec::<String>::new(),
        ));
        let block = factory.create("substance.batch", Map::new(), Map::new()).expect("create");
        assert!(block.state().contains_key(INSTANCE_ID_KEY));
        let obs = factory.create("observe.reading", Map::new(), Map::new()).expect("create");
        assert!(!obs.state().contains_key(INSTANCE_ID_KEY));
    }

    #[test]
    fn update_links_previous_and_replaces_state() {
        let base = create("substance.product", map(json!({"name": "Bread", "price": 4})), Map::new())
            .expect("create");
        let next = update(base.hash(), "substance.product", map(json!({"price": 5})), Map::new())
            .expect("update");
        assert_eq!(next.updates(), Some(base.hash()));
        assert_ne!(next.hash(), base.hash());
        assert_eq!(next.state(), &map(json!({"price": 5})), "state is not merged");
    }

    #[test]
    fn update_overrides_caller_updates_ref() {
        let next = update("prev", "substance.product", Map::new(), map(json!({"updates": "other"})))
            .expect("update");
        assert_eq!(next.updates(), Some("prev"));
    }

    #[test]
    fn update_requires_previous_hash() {
        assert_eq!(
            update("", "substance.product", Map::new(), Map::new()),
            Err(BlockError::MissingPreviousHash)
        );
    }

    #[test]
    fn merge_update_is_shallow() {
        let base = create(
            "substance.product",
            map(json!({"name": "Bread", "price": 4, "meta": {"a": 1}})),
            map(json!({"seller": "s"})),
        )
        .expect("create");
        let next = merge_update(
            &base,
            map(json!({"price": 5, "meta": {"b": 2}, "name": null})),
            Map::new(),
        )
        .expect("merge update");
        assert_eq!(next.state(), &map(json!({"price": 5, "meta": {"b": 2}})));
        assert_eq!(next.block_type(), "substance.product");
        assert_eq!(next.updates(), Some(base.hash()));
        assert!(!next.refs().contains_key("seller"));
    }

    #[test]
    fn tombstone_targets_and_updates() {
        let target = create("substance.product", map(json!({"name": "x"})), Map::new())
            .expect("create");
        let tomb = tombstone(target.hash(), "actor-1", None).expect("tombstone");
        assert_eq!(tomb.block_type(), TOMBSTONE_TYPE);
        assert_eq!(tomb.updates(), Some(target.hash()));
        assert_eq!(tomb.refs()["target"], RefValue::from(target.hash()));
        assert_eq!(tomb.state()["reason"], Value::from(ERASURE_REQUEST));
        assert!(tomb.state().contains_key("requested_at"));
        assert!(tomb.state().contains_key(INSTANCE_ID_KEY));
    }

    #[test]
    fn tombstone_requires_fields() {
        assert_eq!(
            tombstone("", "actor", None),
            Err(BlockError::MissingField { field: "target_hash" })
        );
        assert_eq!(
            tombstone("h", "", Some("legal")),
            Err(BlockError::MissingField { field: "requested_by" })
        );
    }
}
