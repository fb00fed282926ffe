//! foodblock-core library.
//!
//! Content-addressed provenance blocks: canonical hashing, version chains,
//! fork detection and merging, Merkle selective disclosure, and forward
//! recall tracing. The crate owns no store; traversals take caller-supplied
//! resolvers ([`resolve::Resolve`], [`resolve::ResolveForward`]).

pub mod block;
pub mod config;
pub mod dag;
pub mod error;
pub mod forward;
pub mod merkle;
pub mod resolve;
pub mod value;

pub use block::factory::{BlockError, BlockFactory, create, merge_update, tombstone, update};
pub use block::{Block, RefValue, Refs};
pub use config::{EngineConfig, LimitsConfig, load_effective_config};
pub use dag::chain::{chain, chain_with_limits, head, head_with_limits, tree, tree_with_limits};
pub use dag::conflict::{ConflictReport, detect_conflict, detect_conflict_with_limits};
pub use dag::merge::{FieldStrategy, MergeError, MergeStrategy, auto_merge, merge};
pub use error::ErrorCode;
pub use forward::{RecallOptions, RecallResult, downstream, forward, recall};
pub use merkle::{merkleize, selective_disclose, verify_proof};
pub use resolve::{BlockIndex, Resolve, ResolveForward};
pub use value::{Map, Value};

/// # Conventions
///
/// - **Errors**: per-module `thiserror` enums with a `code()` mapping to
///   [`ErrorCode`]; `anyhow::Result` only for config loading.
/// - **Logging**: `tracing` macros. `debug!` when a traversal truncates,
///   `warn!` on forks seen by `head`, `trace!` per step.
/// - **Traversals**: every walk carries a visited set and a depth bound.
pub const PROTOCOL_VERSION: &str = block::sign::PROTOCOL_VERSION;
