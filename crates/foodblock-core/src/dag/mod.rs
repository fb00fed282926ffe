//! Version chains, forks and merges over the block graph.
//!
//! Blocks form per-entity version chains through `refs.updates`. Two blocks
//! updating the same predecessor are a **fork**; an `observe.merge` block
//! resolves a fork by naming both heads in `refs.merges`.
//!
//! # Sub-modules
//!
//! - [`chain`]: backward history ([`chain::chain`]), forward head lookup
//!   ([`chain::head`]) and the full provenance tree ([`chain::tree`]).
//! - [`conflict`]: common-ancestor discovery between two heads
//!   ([`conflict::detect_conflict`]).
//! - [`merge`]: strategy merges ([`merge::merge`]) and per-field automatic
//!   merges ([`merge::auto_merge`]).
//!
//! Every traversal here is bounded by a visited set and a depth limit, so
//! cyclic or adversarial input (forged wire blocks) always terminates.
//! Unresolved hashes truncate a walk; they are never errors.

pub mod chain;
pub mod conflict;
pub mod merge;
