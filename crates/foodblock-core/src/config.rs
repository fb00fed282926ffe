//! Engine configuration: traversal limits and the block type registry.
//!
//! Configuration is immutable data loaded once at startup. Every field has a
//! default, so an empty or missing file yields [`EngineConfig::default`].
//!
//! ```toml
//! [limits]
//! chain_depth = 100
//! recall_depth = 50
//!
//! [registry]
//! event_prefixes = ["transfer.", "transform.", "observe."]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "FOODBLOCK_CONFIG";

pub const DEFAULT_CHAIN_DEPTH: usize = 100;
pub const DEFAULT_HEAD_DEPTH: usize = 1000;
pub const DEFAULT_RECALL_DEPTH: usize = 50;
pub const DEFAULT_CONFLICT_DEPTH: usize = 1000;
pub const DEFAULT_TREE_DEPTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Depth bounds for every traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_chain_depth")]
    pub chain_depth: usize,
    #[serde(default = "default_head_depth")]
    pub head_depth: usize,
    #[serde(default = "default_recall_depth")]
    pub recall_depth: usize,
    #[serde(default = "default_conflict_depth")]
    pub conflict_depth: usize,
    #[serde(default = "default_tree_depth")]
    pub tree_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            chain_depth: default_chain_depth(),
            head_depth: default_head_depth(),
            recall_depth: default_recall_depth(),
            conflict_depth: default_conflict_depth(),
            tree_depth: default_tree_depth(),
        }
    }
}

/// Which types are events (and get an `instance_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_event_prefixes")]
    pub event_prefixes: Vec<String>,
    /// Registry types under an event prefix that are definitions, not events.
    #[serde(default = "default_definitional_types")]
    pub definitional_types: Vec<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            event_prefixes: default_event_prefixes(),
            definitional_types: default_definitional_types(),
        }
    }
}

const fn default_chain_depth() -> usize {
    DEFAULT_CHAIN_DEPTH
}

const fn default_head_depth() -> usize {
    DEFAULT_HEAD_DEPTH
}

const fn default_recall_depth() -> usize {
    DEFAULT_RECALL_DEPTH
}

const fn default_conflict_depth() -> usize {
    DEFAULT_CONFLICT_DEPTH
}

const fn default_tree_depth() -> usize {
    DEFAULT_TREE_DEPTH
}

fn default_event_prefixes() -> Vec<String> {
    ["transfer.", "transform.", "observe."]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_definitional_types() -> Vec<String> {
    [
        "observe.vocabulary",
        "observe.template",
        "observe.schema",
        "observe.trust_policy",
        "observe.protocol",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Parse a TOML config document.
///
/// # Errors
///
/// Returns an error if the document is not valid TOML or has wrongly typed
/// fields.
pub fn parse_config(text: &str) -> Result<EngineConfig> {
    toml::from_str::<EngineConfig>(text).context("Failed to parse foodblock config")
}

/// Load a config file. A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Pick the config file: explicit path, then `$FOODBLOCK_CONFIG`, then
/// `<config dir>/foodblock/config.toml`.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Path>, env_value: Option<String>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(raw.trim()));
    }
    dirs::config_dir().map(|dir| dir.join("foodblock/config.toml"))
}

/// Resolve and load the effective config for this process.
///
/// # Errors
///
/// Returns an error if the selected file exists but is invalid.
pub fn load_effective_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    match resolve_config_path(explicit, env::var(CONFIG_ENV).ok()) {
        Some(path) => load_config(&path),
        None => Ok(EngineConfig::default()),
    }
}
