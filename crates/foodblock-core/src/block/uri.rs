//! `fb:` URIs: `fb:<hash>` or `fb:<type>/<alias>`.

use std::fmt;
use std::str::FromStr;

use super::Block;
use crate::error::ErrorCode;

pub const URI_PREFIX: &str = "fb:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("invalid URI, must start with \"{URI_PREFIX}\": {0}")]
    MissingPrefix(String),

    #[error("invalid URI, empty body")]
    Empty,
}

impl UriError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidUri
    }
}

/// A parsed block URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockUri {
    /// `fb:<hash>`
    Hash(String),
    /// `fb:<type>/<alias>`: a human-readable name for a block of `block_type`.
    Alias { block_type: String, alias: String },
}

impl BlockUri {
    /// URI for a block, by alias when one is given.
    #[must_use]
    pub fn for_block(block: &Block, alias: Option<&str>) -> Self {
        match alias.filter(|a| !a.is_empty()) {
            Some(alias) => Self::Alias {
                block_type: block.block_type().to_owned(),
                alias: alias.to_owned(),
            },
            None => Self::Hash(block.hash().to_owned()),
        }
    }
}

impl fmt::Display for BlockUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{URI_PREFIX}{hash}"),
            Self::Alias { block_type, alias } => write!(f, "{URI_PREFIX}{block_type}/{alias}"),
        }
    }
}

impl FromStr for BlockUri {
    type Err = UriError;

    /// A body with a `.` before its first `/` is an alias; anything else is
    /// a hash.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(URI_PREFIX)
            .ok_or_else(|| UriError::MissingPrefix(s.to_owned()))?;
        if body.is_empty() {
            return Err(UriError::Empty);
        }

        if let (Some(slash), Some(dot)) = (body.find('/'), body.find('.')) {
            if dot < slash {
                return Ok(Self::Alias {
                    block_type: body[..slash].to_owned(),
                    alias: body[slash + 1..].to_owned(),
                });
            }
        }
        Ok(Self::Hash(body.to_owned()))
    }
}

/// Render a block's URI.
#[must_use]
pub fn to_uri(block: &Block, alias: Option<&str>) -> String {
    BlockUri::for_block(block, alias).to_string()
}
