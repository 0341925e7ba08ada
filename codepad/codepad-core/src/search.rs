//! Name/path pattern search over a project's nodes.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::{Result, StoreError};
use crate::storage::node::NodeType;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 200;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Case-insensitive substring match.
    #[default]
    Substring,
    Regex,
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub pattern: String,
    pub mode: SearchMode,
    pub node_type: Option<NodeType>,
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: SearchMode::Substring,
            node_type: None,
            limit: None,
        }
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self {
            mode: SearchMode::Regex,
            ..Self::substring(pattern)
        }
    }

    pub fn of_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub(crate) fn matcher(&self) -> Result<Matcher> {
        if self.pattern.is_empty() {
            return Err(StoreError::InvalidOperation(
                "search pattern is empty".to_string(),
            ));
        }
        match self.mode {
            SearchMode::Substring => Ok(Matcher::Substring(self.pattern.to_lowercase())),
            SearchMode::Regex => RegexBuilder::new(&self.pattern)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map(Matcher::Regex)
                .map_err(|e| StoreError::InvalidOperation(format!("invalid pattern: {}", e))),
        }
    }
}

pub(crate) enum Matcher {
    Substring(String),
    Regex(Regex),
}

impl Matcher {
    pub(crate) fn is_match(&self, haystack: &str) -> bool {
        match self {
            Matcher::Substring(needle) => haystack.to_lowercase().contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(haystack),
        }
    }
}
