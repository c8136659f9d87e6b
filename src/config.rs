//! # Configuration
//!
//! Tuning knobs for the keyword index and the free-text matcher. Defaults reproduce the
//! documented behaviour; a JSON file may override any subset of them.

use crate::error::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Number of surviving tokens per message that go into the keyword index.
pub const DEFAULT_KEYWORD_LIMIT: usize = 10;

/// Shortest token the keyword index keeps.
pub const DEFAULT_MIN_KEYWORD_LEN: usize = 3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Tokens indexed per message. Longer messages lose recall past this point.
    pub keyword_limit: usize,

    /// Tokens shorter than this never enter the keyword index.
    pub min_keyword_len: usize,

    /// Enables edit-distance matching in free-text search.
    pub fuzzy: bool,

    /// Words shorter than this are never fuzzy-matched.
    pub fuzzy_min_word_len: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            keyword_limit: DEFAULT_KEYWORD_LIMIT,
            min_keyword_len: DEFAULT_MIN_KEYWORD_LEN,
            fuzzy: true,
            fuzzy_min_word_len: 3,
        }
    }
}

impl LogConfig {
    /// Loads a `LogConfig` from a JSON file. Keys that are absent keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Returns a one-line summary of the configuration.
    pub fn stats(&self) -> String {
        format!(
            "LogConfig: keyword_limit {} min_keyword_len {} fuzzy:{} fuzzy_min_word_len {}",
            self.keyword_limit, self.min_keyword_len, self.fuzzy, self.fuzzy_min_word_len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = LogConfig::from_json(r#"{"fuzzy": false}"#).unwrap();
        assert!(!config.fuzzy);
        assert_eq!(config.keyword_limit, DEFAULT_KEYWORD_LIMIT);
        assert_eq!(config.min_keyword_len, DEFAULT_MIN_KEYWORD_LEN);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(LogConfig::from_json("{fuzzy").is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LogConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, crate::error::LoadError::Io(_)));
    }
}
