//! Configuration types for the local history core

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LvcsResult;

/// Case sensitivity modes for entry names
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseSensitivity {
    Sensitive,
    InsensitivePreserving,
}

impl CaseSensitivity {
    pub fn names_equal(self, left: &str, right: &str) -> bool {
        match self {
            CaseSensitivity::Sensitive => left == right,
            CaseSensitivity::InsensitivePreserving => {
                left.to_lowercase() == right.to_lowercase()
            }
        }
    }
}

impl Default for CaseSensitivity {
    fn default() -> Self {
        CaseSensitivity::Sensitive
    }
}

/// Main local history configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LvcsConfig {
    pub case_sensitivity: CaseSensitivity,
    /// Contents up to this many bytes are kept inline instead of in the store.
    pub inline_content_threshold: usize,
    /// Contents longer than this are recorded as unavailable.
    pub max_content_length: usize,
    pub recent_changes_limit: usize,
    pub purge_period_ms: i64,
}

impl LvcsConfig {
    pub fn from_json_str(json: &str) -> LvcsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> LvcsResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

impl Default for LvcsConfig {
    fn default() -> Self {
        Self {
            case_sensitivity: CaseSensitivity::default(),
            inline_content_threshold: 0,
            max_content_length: 1024 * 1024, // 1MB
            recent_changes_limit: 20,
            purge_period_ms: 3 * 24 * 60 * 60 * 1000, // 3 days
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_equal() {
        assert!(CaseSensitivity::Sensitive.names_equal("File.txt", "File.txt"));
        assert!(!CaseSensitivity::Sensitive.names_equal("File.txt", "file.txt"));
        assert!(CaseSensitivity::InsensitivePreserving.names_equal("File.txt", "file.TXT"));
        assert!(!CaseSensitivity::InsensitivePreserving.names_equal("file", "files"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            LvcsConfig::from_json_str(r#"{ "case_sensitivity": "InsensitivePreserving" }"#)
                .unwrap();
        assert_eq!(config.case_sensitivity, CaseSensitivity::InsensitivePreserving);
        assert_eq!(config.recent_changes_limit, 20);
        assert_eq!(config.max_content_length, 1024 * 1024);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = LvcsConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, crate::LvcsError::Config(_)));
    }
}
