//! Upstream key filter
//!
//! A regular expression matched anywhere in the key name; anchor with `^`
//! and `$` to match whole keys. Records whose key does not match never
//! reach the classifier.

use super::SourceError;
use regex::Regex;

/// Compiled key-name pattern
#[derive(Debug, Clone)]
pub struct KeyFilter {
    regex: Regex,
}

impl KeyFilter {
    /// Compile a pattern. Empty patterns and invalid expressions are rejected.
    pub fn new(pattern: &str) -> Result<Self, SourceError> {
        if pattern.is_empty() {
            return Err(SourceError::Filter("pattern is empty".to_string()));
        }
        let regex = Regex::new(pattern)
            .map_err(|e| SourceError::Filter(format!("pattern '{}': {}", pattern, e)))?;
        Ok(KeyFilter { regex })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    #[inline]
    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
