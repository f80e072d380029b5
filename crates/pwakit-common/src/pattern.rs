//! URL patterns for classifying requests.

use serde::{Deserialize, Serialize};
use url::Url;

/// How a [`UrlPattern`] compares against a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Whole URL equals the pattern.
    Exact,
    /// URL starts with the pattern.
    Prefix,
    /// URL ends with the pattern.
    Suffix,
    /// URL contains the pattern anywhere.
    Contains,
}

/// A URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub pattern: String,
}

impl UrlPattern {
    pub fn exact(url: &str) -> Self {
        Self::new(PatternType::Exact, url)
    }

    pub fn prefix(prefix: &str) -> Self {
        Self::new(PatternType::Prefix, prefix)
    }

    pub fn suffix(suffix: &str) -> Self {
        Self::new(PatternType::Suffix, suffix)
    }

    pub fn contains(substring: &str) -> Self {
        Self::new(PatternType::Contains, substring)
    }

    fn new(pattern_type: PatternType, pattern: &str) -> Self {
        Self {
            pattern_type,
            pattern: pattern.to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let url_str = url.as_str();
        match self.pattern_type {
            PatternType::Exact => url_str == self.pattern,
            PatternType::Prefix => url_str.starts_with(&self.pattern),
            PatternType::Suffix => url_str.ends_with(&self.pattern),
            PatternType::Contains => url_str.contains(&self.pattern),
        }
    }

    /// True if any pattern in `patterns` matches `url`.
    pub fn any_match(patterns: &[UrlPattern], url: &Url) -> bool {
        patterns.iter().any(|p| p.matches(url))
    }
}
