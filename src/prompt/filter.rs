//! Keyword blocklist for prompts
//!
//! Matching is plain case-insensitive substring containment. There is no
//! word-boundary handling, so a keyword also rejects any word containing it.

use crate::config::ContentFilterConfig;

#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    enabled: bool,
    keywords: Vec<String>,
}

impl ContentFilter {
    pub fn new(enabled: bool, keywords: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { enabled, keywords }
    }

    pub fn from_config(config: &ContentFilterConfig) -> Self {
        Self::new(config.enabled, &config.keywords)
    }

    /// Whether `text` passes the filter
    pub fn allows(&self, text: &str) -> bool {
        self.first_match(text).is_none()
    }

    /// First blocked keyword found in `text`, for operator logs
    pub fn first_match(&self, text: &str) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| lower.contains(keyword.as_str()))
            .map(String::as_str)
    }
}
