use anyhow::{Context, Result};
use regex::Regex;

use super::Detection;

/// Drops detections whose description mentions a static decoration
/// (lit reindeer, holiday lights, lawn ornaments).
#[derive(Clone, Debug)]
pub struct DecorationFilter {
    pattern: Option<Regex>,
}

impl DecorationFilter {
    /// Case-insensitive substring match on any of `keywords`. An empty list
    /// disables filtering.
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self> {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim())
            .filter(|k| !k.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Ok(Self::disabled());
        }
        let pattern = Regex::new(&format!("(?i)(?:{})", alternatives.join("|")))
            .context("build decoration keyword pattern")?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn disabled() -> Self {
        Self { pattern: None }
    }

    /// The keyword that matched `description`, if any.
    pub fn matched_keyword<'a>(&self, description: &'a str) -> Option<&'a str> {
        self.pattern
            .as_ref()
            .and_then(|re| re.find(description))
            .map(|m| m.as_str())
    }

    pub fn is_ignored(&self, detection: &Detection) -> bool {
        self.matched_keyword(&detection.description).is_some()
    }

    /// Split into (kept, ignored), preserving order.
    pub fn partition(&self, detections: Vec<Detection>) -> (Vec<Detection>, Vec<Detection>) {
        detections.into_iter().partition(|d| !self.is_ignored(d))
    }
}

impl Default for DecorationFilter {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_IGNORE_KEYWORDS)
            .unwrap_or_else(|_| Self::disabled())
    }
}
