//! Issue-reference extraction from free-form chat text.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
/// Enumerates failures while building an [`IssueReferenceMatcher`].
pub enum MatcherError {
    #[error("invalid tracker base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("failed to compile issue reference pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One occurrence of an issue mention inside a message.
pub struct IssueReference {
    /// The matched text, e.g. `#42` or `https://tracker.example.com/issues/42`.
    pub raw: String,
    /// The digit run as it appeared in the source text.
    pub issue_id: String,
}

#[derive(Debug, Clone)]
/// Recognizes `#<digits>` and `<base-url>/issues/<digits>` references.
///
/// Compiled once at startup and shared read-only between all dispatch workers.
pub struct IssueReferenceMatcher {
    base_url: String,
    pattern: Regex,
}

impl IssueReferenceMatcher {
    pub fn new(base_url: &str) -> Result<Self, MatcherError> {
        let base_url = validate_tracker_base_url(base_url)?;
        let pattern = Regex::new(&format!(
            r"(#|{}/issues/)([0-9]+)",
            regex::escape(&base_url)
        ))?;
        Ok(Self { base_url, pattern })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Extract every non-overlapping reference, left to right. Duplicates are kept.
    pub fn extract_references(&self, text: &str) -> Vec<IssueReference> {
        self.pattern
            .captures_iter(text)
            .filter_map(|captures| {
                let raw = captures.get(0)?;
                let issue_id = captures.get(2)?;
                Some(IssueReference {
                    raw: raw.as_str().to_string(),
                    issue_id: issue_id.as_str().to_string(),
                })
            })
            .collect()
    }
}

fn validate_tracker_base_url(raw: &str) -> Result<String, MatcherError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: &str| MatcherError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid("url is empty"));
    }
    let parsed = reqwest::Url::parse(trimmed).map_err(|error| invalid(&error.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("url has no host"));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("url must not carry a query or fragment"));
    }
    Ok(trimmed.to_string())
}
