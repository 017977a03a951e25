//! Redmine REST client used to enrich issue references.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::issue::{Issue, IssueLinkBuilder};

const REDMINE_API_KEY_HEADER: &str = "x-redmine-api-key";

#[derive(Debug, Error)]
/// Enumerates supported `RedmineError` values.
pub enum RedmineError {
    #[error("redmine request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("redmine returned non-success status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode redmine issue payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("redmine issue payload is invalid: {0}")]
    InvalidIssue(String),
    #[error("invalid issue id '{0}'")]
    InvalidIssueId(String),
    #[error("invalid redmine api key header value")]
    InvalidApiKey,
}

/// Fetches live issue metadata for a normalized issue id.
#[async_trait]
pub trait IssueGateway: Send + Sync {
    async fn fetch(&self, issue_id: &str) -> Result<Issue, RedmineError>;
}

/// Normalize a matched issue id before lookup.
pub fn normalize_issue_id(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[derive(Debug, Deserialize)]
struct RedmineIssueEnvelope {
    issue: Option<Issue>,
}

#[derive(Clone)]
pub struct RedmineClient {
    http: reqwest::Client,
    links: IssueLinkBuilder,
}

impl RedmineClient {
    pub fn new(base_url: &str, api_key: &str, request_timeout_ms: u64) -> Result<Self, RedmineError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("slack-redmine-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let mut api_key_value = reqwest::header::HeaderValue::from_str(api_key.trim())
            .map_err(|_| RedmineError::InvalidApiKey)?;
        api_key_value.set_sensitive(true);
        headers.insert(REDMINE_API_KEY_HEADER, api_key_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            links: IssueLinkBuilder::new(base_url),
        })
    }

    fn issue_json_url(&self, issue_id: &str) -> String {
        format!("{}/issues/{issue_id}.json", self.links.base_url())
    }
}

#[async_trait]
impl IssueGateway for RedmineClient {
    async fn fetch(&self, issue_id: &str) -> Result<Issue, RedmineError> {
        let issue_id = normalize_issue_id(issue_id);
        if issue_id.is_empty() || !issue_id.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(RedmineError::InvalidIssueId(issue_id));
        }

        debug!(issue_id = %issue_id, "fetching redmine issue");
        let response = self.http.get(self.issue_json_url(&issue_id)).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RedmineError::Status {
                status: status.as_u16(),
                body: truncate_for_error(&body, 320),
            });
        }

        let envelope = serde_json::from_str::<RedmineIssueEnvelope>(&body)?;
        let issue = envelope
            .issue
            .ok_or_else(|| RedmineError::InvalidIssue("response has no issue object".to_string()))?;
        if issue.id == 0 {
            return Err(RedmineError::InvalidIssue(
                "issue id must be positive".to_string(),
            ));
        }
        Ok(issue)
    }
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
