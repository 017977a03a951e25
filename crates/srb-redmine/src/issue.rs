use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
/// An `(id, name)` association on a Redmine issue (status, project, author, ...).
pub struct NamedRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
/// Issue metadata as returned by `GET /issues/<id>.json`.
///
/// Every association is either a complete [`NamedRef`] or absent; a payload with a
/// half-populated association fails to decode instead of producing a partial issue.
pub struct Issue {
    pub id: u64,
    pub subject: String,
    #[serde(default)]
    pub status: Option<NamedRef>,
    #[serde(default)]
    pub project: Option<NamedRef>,
    #[serde(default)]
    pub tracker: Option<NamedRef>,
    #[serde(default)]
    pub priority: Option<NamedRef>,
    #[serde(default)]
    pub author: Option<NamedRef>,
    #[serde(default)]
    pub assigned_to: Option<NamedRef>,
    #[serde(default)]
    pub category: Option<NamedRef>,
    #[serde(default)]
    pub fixed_version: Option<NamedRef>,
}

impl Issue {
    pub fn new(id: u64, subject: impl Into<String>) -> Self {
        Self {
            id,
            subject: subject.into(),
            status: None,
            project: None,
            tracker: None,
            priority: None,
            author: None,
            assigned_to: None,
            category: None,
            fixed_version: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Status and priority classification driven by configured Redmine ids.
pub struct IssueClassifier {
    closed_status_ids: BTreeSet<u64>,
    high_priority_ids: BTreeSet<u64>,
}

impl IssueClassifier {
    pub fn new(
        closed_status_ids: impl IntoIterator<Item = u64>,
        high_priority_ids: impl IntoIterator<Item = u64>,
    ) -> Self {
        Self {
            closed_status_ids: closed_status_ids.into_iter().collect(),
            high_priority_ids: high_priority_ids.into_iter().collect(),
        }
    }

    /// Return true when the issue status is one of the configured closed statuses.
    pub fn is_closed(&self, issue: &Issue) -> bool {
        issue
            .status
            .as_ref()
            .is_some_and(|status| self.closed_status_ids.contains(&status.id))
    }

    /// Return true when the issue priority is one of the configured high priorities.
    pub fn is_high_priority(&self, issue: &Issue) -> bool {
        issue
            .priority
            .as_ref()
            .is_some_and(|priority| self.high_priority_ids.contains(&priority.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Builds browser links to issues from the tracker base URL.
pub struct IssueLinkBuilder {
    base_url: String,
}

impl IssueLinkBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn issue_url(&self, issue_id: u64) -> String {
        format!("{}/issues/{issue_id}", self.base_url)
    }
}
