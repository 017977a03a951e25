//! Redmine side of the Slack/Redmine bridge.
//! This crate provides the issue model, issue-reference extraction from chat
//! text, and the HTTP gateway used to enrich references with live issue state.

pub mod issue;
pub mod issue_reference;
pub mod redmine_client;

pub use issue::{Issue, IssueClassifier, IssueLinkBuilder, NamedRef};
pub use issue_reference::{IssueReference, IssueReferenceMatcher, MatcherError};
pub use redmine_client::{normalize_issue_id, IssueGateway, RedmineClient, RedmineError};
