//! Slack bridge runtime for Redmine issue notifications.
//!
//! This crate consumes the Slack Socket Mode event stream, extracts Redmine issue
//! references from channel messages, and posts one enriched notification per
//! reference back into the originating conversation.

mod slack_runtime;

pub use slack_runtime::{
    render_issue_notification, run_slack_bridge, BotIdentity, DispatchJob, DispatchOutcome,
    Dispatcher, DispatcherConfig, Emphasis, InboundMessage, IssueEventLoop, LoopReport,
    NotificationField, NotificationPayload, NotificationSink, NotificationTarget, SendError,
    ShutdownReason, SlackApiClient, SlackApiError, SlackBridgeRuntimeConfig,
    SlackNotificationSink, SlackPostedMessage, StreamEvent, WorkGuard, WorkTracker,
};
