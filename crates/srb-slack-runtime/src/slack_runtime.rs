//! Slack bridge runtime that consumes socket events and dispatches issue notifications.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use srb_redmine::{IssueClassifier, IssueLinkBuilder, IssueReferenceMatcher, RedmineClient};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod dispatch_worker;
mod event_loop;
mod slack_api_client;
mod slack_render_helpers;
mod slack_socket_stream;
mod work_tracker;

pub use dispatch_worker::{
    DispatchJob, DispatchOutcome, Dispatcher, DispatcherConfig, NotificationSink,
    NotificationTarget, SendError, SlackNotificationSink,
};
pub use event_loop::{IssueEventLoop, LoopReport, ShutdownReason};
pub use slack_api_client::{BotIdentity, SlackApiClient, SlackApiError, SlackPostedMessage};
pub use slack_render_helpers::{
    render_issue_notification, Emphasis, NotificationField, NotificationPayload,
};
pub use work_tracker::{WorkGuard, WorkTracker};

use slack_socket_stream::SlackSocketStream;

const STREAM_EVENT_BUFFER: usize = 256;
const SUBTYPE_BOT_MESSAGE: &str = "bot_message";
const SUBTYPE_MESSAGE_CHANGED: &str = "message_changed";
const SUBTYPE_MESSAGE_DELETED: &str = "message_deleted";

#[derive(Debug, Clone)]
/// Runtime configuration for the Slack/Redmine bridge.
pub struct SlackBridgeRuntimeConfig {
    pub redmine_url: String,
    pub redmine_api_key: String,
    pub closed_status_ids: Vec<u64>,
    pub high_priority_ids: Vec<u64>,
    pub api_base: String,
    pub app_token: String,
    pub bot_token: String,
    pub bot_user_id: Option<String>,
    pub bot_identity: BotIdentity,
    pub request_timeout_ms: u64,
    pub reconnect_delay: Duration,
    /// Upper bound on concurrently running dispatch workers; 0 leaves it unbounded.
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A channel message delivered by the Slack event stream.
pub struct InboundMessage {
    pub channel_id: String,
    pub user_id: Option<String>,
    pub bot_id: Option<String>,
    pub text: String,
    pub subtype: Option<String>,
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl InboundMessage {
    pub fn new(channel_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            user_id: None,
            bot_id: None,
            text: text.into(),
            subtype: None,
            ts: String::new(),
            thread_ts: None,
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_thread_ts(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Reason this message must not trigger notifications, if any.
    pub(crate) fn discard_reason(&self) -> Option<&'static str> {
        match self.subtype.as_deref() {
            Some(SUBTYPE_BOT_MESSAGE) => Some("bot_message"),
            Some(SUBTYPE_MESSAGE_CHANGED) => Some("edited"),
            Some(SUBTYPE_MESSAGE_DELETED) => Some("deleted"),
            _ if self.bot_id.is_some() => Some("bot_message"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Events handed from the socket stream to the issue event loop.
pub enum StreamEvent {
    Message(InboundMessage),
    /// Slack rejected the credentials; the stream will not reconnect.
    InvalidAuth { reason: String },
    /// Any other event category; never changes loop state.
    Other { kind: String },
}

/// Runs the Slack bridge until the credentials are rejected or the stream closes.
pub async fn run_slack_bridge(config: SlackBridgeRuntimeConfig) -> Result<LoopReport> {
    let runtime = SlackBridgeRuntime::new(config).await?;
    runtime.run().await
}

struct SlackBridgeRuntime {
    config: SlackBridgeRuntimeConfig,
    slack_client: SlackApiClient,
    matcher: Arc<IssueReferenceMatcher>,
    dispatcher: Arc<Dispatcher>,
    bot_user_id: String,
}

impl SlackBridgeRuntime {
    async fn new(config: SlackBridgeRuntimeConfig) -> Result<Self> {
        let matcher = IssueReferenceMatcher::new(&config.redmine_url)
            .context("failed to build issue reference matcher")?;
        let redmine = RedmineClient::new(
            matcher.base_url(),
            &config.redmine_api_key,
            config.request_timeout_ms,
        )
        .context("failed to create redmine client")?;
        let slack_client = SlackApiClient::new(
            config.api_base.clone(),
            config.app_token.clone(),
            config.bot_token.clone(),
            config.request_timeout_ms,
        )
        .context("failed to create slack api client")?;

        let bot_user_id = match config.bot_user_id.as_deref().map(str::trim) {
            Some(user_id) if !user_id.is_empty() => user_id.to_string(),
            _ => slack_client
                .resolve_bot_user_id()
                .await
                .context("failed to resolve slack bot user id")?,
        };

        let network_timeout = Duration::from_millis(config.request_timeout_ms.max(1));
        let dispatcher = Dispatcher::new(
            Arc::new(redmine),
            Arc::new(SlackNotificationSink::new(
                slack_client.clone(),
                config.bot_identity.clone(),
            )),
            DispatcherConfig {
                classifier: IssueClassifier::new(
                    config.closed_status_ids.iter().copied(),
                    config.high_priority_ids.iter().copied(),
                ),
                links: IssueLinkBuilder::new(matcher.base_url()),
                fetch_timeout: network_timeout,
                send_timeout: network_timeout,
                max_in_flight: config.max_in_flight,
            },
        );

        Ok(Self {
            config,
            slack_client,
            matcher: Arc::new(matcher),
            dispatcher: Arc::new(dispatcher),
            bot_user_id,
        })
    }

    async fn run(self) -> Result<LoopReport> {
        let (event_tx, event_rx) = mpsc::channel(STREAM_EVENT_BUFFER);
        let stream = SlackSocketStream::new(
            self.slack_client,
            self.bot_user_id,
            self.config.reconnect_delay,
        );
        let stream_task = tokio::spawn(stream.run(event_tx));

        info!(
            redmine_url = %self.matcher.base_url(),
            max_in_flight = self.config.max_in_flight,
            "slack redmine bridge started"
        );
        let report = IssueEventLoop::new(self.matcher, self.dispatcher)
            .run(event_rx)
            .await;

        if let Err(error) = stream_task.await {
            warn!(error = %error, "slack socket stream task ended abnormally");
        }
        Ok(report)
    }
}
