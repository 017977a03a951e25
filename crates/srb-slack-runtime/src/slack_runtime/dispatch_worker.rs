//! Per-reference fetch, render and send unit of work.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use srb_redmine::{
    normalize_issue_id, IssueClassifier, IssueGateway, IssueLinkBuilder, IssueReference,
    RedmineError,
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::slack_api_client::{BotIdentity, SlackApiClient, SlackApiError};
use super::slack_render_helpers::{render_issue_notification, NotificationPayload};

#[derive(Debug, Error)]
/// Enumerates failures reported by a [`NotificationSink`].
pub enum SendError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("issue fetch failed: {0}")]
    Fetch(#[source] RedmineError),
    #[error("issue fetch timed out after {0:?}")]
    FetchTimeout(Duration),
    #[error("notification send failed: {0}")]
    Send(#[source] SendError),
    #[error("notification send timed out after {0:?}")]
    SendTimeout(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Where a notification is delivered: the originating channel and thread.
pub struct NotificationTarget {
    pub channel_id: String,
    /// Present when the originating message was inside a thread.
    pub thread_ts: Option<String>,
}

/// Delivers rendered notifications to the chat platform.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(
        &self,
        target: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> Result<(), SendError>;
}

/// Posts notifications through the Slack Web API.
pub struct SlackNotificationSink {
    client: SlackApiClient,
    identity: BotIdentity,
}

impl SlackNotificationSink {
    pub fn new(client: SlackApiClient, identity: BotIdentity) -> Self {
        Self { client, identity }
    }
}

#[async_trait]
impl NotificationSink for SlackNotificationSink {
    async fn send(
        &self,
        target: &NotificationTarget,
        payload: &NotificationPayload,
    ) -> Result<(), SendError> {
        let posted = self
            .client
            .post_notification(
                &target.channel_id,
                target.thread_ts.as_deref(),
                payload,
                &self.identity,
            )
            .await?;
        debug!(channel = %posted.channel, ts = %posted.ts, "slack notification posted");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub reference: IssueReference,
    pub target: NotificationTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    FetchFailed,
    SendFailed,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub classifier: IssueClassifier,
    pub links: IssueLinkBuilder,
    pub fetch_timeout: Duration,
    pub send_timeout: Duration,
    /// 0 disables the bound.
    pub max_in_flight: usize,
}

/// Runs dispatch jobs against a shared gateway and sink.
///
/// One dispatcher is shared by every worker; it holds no per-job mutable state.
pub struct Dispatcher {
    gateway: Arc<dyn IssueGateway>,
    sink: Arc<dyn NotificationSink>,
    classifier: IssueClassifier,
    links: IssueLinkBuilder,
    fetch_timeout: Duration,
    send_timeout: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl Dispatcher {
    pub fn new(
        gateway: Arc<dyn IssueGateway>,
        sink: Arc<dyn NotificationSink>,
        config: DispatcherConfig,
    ) -> Self {
        let limiter = (config.max_in_flight > 0)
            .then(|| Arc::new(Semaphore::new(config.max_in_flight)));
        Self {
            gateway,
            sink,
            classifier: config.classifier,
            links: config.links,
            fetch_timeout: config.fetch_timeout,
            send_timeout: config.send_timeout,
            limiter,
        }
    }

    /// Fetch, render and send one reference. Failures are logged and never propagate.
    pub async fn dispatch(&self, job: DispatchJob) -> DispatchOutcome {
        // The semaphore is never closed, so acquisition only fails if it was.
        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        match self.run_job(&job).await {
            Ok(()) => DispatchOutcome::Sent,
            Err(error) => {
                warn!(
                    channel = %job.target.channel_id,
                    issue_id = %job.reference.issue_id,
                    reference = %job.reference.raw,
                    error = %error,
                    "issue notification dropped"
                );
                match error {
                    DispatchError::Fetch(_) | DispatchError::FetchTimeout(_) => {
                        DispatchOutcome::FetchFailed
                    }
                    DispatchError::Send(_) | DispatchError::SendTimeout(_) => {
                        DispatchOutcome::SendFailed
                    }
                }
            }
        }
    }

    async fn run_job(&self, job: &DispatchJob) -> Result<(), DispatchError> {
        let issue_id = normalize_issue_id(&job.reference.issue_id);
        let issue = tokio::time::timeout(self.fetch_timeout, self.gateway.fetch(&issue_id))
            .await
            .map_err(|_| DispatchError::FetchTimeout(self.fetch_timeout))?
            .map_err(DispatchError::Fetch)?;

        let payload = render_issue_notification(
            &issue,
            &self.links,
            |issue| self.classifier.is_closed(issue),
            |issue| self.classifier.is_high_priority(issue),
        );
        debug!(
            issue_id = issue.id,
            emphasis = payload.emphasis.as_str(),
            fields = payload.fields.len(),
            "rendered issue notification"
        );

        tokio::time::timeout(self.send_timeout, self.sink.send(&job.target, &payload))
            .await
            .map_err(|_| DispatchError::SendTimeout(self.send_timeout))?
            .map_err(DispatchError::Send)
    }
}
