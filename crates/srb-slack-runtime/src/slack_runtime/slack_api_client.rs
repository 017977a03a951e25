//! Slack Web API client helpers used by socket and notification flows.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::slack_render_helpers::{Emphasis, NotificationPayload};

const SLACK_AUTH_ERROR_CODES: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
];
const DEFAULT_BOT_NAME: &str = "Redmine Bot";
const DEFAULT_BOT_ICON_URL: &str =
    "http://www.redmine.org/attachments/3462/redmine_fluid_icon.png";

#[derive(Debug, Error)]
/// Enumerates supported `SlackApiError` values.
pub enum SlackApiError {
    #[error("failed to create slack api client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("slack api {method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("slack api {method} failed with status {status}: {body}")]
    Status {
        method: &'static str,
        status: u16,
        body: String,
    },
    #[error("failed to decode slack {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("slack {method} failed: {error}")]
    Api { method: &'static str, error: String },
    #[error("slack {method} response missing {field}")]
    MissingField {
        method: &'static str,
        field: &'static str,
    },
}

impl SlackApiError {
    /// Return true when Slack rejected the configured credentials.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Api { error, .. } => SLACK_AUTH_ERROR_CODES.contains(&error.as_str()),
            Self::Status { status, .. } => *status == 401,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Display name and avatar used for outbound notifications.
pub struct BotIdentity {
    pub username: String,
    pub icon_url: Option<String>,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            username: DEFAULT_BOT_NAME.to_string(),
            icon_url: Some(DEFAULT_BOT_ICON_URL.to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    user_id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackOpenSocketResponse {
    ok: bool,
    url: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackChatMessageResponse {
    ok: bool,
    ts: Option<String>,
    channel: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackPostedMessage {
    pub channel: String,
    pub ts: String,
}

#[derive(Debug, Serialize)]
struct SlackPostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    title: String,
    title_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SlackField>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

/// Slack attachment colour for a notification emphasis.
pub(super) fn attachment_color(emphasis: Emphasis) -> Option<&'static str> {
    match emphasis {
        Emphasis::Resolved => Some("good"),
        Emphasis::Alert => Some("danger"),
        Emphasis::Neutral => None,
    }
}

fn notification_attachment(payload: &NotificationPayload) -> SlackAttachment {
    SlackAttachment {
        fallback: payload.title.clone(),
        title: payload.title.clone(),
        title_link: payload.title_link.clone(),
        color: attachment_color(payload.emphasis),
        fields: payload
            .fields
            .iter()
            .map(|field| SlackField {
                title: field.title.clone(),
                value: field.value.clone(),
                short: true,
            })
            .collect(),
    }
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
}

impl SlackApiClient {
    pub fn new(
        api_base: String,
        app_token: String,
        bot_token: String,
        request_timeout_ms: u64,
    ) -> Result<Self, SlackApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("slack-redmine-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(SlackApiError::Client)?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: app_token.trim().to_string(),
            bot_token: bot_token.trim().to_string(),
        })
    }

    pub async fn resolve_bot_user_id(&self) -> Result<String, SlackApiError> {
        const METHOD: &str = "auth.test";
        let response: SlackAuthTestResponse = self
            .request_json(
                METHOD,
                self.http
                    .post(format!("{}/{METHOD}", self.api_base))
                    .bearer_auth(&self.bot_token),
            )
            .await?;
        if !response.ok {
            return Err(api_error(METHOD, response.error));
        }
        response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or(SlackApiError::MissingField {
                method: METHOD,
                field: "user_id",
            })
    }

    pub async fn open_socket_connection(&self) -> Result<String, SlackApiError> {
        const METHOD: &str = "apps.connections.open";
        let response: SlackOpenSocketResponse = self
            .request_json(
                METHOD,
                self.http
                    .post(format!("{}/{METHOD}", self.api_base))
                    .bearer_auth(&self.app_token),
            )
            .await?;
        if !response.ok {
            return Err(api_error(METHOD, response.error));
        }
        response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or(SlackApiError::MissingField {
                method: METHOD,
                field: "url",
            })
    }

    /// Post a notification as a single attachment, threaded when `thread_ts` is set.
    pub async fn post_notification(
        &self,
        channel: &str,
        thread_ts: Option<&str>,
        payload: &NotificationPayload,
        identity: &BotIdentity,
    ) -> Result<SlackPostedMessage, SlackApiError> {
        const METHOD: &str = "chat.postMessage";
        let request = SlackPostMessageRequest {
            channel,
            text: "",
            username: &identity.username,
            icon_url: identity.icon_url.as_deref(),
            thread_ts: thread_ts.map(str::trim).filter(|value| !value.is_empty()),
            attachments: vec![notification_attachment(payload)],
        };
        let response: SlackChatMessageResponse = self
            .request_json(
                METHOD,
                self.http
                    .post(format!("{}/{METHOD}", self.api_base))
                    .bearer_auth(&self.bot_token)
                    .json(&request),
            )
            .await?;
        if !response.ok {
            return Err(api_error(METHOD, response.error));
        }

        Ok(SlackPostedMessage {
            channel: response.channel.unwrap_or_else(|| channel.to_string()),
            ts: response.ts.ok_or(SlackApiError::MissingField {
                method: METHOD,
                field: "ts",
            })?,
        })
    }

    async fn request_json<T>(
        &self,
        method: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|source| SlackApiError::Transport { method, source })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackApiError::Status {
                method,
                status: status.as_u16(),
                body: truncate_for_error(&body, 800),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| SlackApiError::Decode { method, source })
    }
}

fn api_error(method: &'static str, error: Option<String>) -> SlackApiError {
    SlackApiError::Api {
        method,
        error: error.unwrap_or_else(|| "unknown error".to_string()),
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
