//! Slack Socket Mode client that feeds [`StreamEvent`]s to the issue event loop.

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

use super::slack_api_client::SlackApiClient;
use super::{InboundMessage, StreamEvent};

#[derive(Debug, Clone, Deserialize)]
struct SlackSocketEnvelope {
    // `hello` and `disconnect` envelopes carry no id and need no ack.
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct SlackEventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    event: SlackEventPayload,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Reconnect,
    Shutdown,
}

/// Owns the event sender; the event loop sees the stream as closed once `run` returns.
pub(super) struct SlackSocketStream {
    client: SlackApiClient,
    bot_user_id: String,
    reconnect_delay: Duration,
}

impl SlackSocketStream {
    pub(super) fn new(client: SlackApiClient, bot_user_id: String, reconnect_delay: Duration) -> Self {
        Self {
            client,
            bot_user_id,
            reconnect_delay,
        }
    }

    pub(super) async fn run(self, events: mpsc::Sender<StreamEvent>) {
        loop {
            let socket_url = match self.client.open_socket_connection().await {
                Ok(url) => url,
                Err(error) if error.is_auth_failure() => {
                    error!(error = %error, "slack rejected the app token");
                    let _ = events
                        .send(StreamEvent::InvalidAuth {
                            reason: error.to_string(),
                        })
                        .await;
                    return;
                }
                Err(error) => {
                    warn!(error = %error, "failed to open slack socket connection");
                    if !self.pause_before_reconnect(&events).await {
                        return;
                    }
                    continue;
                }
            };

            info!("slack socket connected");
            match self.run_socket_session(&socket_url, &events).await {
                Ok(SessionEnd::Shutdown) => return,
                Ok(SessionEnd::Reconnect) => debug!("slack socket session ended, reconnecting"),
                Err(error) => warn!(error = %error, "slack socket session error"),
            }
            if !self.pause_before_reconnect(&events).await {
                return;
            }
        }
    }

    /// Returns false when shutdown was requested during the pause.
    async fn pause_before_reconnect(&self, events: &mpsc::Sender<StreamEvent>) -> bool {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("slack bridge shutdown requested");
                false
            }
            _ = events.closed() => false,
            _ = tokio::time::sleep(self.reconnect_delay) => true,
        }
    }

    async fn run_socket_session(
        &self,
        socket_url: &str,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<SessionEnd> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("slack bridge shutdown requested");
                    return Ok(SessionEnd::Shutdown);
                }
                _ = events.closed() => {
                    return Ok(SessionEnd::Shutdown);
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(SessionEnd::Reconnect);
                    };
                    let message = message_result.context("failed reading slack websocket message")?;
                    let Some(envelope) = parse_socket_envelope(message)? else {
                        continue;
                    };
                    if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                        let ack = json!({ "envelope_id": envelope_id }).to_string();
                        sink.send(WsMessage::Text(ack.into()))
                            .await
                            .context("failed to send slack socket ack")?;
                    }
                    if envelope.envelope_type == "disconnect" {
                        return Ok(SessionEnd::Reconnect);
                    }
                    let Some(event) = normalize_socket_envelope(&envelope, &self.bot_user_id)? else {
                        continue;
                    };
                    if events.send(event).await.is_err() {
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SlackSocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?;
            let envelope = serde_json::from_str::<SlackSocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(None)
        }
    }
}

fn normalize_socket_envelope(
    envelope: &SlackSocketEnvelope,
    bot_user_id: &str,
) -> Result<Option<StreamEvent>> {
    if envelope.envelope_type != "events_api" {
        return Ok(Some(StreamEvent::Other {
            kind: envelope.envelope_type.clone(),
        }));
    }

    let callback = serde_json::from_value::<SlackEventCallbackEnvelope>(envelope.payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(Some(StreamEvent::Other {
            kind: callback.callback_type,
        }));
    }

    let event = callback.event;
    if event.event_type != "message" {
        return Ok(Some(StreamEvent::Other {
            kind: event.event_type,
        }));
    }
    if event.user.as_deref() == Some(bot_user_id) {
        return Ok(None);
    }
    let channel_id = match event.channel {
        Some(channel) if !channel.trim().is_empty() => channel,
        _ => return Ok(None),
    };

    Ok(Some(StreamEvent::Message(InboundMessage {
        channel_id,
        user_id: event.user,
        bot_id: event.bot_id,
        text: event.text.unwrap_or_default(),
        subtype: event.subtype,
        ts: event.ts.unwrap_or_default(),
        thread_ts: event.thread_ts,
    })))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    use super::{normalize_socket_envelope, parse_socket_envelope, SlackSocketEnvelope};
    use crate::slack_runtime::StreamEvent;

    fn events_api_envelope(event: serde_json::Value) -> SlackSocketEnvelope {
        SlackSocketEnvelope {
            envelope_id: Some("env-1".to_string()),
            envelope_type: "events_api".to_string(),
            payload: json!({
                "type": "event_callback",
                "event_id": "Ev1",
                "event_time": 1,
                "event": event,
            }),
        }
    }

    #[test]
    fn unit_parse_socket_envelope_accepts_hello_without_envelope_id() {
        let envelope = parse_socket_envelope(WsMessage::Text(
            r#"{"type":"hello","num_connections":1}"#.into(),
        ))
        .expect("parse")
        .expect("envelope");
        assert_eq!(envelope.envelope_type, "hello");
        assert!(envelope.envelope_id.is_none());
    }

    #[test]
    fn unit_parse_socket_envelope_ignores_control_frames() {
        assert!(parse_socket_envelope(WsMessage::Ping(Vec::new().into()))
            .expect("parse")
            .is_none());
    }

    #[test]
    fn regression_parse_socket_envelope_rejects_malformed_text() {
        assert!(parse_socket_envelope(WsMessage::Text("not json".into())).is_err());
    }

    #[test]
    fn functional_normalize_socket_envelope_builds_threaded_message() {
        let envelope = events_api_envelope(json!({
            "type": "message",
            "user": "U1",
            "text": "see #42",
            "channel": "C1",
            "ts": "10.1",
            "thread_ts": "9.0",
        }));
        let event = normalize_socket_envelope(&envelope, "UBOT")
            .expect("normalize")
            .expect("event");
        let StreamEvent::Message(message) = event else {
            panic!("expected message event");
        };
        assert_eq!(message.channel_id, "C1");
        assert_eq!(message.user_id.as_deref(), Some("U1"));
        assert_eq!(message.text, "see #42");
        assert_eq!(message.ts, "10.1");
        assert_eq!(message.thread_ts.as_deref(), Some("9.0"));
        assert!(message.subtype.is_none());
    }

    #[test]
    fn functional_normalize_socket_envelope_keeps_subtype_for_loop_filtering() {
        let envelope = events_api_envelope(json!({
            "type": "message",
            "subtype": "message_changed",
            "channel": "C1",
            "ts": "10.2",
        }));
        let event = normalize_socket_envelope(&envelope, "UBOT")
            .expect("normalize")
            .expect("event");
        let StreamEvent::Message(message) = event else {
            panic!("expected message event");
        };
        assert_eq!(message.subtype.as_deref(), Some("message_changed"));
    }

    #[test]
    fn functional_normalize_socket_envelope_drops_own_messages() {
        let envelope = events_api_envelope(json!({
            "type": "message",
            "user": "UBOT",
            "text": "#42",
            "channel": "C1",
            "ts": "10.3",
        }));
        assert!(normalize_socket_envelope(&envelope, "UBOT")
            .expect("normalize")
            .is_none());
    }

    #[test]
    fn unit_normalize_socket_envelope_maps_other_categories() {
        let reaction = events_api_envelope(json!({
            "type": "reaction_added",
            "user": "U1",
        }));
        assert_eq!(
            normalize_socket_envelope(&reaction, "UBOT").expect("normalize"),
            Some(StreamEvent::Other {
                kind: "reaction_added".to_string()
            })
        );

        let hello = SlackSocketEnvelope {
            envelope_id: None,
            envelope_type: "hello".to_string(),
            payload: json!({}),
        };
        assert_eq!(
            normalize_socket_envelope(&hello, "UBOT").expect("normalize"),
            Some(StreamEvent::Other {
                kind: "hello".to_string()
            })
        );
    }
}
