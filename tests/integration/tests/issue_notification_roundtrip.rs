use std::{sync::Arc, time::Duration};

use httpmock::prelude::*;
use serde_json::json;
use srb_redmine::{IssueClassifier, IssueLinkBuilder, IssueReferenceMatcher, RedmineClient};
use srb_slack_runtime::{
    BotIdentity, Dispatcher, DispatcherConfig, InboundMessage, IssueEventLoop, ShutdownReason,
    SlackApiClient, SlackNotificationSink, StreamEvent,
};
use tokio::sync::mpsc;

fn issue_body(id: u64, status_id: u64, priority_id: u64) -> serde_json::Value {
    json!({
        "issue": {
            "id": id,
            "subject": format!("Issue {id}"),
            "project": {"id": 1, "name": "Platform"},
            "tracker": {"id": 1, "name": "Bug"},
            "status": {"id": status_id, "name": "Status"},
            "priority": {"id": priority_id, "name": "Urgent"},
            "author": {"id": 10, "name": "Alice"},
        }
    })
}

fn build_event_loop(redmine: &MockServer, slack: &MockServer) -> IssueEventLoop {
    let matcher = IssueReferenceMatcher::new(&redmine.base_url()).expect("matcher");
    let gateway = RedmineClient::new(matcher.base_url(), "redmine-key", 2_000).expect("redmine");
    let slack_client = SlackApiClient::new(
        slack.base_url(),
        "xapp-test".to_string(),
        "xoxb-test".to_string(),
        2_000,
    )
    .expect("slack client");
    let dispatcher = Dispatcher::new(
        Arc::new(gateway),
        Arc::new(SlackNotificationSink::new(
            slack_client,
            BotIdentity::default(),
        )),
        DispatcherConfig {
            classifier: IssueClassifier::new([5], [4]),
            links: IssueLinkBuilder::new(matcher.base_url()),
            fetch_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            max_in_flight: 0,
        },
    );
    IssueEventLoop::new(Arc::new(matcher), Arc::new(dispatcher))
}

#[tokio::test]
async fn integration_channel_message_produces_enriched_threaded_notifications() {
    let redmine = MockServer::start();
    let slack = MockServer::start();
    let closed_issue = redmine.mock(|when, then| {
        when.method(GET)
            .path("/issues/42.json")
            .header("x-redmine-api-key", "redmine-key");
        then.status(200).json_body(issue_body(42, 5, 2));
    });
    let urgent_issue = redmine.mock(|when, then| {
        when.method(GET)
            .path("/issues/43.json")
            .header("x-redmine-api-key", "redmine-key");
        then.status(200).json_body(issue_body(43, 1, 4));
    });
    let missing_issue = redmine.mock(|when, then| {
        when.method(GET).path("/issues/44.json");
        then.status(404).body("not found");
    });
    let resolved_post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"thread_ts\":\"100.1\"")
            .body_includes("\"title\":\"Bug #42: Issue 42\"")
            .body_includes("\"color\":\"good\"");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "101.0"}));
    });
    let alert_post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"thread_ts\":\"100.1\"")
            .body_includes("\"title\":\"Bug #43: Issue 43\"")
            .body_includes("\"color\":\"danger\"")
            .body_includes("\"title\":\"Priority\"");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "101.1"}));
    });

    let event_loop = build_event_loop(&redmine, &slack);
    let (tx, rx) = mpsc::channel(8);
    let text = format!(
        "fixed #42, see {}/issues/43 and #44",
        redmine.base_url()
    );
    tx.send(StreamEvent::Message(
        InboundMessage::new("C1", text).with_thread_ts("100.1"),
    ))
    .await
    .expect("send message");
    tx.send(StreamEvent::Message(
        InboundMessage::new("C1", "#42 edited").with_subtype("message_changed"),
    ))
    .await
    .expect("send edit");
    drop(tx);

    let report = tokio::time::timeout(Duration::from_secs(5), event_loop.run(rx))
        .await
        .expect("loop drains");

    assert_eq!(report.reason, ShutdownReason::StreamClosed);
    assert_eq!(report.messages_seen, 2);
    assert_eq!(report.messages_discarded, 1);
    assert_eq!(report.workers_dispatched, 3);
    closed_issue.assert();
    urgent_issue.assert();
    missing_issue.assert();
    resolved_post.assert();
    alert_post.assert();
}

#[tokio::test]
async fn integration_invalid_auth_drains_before_returning() {
    let redmine = MockServer::start();
    let slack = MockServer::start();
    let slow_issue = redmine.mock(|when, then| {
        when.method(GET).path("/issues/7.json");
        then.status(200)
            .delay(Duration::from_millis(200))
            .json_body(issue_body(7, 1, 2));
    });
    let post = slack.mock(|when, then| {
        when.method(POST)
            .path("/chat.postMessage")
            .body_includes("\"title\":\"Bug #7: Issue 7\"");
        then.status(200)
            .json_body(json!({"ok": true, "channel": "C1", "ts": "1.0"}));
    });

    let event_loop = build_event_loop(&redmine, &slack);
    let (tx, rx) = mpsc::channel(8);
    tx.send(StreamEvent::Message(InboundMessage::new("C1", "#7")))
        .await
        .expect("send message");
    tx.send(StreamEvent::InvalidAuth {
        reason: "invalid_auth".to_string(),
    })
    .await
    .expect("send auth failure");

    let report = tokio::time::timeout(Duration::from_secs(5), event_loop.run(rx))
        .await
        .expect("loop drains");

    assert_eq!(report.reason, ShutdownReason::InvalidAuth);
    slow_issue.assert();
    post.assert();
}
