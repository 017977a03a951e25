//! Issue event loop: consumes stream events and spawns dispatch workers.

use std::sync::Arc;

use srb_redmine::IssueReferenceMatcher;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::dispatch_worker::{DispatchJob, Dispatcher, NotificationTarget};
use super::work_tracker::WorkTracker;
use super::{InboundMessage, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Draining,
    Terminated,
}

impl LoopState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The stream reported rejected credentials.
    InvalidAuth,
    /// The stream ended without an auth failure (for example on Ctrl-C).
    StreamClosed,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidAuth => "invalid_auth",
            Self::StreamClosed => "stream_closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    pub reason: ShutdownReason,
    pub messages_seen: usize,
    pub messages_discarded: usize,
    pub workers_dispatched: usize,
}

#[derive(Debug, Default)]
struct LoopCounters {
    messages_seen: usize,
    messages_discarded: usize,
    workers_dispatched: usize,
}

/// Single consumer of the stream; never awaits enrichment or sending itself.
pub struct IssueEventLoop {
    matcher: Arc<IssueReferenceMatcher>,
    dispatcher: Arc<Dispatcher>,
    tracker: WorkTracker,
    state: LoopState,
    counters: LoopCounters,
}

impl IssueEventLoop {
    pub fn new(matcher: Arc<IssueReferenceMatcher>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            matcher,
            dispatcher,
            tracker: WorkTracker::new(),
            state: LoopState::Running,
            counters: LoopCounters::default(),
        }
    }

    /// Tracker shared with every spawned worker.
    pub fn tracker(&self) -> &WorkTracker {
        &self.tracker
    }

    /// Consume events until an auth failure or the end of the stream, then drain.
    pub async fn run(mut self, mut events: mpsc::Receiver<StreamEvent>) -> LoopReport {
        let reason = loop {
            let Some(event) = events.recv().await else {
                break ShutdownReason::StreamClosed;
            };
            match event {
                StreamEvent::Message(message) => self.handle_message(message),
                StreamEvent::InvalidAuth { reason } => {
                    error!(reason = %reason, "invalid slack credentials, shutting down");
                    break ShutdownReason::InvalidAuth;
                }
                StreamEvent::Other { kind } => {
                    debug!(kind = %kind, "ignoring slack event");
                }
            }
        };

        self.transition(LoopState::Draining);
        drop(events);
        info!(
            outstanding = self.tracker.outstanding(),
            "waiting for in-flight issue notifications"
        );
        self.tracker.wait_idle().await;
        self.transition(LoopState::Terminated);

        let report = LoopReport {
            reason,
            messages_seen: self.counters.messages_seen,
            messages_discarded: self.counters.messages_discarded,
            workers_dispatched: self.counters.workers_dispatched,
        };
        info!(
            reason = report.reason.as_str(),
            messages_seen = report.messages_seen,
            messages_discarded = report.messages_discarded,
            workers_dispatched = report.workers_dispatched,
            "issue event loop stopped"
        );
        report
    }

    fn handle_message(&mut self, message: InboundMessage) {
        self.counters.messages_seen = self.counters.messages_seen.saturating_add(1);
        if let Some(reason) = message.discard_reason() {
            self.counters.messages_discarded = self.counters.messages_discarded.saturating_add(1);
            debug!(channel = %message.channel_id, reason, "discarding slack message");
            return;
        }

        let references = self.matcher.extract_references(&message.text);
        if references.is_empty() {
            return;
        }
        debug!(
            channel = %message.channel_id,
            references = references.len(),
            "dispatching issue references"
        );

        let InboundMessage {
            channel_id,
            thread_ts,
            ..
        } = message;
        for reference in references {
            let job = DispatchJob {
                reference,
                target: NotificationTarget {
                    channel_id: channel_id.clone(),
                    thread_ts: thread_ts.clone(),
                },
            };
            let guard = self.tracker.register();
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let _guard = guard;
                dispatcher.dispatch(job).await
            });
            self.counters.workers_dispatched = self.counters.workers_dispatched.saturating_add(1);
        }
    }

    fn transition(&mut self, next: LoopState) {
        debug!(
            from = self.state.as_str(),
            to = next.as_str(),
            "issue event loop state change"
        );
        self.state = next;
    }
}
