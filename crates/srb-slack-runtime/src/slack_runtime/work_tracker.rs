//! Outstanding-work counter used as the event loop's drain barrier.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
/// Counts registered dispatch workers and lets the owner wait for zero.
pub struct WorkTracker {
    outstanding: Arc<watch::Sender<usize>>,
}

/// Held by one worker; dropping it marks the work complete, including on panic.
#[derive(Debug)]
pub struct WorkGuard {
    outstanding: Arc<watch::Sender<usize>>,
}

impl WorkTracker {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0);
        Self {
            outstanding: Arc::new(outstanding),
        }
    }

    /// Register one unit of work. Must be called before the work is spawned.
    pub fn register(&self) -> WorkGuard {
        self.outstanding.send_modify(|count| *count = count.saturating_add(1));
        WorkGuard {
            outstanding: Arc::clone(&self.outstanding),
        }
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.borrow()
    }

    /// Wait until every registered guard has been dropped.
    pub async fn wait_idle(&self) {
        let mut receiver = self.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = receiver.wait_for(|count| *count == 0).await;
    }
}

impl Default for WorkTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.outstanding
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}
