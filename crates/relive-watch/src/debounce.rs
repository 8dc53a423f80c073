//! Trailing-edge debouncing for rebuild actions.
//!
//! A burst of events schedules exactly one run of the action, `delay` after
//! the first event of the burst. Events arriving while a run is pending are
//! absorbed into it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::orchestrator::Action;

pub(crate) struct Debouncer {
    pending: AtomicBool,
    delay: Duration,
    action: Action,
    stopped: Arc<AtomicBool>,
}

impl Debouncer {
    /// Create a debouncer that stops firing once `stopped` is set.
    pub(crate) fn new(action: Action, delay: Duration, stopped: Arc<AtomicBool>) -> Self {
        Self {
            pending: AtomicBool::new(false),
            delay,
            action,
            stopped,
        }
    }

    /// Schedule a run unless one is already pending.
    pub(crate) fn trigger(self: &Arc<Self>) {
        if self.pending.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            this.pending.store(false, Ordering::SeqCst);
            if this.stopped.load(Ordering::SeqCst) {
                return;
            }
            if let Err(err) = this.action.run().await {
                tracing::error!(error = %err, "Rebuild failed");
            }
        });
    }
}
