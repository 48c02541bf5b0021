use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tokio::sync::Notify;

/// Counts the tasks of the pipeline that have not finished yet.
///
/// Every [`CompletionToken`] obtained with [`track`](Self::track) increments the counter,
/// and dropping the token decrements it. Since a token cannot be cloned, each registration
/// is released exactly once, even when the task that holds it fails or is never spawned.
#[derive(Clone, Default)]
pub struct CompletionTracker {
    shared: Arc<Shared>,
}

/// Registration of one task in a [`CompletionTracker`].
///
/// Dropping the token marks the task as complete.
#[must_use = "dropping a CompletionToken immediately marks the task as complete"]
pub struct CompletionToken {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    pending: AtomicUsize,
    zero: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new task.
    pub fn track(&self) -> CompletionToken {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        CompletionToken {
            shared: self.shared.clone(),
        }
    }

    /// Number of tasks that are still running.
    pub fn count(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Waits until every registered task has completed.
    ///
    /// Returns immediately if nothing is registered.
    pub async fn wait(&self) {
        loop {
            // Register interest before checking the counter, otherwise the
            // notification sent by the last token could be missed.
            let notified = self.shared.zero.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl CompletionToken {
    /// Returns a new token registered in the same tracker.
    pub fn sibling(&self) -> CompletionToken {
        CompletionTracker {
            shared: self.shared.clone(),
        }
        .track()
    }
}

impl Drop for CompletionToken {
    fn drop(&mut self) {
        let previous = self.shared.pending.fetch_sub(1, Ordering::AcqRel);
        if previous == 1 {
            self.shared.zero.notify_waiters();
        }
    }
}
