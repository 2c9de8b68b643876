//! Cancel-and-reschedule timer for coalescing bursts of input events.
//!
//! Each `schedule` call aborts whatever is still pending and starts a fresh
//! timer, so only the last call in a burst runs its work once the input has
//! been quiet for `delay`.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Quiet period before a username availability lookup fires.
pub const USERNAME_CHECK_DELAY: Duration = Duration::from_millis(500);

pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    /// Run `work` after `delay`, replacing any work still waiting.
    pub fn schedule<F>(&mut self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work.await;
        }));
    }

    /// Drop pending work, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// True while scheduled work has not finished (or been cancelled).
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
#[path = "debounce_test.rs"]
mod tests;
