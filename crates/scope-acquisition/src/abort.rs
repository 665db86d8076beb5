//! Cooperative cancellation token.
//!
//! The worker polls [`AbortToken::is_requested`] at its cancellation points
//! (FOV start, between z-levels) and waits on it during the inter-timepoint
//! sleep. Nothing is ever forcibly killed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    notify: Notify,
}

/// Shared abort flag with wakeup. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct AbortToken {
    inner: Arc<Inner>,
}

impl AbortToken {
    /// New, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and wake sleepers.
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// True once requested, until [`reset`](Self::reset).
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Clear the flag for the next run.
    pub fn reset(&self) {
        self.inner.requested.store(false, Ordering::SeqCst);
    }

    /// Sleep until `deadline` or an abort. Returns true if aborted.
    pub async fn sleep_until(&self, deadline: Instant) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before re-checking the flag so a request in between is not lost.
        notified.as_mut().enable();
        if self.is_requested() {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => self.is_requested(),
            _ = notified => true,
        }
    }
}
