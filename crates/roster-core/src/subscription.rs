//! Cancellable background tasks
//!
//! Timers and listeners are owned by whoever started them and stop when
//! the owner drops the handle. There is no ambient global timer state.

use tokio::task::JoinHandle;

/// A running background task, aborted on drop
#[derive(Debug)]
pub struct Subscription {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Wrap a spawned task
    #[inline]
    #[must_use]
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self { name, handle }
    }

    /// Task label
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the task has stopped
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::trace!(subscription = self.name, "cancelling");
        self.handle.abort();
    }
}

/// A set of subscriptions torn down together
#[derive(Debug, Default)]
pub struct Subscriptions {
    inner: Vec<Subscription>,
}

impl Subscriptions {
    /// Empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription
    #[inline]
    pub fn push(&mut self, subscription: Subscription) {
        self.inner.push(subscription);
    }

    /// Cancel everything
    pub fn cancel_all(&mut self) {
        self.inner.clear();
    }

    /// Number of live subscriptions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// No subscriptions
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
