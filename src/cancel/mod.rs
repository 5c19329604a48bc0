//! Cooperative cancellation — the signal passed into [`WorkQueue::dequeue`] and
//! handed to every work item when it runs.
//!
//! A [`CancelToken`] is a cheaply-cloneable handle; all clones share one
//! cancellation flag. Tokens can be arranged in a tree with [`CancelToken::child`]:
//! cancelling a parent cancels every descendant, but not the other way round.
//!
//! Timeouts are composed by cancelling a token on a timer, see
//! [`CancelToken::cancel_after`].
//!
//! [`WorkQueue::dequeue`]: crate::queue::WorkQueue::dequeue

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Inner {
    // `true` once cancelled; never flips back.
    state: watch::Sender<bool>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self.state.send_replace(true) {
            return;
        }
        let children = std::mem::take(
            &mut *self.children.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }
}

/// A shared, cloneable cancellation signal.
///
/// # Examples
///
/// ```
/// use taskq::cancel::CancelToken;
///
/// let token = CancelToken::new();
/// let clone = token.clone();
/// assert!(!clone.is_cancelled());
///
/// token.cancel();
/// assert!(clone.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Creates a new, un-cancelled token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Cancels this token, its clones, and all of its children.
    ///
    /// Calling `cancel` more than once has no further effect.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns `true` once the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolves once the token is cancelled. Resolves immediately if it already is.
    ///
    /// The returned future is cancel-safe: dropping it has no effect on the token.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.state.subscribe();
        // The sender lives in `self.inner`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Returns a new token that is cancelled whenever `self` is.
    ///
    /// Cancelling the child does not affect the parent.
    ///
    /// # Examples
    ///
    /// ```
    /// use taskq::cancel::CancelToken;
    ///
    /// let parent = CancelToken::new();
    /// let child = parent.child();
    ///
    /// child.cancel();
    /// assert!(!parent.is_cancelled());
    ///
    /// let other = parent.child();
    /// parent.cancel();
    /// assert!(other.is_cancelled());
    /// ```
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // The parent may have been cancelled before the registration above was visible.
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Cancels the token after `duration` elapses.
    ///
    /// This is how a time-bounded wait is built on top of
    /// [`WorkQueue::dequeue`](crate::queue::WorkQueue::dequeue). Aborting the
    /// returned handle disarms the timer.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn cancel_after(&self, duration: Duration) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            token.cancel();
        })
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
