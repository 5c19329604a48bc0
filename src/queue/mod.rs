//! Unbounded, cancelable, asynchronous FIFO work queue.
//!
//! [`WorkQueue`] decouples producers that schedule deferred work from
//! consumers that execute it. Producers call [`WorkQueue::enqueue`], which
//! never suspends. Consumers call [`WorkQueue::dequeue`], which suspends until
//! an item is available or the supplied [`CancelToken`] fires.
//!
//! ## Guarantees
//!
//! - Items are delivered in the order their `enqueue` calls completed.
//! - Every enqueued item is delivered to exactly one `dequeue` caller.
//! - A cancelled `dequeue` removes nothing and reserves nothing; the queue can
//!   be dequeued from again immediately.
//!
//! Pending items are dropped without running when the queue is dropped.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::trace;

use crate::cancel::CancelToken;

/// Errors produced by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The argument was rejected; the queue is unchanged.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A `dequeue` was aborted by its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

impl QueueError {
    /// Returns `true` for [`QueueError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// The boxed future a [`WorkItem`] produces when run.
pub type WorkFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type Task<T> = Box<dyn FnOnce(CancelToken) -> WorkFuture<T> + Send + 'static>;

/// A deferred, cancelable unit of work producing a `T`.
///
/// The work receives a [`CancelToken`] when it is run and is expected to
/// observe it cooperatively. `WorkItem<()>` is the result-less form.
///
/// [`WorkItem::default`] yields an *empty* item carrying no work; the queue
/// rejects empty items.
///
/// # Examples
///
/// ```
/// use taskq::queue::WorkItem;
///
/// let item: WorkItem<u32> = WorkItem::new(|_cancel| async { 42 }).labeled("answer");
/// assert_eq!(item.label(), Some("answer"));
/// assert!(!item.is_empty());
/// ```
pub struct WorkItem<T = ()> {
    label: Option<String>,
    task: Option<Task<T>>,
}

impl<T> WorkItem<T> {
    /// Wraps an async closure as a work item.
    pub fn new<F, Fut>(work: F) -> Self
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        Self {
            label: None,
            task: Some(Box::new(move |cancel| Box::pin(work(cancel)))),
        }
    }

    /// Attaches a label, used only in log records.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The label set with [`labeled`](Self::labeled), if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Returns `true` if this item carries no work.
    pub fn is_empty(&self) -> bool {
        self.task.is_none()
    }

    /// Runs the work, handing it `cancel`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidArgument`] if the item is empty.
    pub async fn run(self, cancel: CancelToken) -> Result<T, QueueError> {
        match self.task {
            Some(task) => Ok(task(cancel).await),
            None => Err(QueueError::InvalidArgument("work item is empty")),
        }
    }
}

impl<T> Default for WorkItem<T> {
    fn default() -> Self {
        Self {
            label: None,
            task: None,
        }
    }
}

impl<T> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("label", &self.label)
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// A multi-producer, multi-consumer FIFO queue of [`WorkItem`]s.
///
/// Share it between tasks with an [`Arc`](std::sync::Arc).
///
/// # Examples
///
/// ```
/// use taskq::{CancelToken, WorkItem, WorkQueue};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), taskq::QueueError> {
/// let queue: WorkQueue<&'static str> = WorkQueue::new();
/// queue.enqueue(WorkItem::new(|_| async { "first" }))?;
/// queue.enqueue(WorkItem::new(|_| async { "second" }))?;
///
/// let cancel = CancelToken::new();
/// let item = queue.dequeue(&cancel).await?;
/// assert_eq!(item.run(cancel.clone()).await?, "first");
/// # Ok(())
/// # }
/// ```
pub struct WorkQueue<T = ()> {
    items: Mutex<VecDeque<WorkItem<T>>>,
    // One permit per item in `items` not yet claimed by a consumer.
    available: Semaphore,
}

impl<T> WorkQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Semaphore::new(0),
        }
    }

    /// Appends `item` to the tail of the queue and wakes at most one waiting consumer.
    ///
    /// Never suspends.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidArgument`] if `item` is empty. The queue is
    /// left unchanged.
    pub fn enqueue(&self, item: WorkItem<T>) -> Result<(), QueueError> {
        if item.is_empty() {
            return Err(QueueError::InvalidArgument("work item is empty"));
        }
        trace!(label = item.label(), "enqueue");
        self.items().push_back(item);
        // Publish the permit only after the item is in place.
        self.available.add_permits(1);
        Ok(())
    }

    /// Removes and returns the oldest pending item, suspending until one is
    /// available.
    ///
    /// Cancel-safe: if `cancel` fires first, or the returned future is dropped,
    /// no item is removed and no availability is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Cancelled`] if `cancel` is or becomes cancelled
    /// before an item is claimed.
    pub async fn dequeue(&self, cancel: &CancelToken) -> Result<WorkItem<T>, QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!("dequeue cancelled");
                return Err(QueueError::Cancelled);
            }
            permit = self.available.acquire() => match permit {
                Ok(permit) => permit,
                // `available` is never closed.
                Err(_) => return Err(QueueError::Cancelled),
            },
        };
        permit.forget();
        Ok(self.take_head())
    }

    /// Removes and returns the oldest pending item without suspending, or
    /// `None` if no item is available right now.
    pub fn try_dequeue(&self) -> Option<WorkItem<T>> {
        let permit = self.available.try_acquire().ok()?;
        permit.forget();
        Some(self.take_head())
    }

    /// Number of items enqueued and not yet claimed.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Returns `true` if no items are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Caller must have consumed one permit.
    fn take_head(&self) -> WorkItem<T> {
        match self.items().pop_front() {
            Some(item) => {
                trace!(label = item.label(), "dequeue");
                item
            }
            None => unreachable!("permit consumed with no pending work item"),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<WorkItem<T>>> {
        // Critical sections are single push/pop calls and cannot tear the deque.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("len", &self.len())
            .finish()
    }
}
