//! Worker pool — a fixed set of Tokio tasks draining a [`WorkQueue`].
//!
//! Each worker loops: dequeue the next item, run it with a token derived from
//! the pool's shutdown token, forward its output to the optional result
//! channel. Workers stop when the pool is shut down; items still queued at
//! that point stay in the queue.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::config::{ConfigError, PoolConfig};
use crate::queue::{QueueError, WorkItem, WorkQueue};

/// Errors produced by the pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("worker task failed: {0}")]
    Join(#[from] JoinError),
}

/// Builder for a pool of workers over a shared queue.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use taskq::{PoolConfig, WorkItem, WorkQueue, WorkerPool};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let queue = Arc::new(WorkQueue::new());
///     let pool = WorkerPool::new(queue, PoolConfig::new("jobs", 4)).spawn()?;
///
///     pool.enqueue(WorkItem::new(|_cancel| async { println!("working") }))?;
///
///     pool.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct WorkerPool<T = ()> {
    queue: Arc<WorkQueue<T>>,
    config: PoolConfig,
    results: Option<UnboundedSender<T>>,
}

impl<T> WorkerPool<T>
where
    T: Send + 'static,
{
    /// Creates a pool over `queue`; nothing runs until [`spawn`](Self::spawn).
    pub fn new(queue: Arc<WorkQueue<T>>, config: PoolConfig) -> Self {
        Self {
            queue,
            config,
            results: None,
        }
    }

    /// Forwards every work item's output to `results`.
    ///
    /// Outputs are discarded once the receiving side is dropped.
    pub fn with_results(mut self, results: UnboundedSender<T>) -> Self {
        self.results = Some(results);
        self
    }

    /// Spawns the workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn(self) -> Result<PoolHandle<T>, PoolError> {
        self.config.validate()?;

        let shutdown = CancelToken::new();
        let workers = (0..self.config.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: Arc::clone(&self.queue),
                    shutdown: shutdown.clone(),
                    results: self.results.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(pool = %self.config.name, workers = self.config.workers, "worker pool started");

        Ok(PoolHandle {
            name: self.config.name,
            queue: self.queue,
            shutdown,
            workers,
        })
    }
}

/// Handle to a running pool.
///
/// Dropping the handle signals the workers to stop without waiting for them;
/// call [`shutdown`](Self::shutdown) to wait.
pub struct PoolHandle<T = ()> {
    name: String,
    queue: Arc<WorkQueue<T>>,
    shutdown: CancelToken,
    workers: Vec<JoinHandle<()>>,
}

impl<T> PoolHandle<T> {
    /// The queue the workers drain.
    pub fn queue(&self) -> &Arc<WorkQueue<T>> {
        &self.queue
    }

    /// Enqueues `item` on the pool's queue.
    pub fn enqueue(&self, item: WorkItem<T>) -> Result<(), QueueError> {
        self.queue.enqueue(item)
    }

    /// Number of workers spawned.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signals the workers to stop and waits for each to finish the item it is
    /// running.
    ///
    /// Running items observe the cancellation through their token. Items still
    /// queued are left in the queue, which keeps accepting enqueues.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Join`] with the first failure if a worker task
    /// itself failed. Every worker is joined either way.
    pub async fn shutdown(mut self) -> Result<(), PoolError> {
        self.shutdown.cancel();
        let mut first_error = None;
        for worker in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.await {
                error!(pool = %self.name, error = %e, "worker task failed");
                first_error.get_or_insert(e);
            }
        }
        info!(pool = %self.name, pending = self.queue.len(), "worker pool stopped");
        match first_error {
            Some(e) => Err(PoolError::Join(e)),
            None => Ok(()),
        }
    }
}

impl<T> Drop for PoolHandle<T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Worker<T> {
    id: usize,
    queue: Arc<WorkQueue<T>>,
    shutdown: CancelToken,
    results: Option<UnboundedSender<T>>,
}

impl<T> Worker<T>
where
    T: Send + 'static,
{
    async fn run(self) {
        debug!(worker = self.id, "worker started");

        loop {
            let item = match self.queue.dequeue(&self.shutdown).await {
                Ok(item) => item,
                Err(_) => break,
            };
            let label = item.label().unwrap_or("unlabeled").to_owned();
            debug!(worker = self.id, label = %label, "running work item");

            // Run on its own task so a panic is contained to that item.
            match tokio::spawn(item.run(self.shutdown.child())).await {
                Ok(Ok(output)) => {
                    if let Some(results) = &self.results {
                        if results.send(output).is_err() {
                            debug!(worker = self.id, "result receiver dropped");
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(worker = self.id, label = %label, error = %e, "work item rejected");
                }
                Err(e) => {
                    error!(worker = self.id, label = %label, error = %e, "work item panicked");
                }
            }
        }

        debug!(worker = self.id, "worker stopped");
    }
}
