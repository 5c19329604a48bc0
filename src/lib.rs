//! # taskq
//!
//! An unbounded, cancelable, asynchronous FIFO work queue for Tokio, with a
//! worker pool that drains it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use taskq::{CancelToken, PoolConfig, WorkItem, WorkQueue, WorkerPool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let queue = Arc::new(WorkQueue::new());
//!     let pool = WorkerPool::new(Arc::clone(&queue), PoolConfig::from_env()?).spawn()?;
//!
//!     queue.enqueue(WorkItem::new(|cancel: CancelToken| async move {
//!         if !cancel.is_cancelled() {
//!             println!("Hello from a worker!");
//!         }
//!     }))?;
//!
//!     pool.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod pool;
pub mod queue;
pub mod try_handler;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cancel::CancelToken;
pub use config::{ConfigError, PoolConfig};
pub use pool::{PoolError, PoolHandle, WorkerPool};
pub use queue::{QueueError, WorkItem, WorkQueue};
pub use try_handler::{TryHandler, TryResult};
