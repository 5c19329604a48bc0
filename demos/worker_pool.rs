//! Producers feeding a worker pool, with results collected and a graceful shutdown.
//!
//! Run with `RUST_LOG=debug cargo run --example worker_pool`.

use std::sync::Arc;
use std::time::Duration;

use taskq::{CancelToken, PoolConfig, WorkItem, WorkQueue, WorkerPool};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_thread_ids(true)
        .init();

    let queue = Arc::new(WorkQueue::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let pool = WorkerPool::new(Arc::clone(&queue), PoolConfig::new("demo", 3))
        .with_results(tx)
        .spawn()?;

    let producers: Vec<_> = (0..2u64)
        .map(|producer| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                for n in 0..5u64 {
                    let job = producer * 100 + n;
                    let item = WorkItem::new(move |cancel: CancelToken| async move {
                        tokio::select! {
                            _ = cancel.cancelled() => None,
                            _ = tokio::time::sleep(Duration::from_millis(20 * (n + 1))) => Some(job * job),
                        }
                    })
                    .labeled(format!("square-{job}"));
                    if let Err(e) = queue.enqueue(item) {
                        tracing::warn!(error = %e, "enqueue failed");
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await?;
    }

    for _ in 0..10 {
        match rx.recv().await {
            Some(Some(square)) => tracing::info!(square, "job finished"),
            Some(None) => tracing::info!("job cancelled"),
            None => break,
        }
    }

    // A consumer outside the pool with a bounded wait.
    let timeout = CancelToken::new();
    timeout.cancel_after(Duration::from_millis(50));
    match queue.dequeue(&timeout).await {
        Ok(item) => tracing::info!(label = item.label(), "picked up a stray item"),
        Err(e) => tracing::info!(error = %e, "nothing left to dequeue"),
    }

    pool.shutdown().await?;
    Ok(())
}
