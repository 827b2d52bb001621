//! Controller run loop: worker pool draining the work queue.
//!
//! Each worker repeatedly pulls one item, resolves the object's current
//! state from the cache, and dispatches to the handler. Reconciliation
//! is level-triggered: handlers act on the state current at dequeue
//! time, never on the state that produced the notification.
//!
//! Per-item failure policy:
//!
//! - malformed key: logged and dropped, never retried
//! - object gone on a non-delete event: expected race, treated as success
//! - any store or handler error: re-added with growing backoff
//!
//! Only a failed initial cache sync escapes [`Controller::run`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tagsync_workqueue::WorkQueue;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::handler::Handler;
use crate::item::{EventType, WorkItem};
use crate::store::ObjectStore;

/// How often the startup barrier re-checks the sync flag.
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The reconciliation controller.
pub struct Controller {
    queue: Arc<WorkQueue<WorkItem>>,
    store: Arc<dyn ObjectStore>,
    handler: Arc<dyn Handler>,
}

impl Controller {
    /// Create a controller draining `queue` against `store` and `handler`.
    pub fn new(
        queue: Arc<WorkQueue<WorkItem>>,
        store: Arc<dyn ObjectStore>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            queue,
            store,
            handler,
        }
    }

    /// Run the controller until the shutdown signal fires.
    ///
    /// Waits for the initial cache sync (failing the whole run if it
    /// does not complete within `sync_timeout`), starts `worker_count`
    /// workers, then blocks on `shutdown`. On shutdown the queue is
    /// stopped and every worker is joined after finishing its in-flight
    /// item.
    pub async fn run(
        self,
        worker_count: usize,
        sync_timeout: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("Starting controller");

        info!("Waiting for initial cache sync");
        self.wait_for_sync(sync_timeout, &mut shutdown).await?;

        info!(worker_count, "Starting workers");
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&self.queue);
            let store = Arc::clone(&self.store);
            let handler = Arc::clone(&self.handler);
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, store, handler).await;
            }));
        }

        // Block until shutdown is signaled (or the sender is dropped).
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Shutting down workers");
        self.queue.shut_down();
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task panicked");
            }
        }
        info!("Controller stopped");

        Ok(())
    }

    /// Startup barrier: wait until the store reports its initial
    /// listing complete.
    async fn wait_for_sync(
        &self,
        timeout: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut poll = tokio::time::interval(SYNC_POLL_INTERVAL);

        while !self.store.has_synced() {
            if *shutdown.borrow() {
                anyhow::bail!("shutdown before initial cache sync completed");
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("timed out waiting for initial cache sync");
            }
            poll.tick().await;
        }

        Ok(())
    }
}

/// Releases the in-flight marker on every exit path, including panics
/// in the handler.
struct DoneGuard {
    queue: Arc<WorkQueue<WorkItem>>,
    item: WorkItem,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.queue.done(&self.item);
    }
}

/// Pull loop run by each worker until the queue shuts down.
async fn worker_loop(
    worker_id: usize,
    queue: Arc<WorkQueue<WorkItem>>,
    store: Arc<dyn ObjectStore>,
    handler: Arc<dyn Handler>,
) {
    debug!(worker_id, "Worker started");

    while let Some(item) = queue.get().await {
        let _done = DoneGuard {
            queue: Arc::clone(&queue),
            item: item.clone(),
        };

        match process(store.as_ref(), handler.as_ref(), &item).await {
            Ok(()) => {
                queue.forget(&item);
                info!(key = %item.key, event_type = %item.event_type, "Successfully synced");
            }
            Err(e) => {
                warn!(
                    key = %item.key,
                    event_type = %item.event_type,
                    error = %e,
                    "Sync failed, requeuing with backoff"
                );
                queue.add_rate_limited(item.clone());
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Reconcile a single work item against current state.
///
/// Terminal conditions (malformed key, object gone on a non-delete
/// event) return `Ok` so the item is forgotten; every `Err` is retried.
async fn process(store: &dyn ObjectStore, handler: &dyn Handler, item: &WorkItem) -> Result<()> {
    let (namespace, name) = match item.key.split() {
        Ok(parts) => parts,
        Err(e) => {
            // A key that cannot be decomposed can never be reconciled.
            error!(key = %item.key, error = %e, "Invalid resource key, dropping item");
            return Ok(());
        }
    };

    if item.event_type == EventType::Deleted {
        // The object is typically absent from the cache by now; only
        // its identity is passed on.
        return handler.object_deleted(&item.key).await;
    }

    let object = match store.get(&item.key).await {
        Ok(object) => object,
        Err(e) if e.is_not_found() => {
            // Removed between enqueue and dequeue; nothing left to do.
            info!(namespace, name, "Object no longer exists, dropping item");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    match item.event_type {
        EventType::Created => handler.object_created(&object).await,
        EventType::Updated => handler.object_updated(&object).await,
        EventType::Deleted => Ok(()),
    }
}
