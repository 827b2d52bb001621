//! The deduplicating work queue.
//!
//! Semantics, per item:
//!
//! - `add` while the item is neither pending nor in-flight: queued.
//! - `add` while the item is pending: dropped (coalesced).
//! - `add` while the item is in-flight: parked; re-queued when `done`
//!   is called for that item.
//! - `done` must be called exactly once per `get` result. A missed
//!   `done` leaves the in-flight marker behind and later adds for the
//!   same item are parked forever.
//!
//! Consumers call [`WorkQueue::get`], which resolves to `None` once
//! [`WorkQueue::shut_down`] has been called.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::trace;

use crate::BackoffPolicy;

struct Inner<T> {
    /// Delivery order for pending items.
    order: VecDeque<T>,

    /// Items waiting to be delivered. An item in `pending` appears in
    /// `order` unless it is also in-flight.
    pending: HashSet<T>,

    /// Items handed out by `get` and not yet released by `done`.
    in_flight: HashSet<T>,

    /// Consecutive failure count per item, fed into the backoff policy.
    failures: HashMap<T, u32>,

    shutting_down: bool,
}

/// A deduplicating, rate-limited work queue.
///
/// Shared as `Arc<WorkQueue<T>>` between producers and consumers; all
/// methods take `&self`.
pub struct WorkQueue<T> {
    inner: Mutex<Inner<T>>,
    wakeup: Notify,
    backoff: BackoffPolicy,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    /// Create an empty queue with the given backoff policy.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner {
                order: VecDeque::new(),
                pending: HashSet::new(),
                in_flight: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            }),
            wakeup: Notify::new(),
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().expect("workqueue mutex poisoned")
    }

    /// Insert an item unless an equal item is already pending.
    ///
    /// Never blocks and never fails; adds after shutdown are dropped.
    pub fn add(&self, item: T) {
        {
            let mut inner = self.lock();
            if inner.shutting_down {
                return;
            }
            if !inner.pending.insert(item.clone()) {
                // Already waiting; coalesce.
                return;
            }
            if inner.in_flight.contains(&item) {
                // Re-queued by `done` once the current attempt finishes.
                return;
            }
            inner.order.push_back(item);
        }
        self.wakeup.notify_waiters();
    }

    /// Wait for the next item, marking it in-flight.
    ///
    /// Returns `None` immediately once the queue has been shut down.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.wakeup.notified();
            {
                let mut inner = self.lock();
                if inner.shutting_down {
                    return None;
                }
                if let Some(item) = inner.order.pop_front() {
                    inner.pending.remove(&item);
                    inner.in_flight.insert(item.clone());
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Release an item handed out by [`WorkQueue::get`].
    ///
    /// If the item was re-added while in-flight it goes back on the
    /// queue now.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut inner = self.lock();
            inner.in_flight.remove(item);
            if inner.pending.contains(item) && !inner.shutting_down {
                inner.order.push_back(item.clone());
                true
            } else {
                false
            }
        };
        if requeued {
            self.wakeup.notify_waiters();
        }
    }

    /// Re-add an item after a backoff delay derived from its
    /// consecutive failure count.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = {
            let mut inner = self.lock();
            if inner.shutting_down {
                return;
            }
            let failures = inner.failures.entry(item.clone()).or_insert(0);
            let delay = self.backoff.delay_for(*failures);
            *failures += 1;
            delay
        };

        trace!(delay_ms = delay.as_millis() as u64, "Delaying re-add");

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Reset the consecutive failure count for an item.
    pub fn forget(&self, item: &T) {
        self.lock().failures.remove(item);
    }

    /// Number of consecutive failures recorded for an item.
    pub fn failure_count(&self, item: &T) -> u32 {
        self.lock().failures.get(item).copied().unwrap_or(0)
    }

    /// Number of items waiting to be delivered.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Whether no items are waiting to be delivered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting work and wake all blocked consumers.
    ///
    /// Pending items are discarded; in-flight items may still be
    /// released with [`WorkQueue::done`].
    pub fn shut_down(&self) {
        {
            let mut inner = self.lock();
            inner.shutting_down = true;
            inner.order.clear();
            inner.pending.clear();
        }
        self.wakeup.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn queue() -> Arc<WorkQueue<&'static str>> {
        Arc::new(WorkQueue::new(BackoffPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(16),
        )))
    }

    #[tokio::test]
    async fn test_add_deduplicates_pending_items() {
        let q = queue();

        q.add("a");
        q.add("a");
        q.add("b");

        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await, Some("a"));
        assert_eq!(q.get().await, Some("b"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let q = queue();

        q.add("a");
        q.add("b");
        q.add("c");

        assert_eq!(q.get().await, Some("a"));
        assert_eq!(q.get().await, Some("b"));
        assert_eq!(q.get().await, Some("c"));
    }

    #[tokio::test]
    async fn test_add_while_in_flight_requeues_on_done() {
        let q = queue();

        q.add("a");
        let item = q.get().await.unwrap();
        assert!(q.is_empty());

        // Re-add races with processing: parked until done.
        q.add("a");
        assert!(q.is_empty());

        q.done(&item);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get().await, Some("a"));
    }

    #[tokio::test]
    async fn test_done_without_pending_add_does_not_requeue() {
        let q = queue();

        q.add("a");
        let item = q.get().await.unwrap();
        q.done(&item);

        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_get_blocks_until_add() {
        let q = queue();

        let consumer = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.get().await })
        };

        tokio::task::yield_now().await;
        q.add("a");

        assert_eq!(consumer.await.unwrap(), Some("a"));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_consumers() {
        let q = queue();

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let q = Arc::clone(&q);
            consumers.push(tokio::spawn(async move { q.get().await }));
        }

        tokio::task::yield_now().await;
        q.shut_down();

        for consumer in consumers {
            assert_eq!(consumer.await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_get_after_shutdown_returns_immediately() {
        let q = queue();

        q.add("a");
        q.shut_down();

        assert_eq!(q.get().await, None);
    }

    #[tokio::test]
    async fn test_add_after_shutdown_is_dropped() {
        let q = queue();

        q.shut_down();
        q.add("a");

        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_add_is_delayed() {
        let q = queue();

        q.add_rate_limited("a");
        tokio::task::yield_now().await;
        assert!(q.is_empty());

        // Base delay is 1ms; after it elapses the item is back.
        tokio::time::advance(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(q.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_until_forget() {
        let q = queue();

        // Each rate-limited add bumps the failure count.
        q.add_rate_limited("a");
        q.add_rate_limited("a");
        q.add_rate_limited("a");
        assert_eq!(q.failure_count(&"a"), 3);

        q.forget(&"a");
        assert_eq!(q.failure_count(&"a"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers_and_consumers() {
        let q: Arc<WorkQueue<u32>> = Arc::new(WorkQueue::new(BackoffPolicy::default()));

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let q = Arc::clone(&q);
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(item) = q.get().await {
                    seen.push(item);
                    q.done(&item);
                }
                seen
            }));
        }

        for i in 0..100u32 {
            q.add(i);
        }

        // Wait for the queue to drain, then stop the consumers.
        while !q.is_empty() {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.shut_down();

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
