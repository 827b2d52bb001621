//! Poll-based watcher feeding the cache and the event adapter.
//!
//! Each tick lists the full inventory, diffs it against the cache, and
//! emits one adapter callback per difference:
//!
//! - key absent from the cache: insert + `on_add`
//! - key present: replace + `on_update` (the adapter drops unchanged
//!   versions as resyncs)
//! - cached key absent from the listing: remove + `on_remove`
//!
//! The store is marked synced after the first successful listing; list
//! failures are logged and retried on the next tick.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapter::EventAdapter;
use crate::client::InventoryClient;
use crate::store::{MemoryStore, ServiceObject};

/// Watches the inventory API and keeps the cache consistent.
pub struct Watcher {
    client: InventoryClient,
    store: Arc<MemoryStore>,
    adapter: EventAdapter,
    poll_interval: Duration,
}

impl Watcher {
    /// Create a watcher writing into the given store and adapter.
    pub fn new(
        client: InventoryClient,
        store: Arc<MemoryStore>,
        adapter: EventAdapter,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            store,
            adapter,
            poll_interval,
        }
    }

    /// Run the poll loop until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "Starting watcher"
        );

        let mut interval = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(error = %e, "Inventory listing failed, will retry");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Watcher shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Perform a single list-and-diff pass.
    pub async fn poll_once(&self) -> Result<()> {
        let listed = self.client.list_services().await?;
        self.apply(listed);
        self.store.mark_synced();
        Ok(())
    }

    /// Diff one full listing against the cache, emitting events for
    /// every difference.
    pub fn apply(&self, listed: Vec<ServiceObject>) {
        let mut seen = HashSet::with_capacity(listed.len());

        for object in listed {
            let key = object.key();
            seen.insert(key.clone());

            match self.store.lookup(&key) {
                None => {
                    self.store.insert(object.clone());
                    self.adapter.on_add(&object);
                }
                Some(previous) => {
                    self.store.insert(object.clone());
                    self.adapter.on_update(&previous, &object);
                }
            }
        }

        for key in self.store.keys() {
            if !seen.contains(&key) {
                debug!(key = %key, "Object missing from listing");
                self.store.remove(&key);
                self.adapter.on_remove(key);
            }
        }
    }
}
