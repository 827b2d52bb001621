//! Event source adapter: notification callbacks to work items.
//!
//! Each callback builds a fresh, immutable [`WorkItem`] from the
//! notification and hands it to the queue; no construction state is
//! shared between callback paths. Coalescing of duplicate items is the
//! queue's job, not the adapter's.

use std::sync::Arc;

use tagsync_workqueue::WorkQueue;
use tracing::debug;

use crate::item::{EventType, ResourceKey, WorkItem};
use crate::store::ServiceObject;

/// Translates watch notifications into exactly one queue add each.
pub struct EventAdapter {
    queue: Arc<WorkQueue<WorkItem>>,
}

impl EventAdapter {
    /// Create an adapter producing into the given queue.
    pub fn new(queue: Arc<WorkQueue<WorkItem>>) -> Self {
        Self { queue }
    }

    /// A new object was observed.
    pub fn on_add(&self, object: &ServiceObject) {
        let item = WorkItem::new(object.key(), EventType::Created);
        debug!(key = %item.key, "Observed new object");
        self.queue.add(item);
    }

    /// An existing object changed.
    ///
    /// Notifications whose change-tracking token is unchanged are
    /// periodic resyncs and are skipped.
    pub fn on_update(&self, old: &ServiceObject, new: &ServiceObject) {
        if old.resource_version == new.resource_version {
            debug!(key = %new.key(), "Resync with unchanged version, skipping");
            return;
        }

        let item = WorkItem::new(new.key(), EventType::Updated);
        debug!(
            key = %item.key,
            old_version = %old.resource_version,
            new_version = %new.resource_version,
            "Observed object update"
        );
        self.queue.add(item);
    }

    /// An object was removed. Only the key is required, so tombstones
    /// whose state is no longer retrievable are handled the same way.
    pub fn on_remove(&self, key: ResourceKey) {
        let item = WorkItem::new(key, EventType::Deleted);
        debug!(key = %item.key, "Observed object removal");
        self.queue.add(item);
    }
}
