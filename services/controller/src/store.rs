//! Read cache of watched service objects.
//!
//! The controller core only ever reads from the store; the watcher is
//! the single writer. [`ObjectStore`] is the seam the reconciler
//! depends on, [`MemoryStore`] is the in-process implementation fed by
//! the poll watcher (and by tests).

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::item::ResourceKey;

/// Last-known full state of a watched service.
///
/// `resource_version` is the change-tracking token: two snapshots of
/// the same object with equal versions carry identical state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceObject {
    pub namespace: String,
    pub name: String,
    pub resource_version: String,
    pub service_type: String,

    /// Externally reachable address, if the service exposes one.
    #[serde(default)]
    pub external_address: Option<String>,

    /// User-assigned labels, propagated to the tag API.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ServiceObject {
    /// The stable key identifying this object.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.namespace, &self.name)
    }
}

/// Errors surfaced by store lookups.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object with this key exists in the cache.
    #[error("object not found: {0}")]
    NotFound(ResourceKey),

    /// The cache could not serve the lookup.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error is the expected object-gone race rather than
    /// a transient failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Read-side view of the watch cache.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Current snapshot for a key.
    async fn get(&self, key: &ResourceKey) -> Result<ServiceObject, StoreError>;

    /// Whether the initial listing has completed.
    fn has_synced(&self) -> bool;
}

/// In-memory watch cache. Read-many, write-one: the watcher inserts and
/// removes, everything else reads.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ResourceKey, ServiceObject>>,
    synced: AtomicBool,
}

impl MemoryStore {
    /// Create an empty, unsynced store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object, returning the previous snapshot.
    pub fn insert(&self, object: ServiceObject) -> Option<ServiceObject> {
        self.write().insert(object.key(), object)
    }

    /// Remove an object, returning its last-known snapshot.
    pub fn remove(&self, key: &ResourceKey) -> Option<ServiceObject> {
        self.write().remove(key)
    }

    /// Non-failing lookup used by the watcher's diffing pass.
    pub fn lookup(&self, key: &ResourceKey) -> Option<ServiceObject> {
        self.read().get(key).cloned()
    }

    /// All keys currently cached.
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.read().keys().cloned().collect()
    }

    /// Mark the initial listing as complete.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ResourceKey, ServiceObject>> {
        self.objects.read().expect("store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<ResourceKey, ServiceObject>> {
        self.objects.write().expect("store lock poisoned")
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<ServiceObject, StoreError> {
        self.lookup(key).ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}
