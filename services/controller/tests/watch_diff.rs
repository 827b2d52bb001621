//! Watcher diffing tests: listings against the cache produce exactly
//! the right notifications.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tagsync_controller::adapter::EventAdapter;
use tagsync_controller::client::InventoryClient;
use tagsync_controller::item::{EventType, ResourceKey, WorkItem};
use tagsync_controller::store::{MemoryStore, ObjectStore, ServiceObject};
use tagsync_controller::watch::Watcher;
use tagsync_workqueue::{BackoffPolicy, WorkQueue};

fn object(name: &str, version: &str) -> ServiceObject {
    ServiceObject {
        namespace: "ns".to_string(),
        name: name.to_string(),
        resource_version: version.to_string(),
        service_type: "cluster-ip".to_string(),
        external_address: None,
        labels: BTreeMap::new(),
    }
}

fn watcher(base_url: &str) -> (Watcher, Arc<MemoryStore>, Arc<WorkQueue<WorkItem>>) {
    let queue = Arc::new(WorkQueue::new(BackoffPolicy::default()));
    let store = Arc::new(MemoryStore::new());
    let watcher = Watcher::new(
        InventoryClient::with_base_url(base_url),
        Arc::clone(&store),
        EventAdapter::new(Arc::clone(&queue)),
        Duration::from_secs(10),
    );
    (watcher, store, queue)
}

#[tokio::test]
async fn test_new_object_emits_add() {
    let (watcher, store, queue) = watcher("http://127.0.0.1:1");

    watcher.apply(vec![object("foo", "1")]);

    assert!(store.lookup(&ResourceKey::new("ns", "foo")).is_some());
    let item = queue.get().await.unwrap();
    assert_eq!(item.event_type, EventType::Created);
}

#[tokio::test]
async fn test_changed_version_emits_update() {
    let (watcher, store, queue) = watcher("http://127.0.0.1:1");

    watcher.apply(vec![object("foo", "1")]);
    assert_eq!(queue.get().await.unwrap().event_type, EventType::Created);

    watcher.apply(vec![object("foo", "2")]);

    let cached = store.lookup(&ResourceKey::new("ns", "foo")).unwrap();
    assert_eq!(cached.resource_version, "2");
    assert_eq!(queue.get().await.unwrap().event_type, EventType::Updated);
}

#[tokio::test]
async fn test_unchanged_version_emits_nothing() {
    let (watcher, _store, queue) = watcher("http://127.0.0.1:1");

    watcher.apply(vec![object("foo", "1")]);
    assert_eq!(queue.get().await.unwrap().event_type, EventType::Created);

    // Same listing again: a periodic resync, not a change.
    watcher.apply(vec![object("foo", "1")]);

    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_missing_object_emits_remove() {
    let (watcher, store, queue) = watcher("http://127.0.0.1:1");

    watcher.apply(vec![object("foo", "1"), object("bar", "1")]);
    assert!(queue.get().await.is_some());
    assert!(queue.get().await.is_some());

    watcher.apply(vec![object("foo", "1")]);

    assert!(store.lookup(&ResourceKey::new("ns", "bar")).is_none());
    let item = queue.get().await.unwrap();
    assert_eq!(item.key, ResourceKey::new("ns", "bar"));
    assert_eq!(item.event_type, EventType::Deleted);
}

#[tokio::test]
async fn test_poll_once_lists_and_marks_synced() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "services": [
            {
                "namespace": "ns",
                "name": "foo",
                "resource_version": "1",
                "service_type": "load-balancer"
            }
        ]
    });
    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let (watcher, store, queue) = watcher(&server.uri());
    assert!(!store.has_synced());

    watcher.poll_once().await.unwrap();

    assert!(store.has_synced());
    assert!(store.lookup(&ResourceKey::new("ns", "foo")).is_some());
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_poll_failure_leaves_store_unsynced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/services"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (watcher, store, _queue) = watcher(&server.uri());

    assert!(watcher.poll_once().await.is_err());
    assert!(!store.has_synced());
}
