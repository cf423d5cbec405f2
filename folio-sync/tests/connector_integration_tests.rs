//! End-to-end tests: a spawned connector talking to the in-memory backend.

use folio_core::{ScopeKey, SyncState};
use folio_sync::{spawn_backend, spawn_connector, ConnectorEvent, InMemoryBackend};
use folio_test_utils::assertions::assert_loaded;
use folio_test_utils::fixtures::immediate_config;
use folio_test_utils::Item;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn test_scroll_expand_and_filter_round_trip() {
    let (remote, requests) = mpsc::unbounded_channel();
    let mut connector = spawn_connector(immediate_config(10), remote).unwrap();
    let handle = connector.handle.clone();
    let backend = spawn_backend(
        InMemoryBackend::with_labels(100).with_children("item-0", 12),
        requests,
        handle.clone(),
    );

    let first = handle.request_page(ScopeKey::Root, 0, 10).await.unwrap();
    assert_loaded(&first, 10);
    assert_eq!(first.size, Some(100));

    handle.expand("item-0").unwrap();
    handle.ensure_subcache(ScopeKey::Root, 0).unwrap();
    let children = handle
        .request_page(ScopeKey::parent("item-0"), 0, 10)
        .await
        .unwrap();
    assert_loaded(&children, 10);
    assert_eq!(children.items()[0].key.as_str(), "item-0/0");

    handle.collapse("item-0").unwrap();
    handle.set_filter("item 1").unwrap();
    let filtered = handle.request_page(ScopeKey::Root, 0, 10).await.unwrap();
    assert_loaded(&filtered, 10);
    assert_eq!(filtered.size, Some(11));

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SyncState::Settled);
    assert!(snapshot.expanded.is_empty());
    assert_eq!(snapshot.root_size, 11);

    handle.shutdown().unwrap();
    drop(connector.task.await.unwrap());
    let backend = backend.await.unwrap();
    assert!(backend.acknowledged().len() >= 3);
    assert_eq!(backend.expanded().count(), 0);

    let mut saw_materialized = false;
    while let Ok(event) = connector.events.try_recv() {
        if let ConnectorEvent::SubcacheMaterialized { scope } = event {
            assert_eq!(scope, ScopeKey::parent("item-0"));
            saw_materialized = true;
        }
    }
    assert!(saw_materialized);
}

#[tokio::test(start_paused = true)]
async fn test_selection_reaches_backend_and_returns_in_data() {
    let (remote, requests) = mpsc::unbounded_channel();
    let connector = spawn_connector(immediate_config(10), remote).unwrap();
    let handle = connector.handle.clone();
    let backend = spawn_backend(InMemoryBackend::with_labels(30), requests, handle.clone());

    handle.set_selection_mode("multi").await.unwrap();
    handle.select(Item::new("item-3")).unwrap();
    handle.select(Item::new("item-4")).unwrap();

    let page = handle.request_page(ScopeKey::Root, 0, 10).await.unwrap();
    let selected: Vec<&str> = page
        .items()
        .iter()
        .filter(|item| item.selected)
        .map(|item| item.key.as_str())
        .collect();
    assert_eq!(selected, vec!["item-3", "item-4"]);

    handle.shutdown().unwrap();
    drop(connector.task.await.unwrap());
    let backend = backend.await.unwrap();
    let on_server: Vec<&str> = backend.selected().map(|key| key.as_str()).collect();
    assert_eq!(on_server, vec!["item-3", "item-4"]);
}

#[tokio::test(start_paused = true)]
async fn test_activation_opens_details() {
    let (remote, requests) = mpsc::unbounded_channel();
    let mut connector = spawn_connector(immediate_config(10), remote).unwrap();
    let handle = connector.handle.clone();
    let backend = spawn_backend(InMemoryBackend::with_labels(5), requests, handle.clone());

    let page = handle.request_page(ScopeKey::Root, 0, 10).await.unwrap();
    handle.activate(page.items()[2].clone()).unwrap();

    let mut opened = None;
    while let Some(event) = connector.events.recv().await {
        if let ConnectorEvent::DetailsChanged { key, opened: true } = event {
            opened = Some(key);
            break;
        }
    }
    assert_eq!(opened.map(|key| key.as_str().to_string()), Some("item-2".to_string()));

    handle.shutdown().unwrap();
    drop(connector.task.await.unwrap());
    backend.await.unwrap();
}
