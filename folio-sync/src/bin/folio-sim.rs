//! FOLIO simulator entry point.
//!
//! Runs one connector against the in-memory backend and walks through a
//! scroll, a filter round-trip and a tree expansion, logging what the
//! widget would receive.

use folio_core::{ConnectorConfig, ScopeKey};
use folio_sync::{
    init_tracing, spawn_backend, spawn_connector, ConnectorHandle, InMemoryBackend, SyncError,
    SyncResult, TelemetryConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

const ROOT_ITEMS: usize = 240;
const CHILD_ITEMS: usize = 12;

#[tokio::main]
async fn main() -> SyncResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;
    let config = load_config()?;
    let page_size = config.page_size;
    let settle = config.filter_debounce() + Duration::from_millis(100);

    let (remote, requests) = mpsc::unbounded_channel();
    let connector = spawn_connector(config, remote)?;
    let handle = connector.handle.clone();
    let backend = spawn_backend(
        InMemoryBackend::with_labels(ROOT_ITEMS).with_children("item-0", CHILD_ITEMS),
        requests,
        handle.clone(),
    );

    handle.set_viewport(0, page_size.saturating_sub(1))?;
    show_page(&handle, ScopeKey::Root, 0, page_size).await?;
    show_page(&handle, ScopeKey::Root, 2, page_size).await?;

    handle.set_filter("item 1")?;
    show_page(&handle, ScopeKey::Root, 0, page_size).await?;
    handle.set_filter("")?;
    tokio::time::sleep(settle).await;
    show_page(&handle, ScopeKey::Root, 0, page_size).await?;

    handle.expand("item-0")?;
    handle.ensure_subcache(ScopeKey::Root, 0)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    show_page(&handle, ScopeKey::parent("item-0"), 0, page_size).await?;

    let snapshot = handle.snapshot().await?;
    info!(
        connector_id = %snapshot.id,
        state = ?snapshot.state,
        root_size = snapshot.root_size,
        cached_pages = snapshot.cached_pages,
        hit_rate = snapshot.stats.hit_rate(),
        expanded = ?snapshot.expanded,
        "Simulation finished"
    );

    handle.shutdown()?;
    connector.task.await.map_err(|_| SyncError::Closed)?;
    let backend = backend.await.map_err(|_| SyncError::Closed)?;
    info!(acknowledged = backend.acknowledged().len(), "Backend stopped");
    Ok(())
}

async fn show_page(
    handle: &ConnectorHandle,
    scope: ScopeKey,
    page: usize,
    page_size: usize,
) -> SyncResult<()> {
    let delivery = handle.request_page(scope, page, page_size).await?;
    let first = delivery.items().first().and_then(|item| item.label()).unwrap_or("-");
    info!(
        scope = %delivery.scope,
        page = delivery.page,
        items = delivery.content.len(),
        loaded = delivery.content.is_loaded(),
        size = ?delivery.size,
        first,
        "Page delivered"
    );
    Ok(())
}

fn load_config() -> SyncResult<ConnectorConfig> {
    match config_path_from_args().or_else(config_path_from_env) {
        Some(path) => Ok(ConnectorConfig::from_path(&path)?),
        None => {
            let config = ConnectorConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("FOLIO_SIM_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
