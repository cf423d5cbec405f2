//! Async host for one connector.
//!
//! [`spawn_connector`] moves a [`SyncController`] onto a tokio task that
//! owns it exclusively. Widgets and transports talk to it through a
//! cloneable [`ConnectorHandle`]; the task serializes every call, so the
//! controller itself never needs locking. Timers are driven by sleeping
//! until [`SyncController::next_deadline`].

use crate::controller::{ConnectorEvent, SyncController};
use crate::error::SyncResult;
use crate::remote::RemoteDataSource;
use folio_cache::CacheStats;
use folio_core::{
    CacheError, ConnectorConfig, ConnectorId, FilterToken, FolioResult, Item, ItemKey,
    PageDelivery, ScopeKey, ServerMessage, SyncState,
};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// COMMANDS
// ============================================================================

#[derive(Debug)]
enum Command {
    RequestPage {
        scope: ScopeKey,
        page: usize,
        page_size: usize,
        reply: oneshot::Sender<FolioResult<PageDelivery>>,
    },
    SetViewport {
        first_visible: usize,
        last_visible: usize,
    },
    SetFilter(FilterToken),
    EnsureSubcache {
        parent: ScopeKey,
        index: usize,
    },
    Expand(ItemKey),
    Collapse(ItemKey),
    Activate(Item),
    Select(Item),
    Deselect(ItemKey),
    SetSelectionMode {
        mode: String,
        reply: oneshot::Sender<FolioResult<()>>,
    },
    SetEnabled(bool),
    Deliver(ServerMessage),
    Reset,
    Snapshot(oneshot::Sender<ConnectorSnapshot>),
    Shutdown,
}

/// Point-in-time view of a running connector.
#[derive(Debug, Clone)]
pub struct ConnectorSnapshot {
    pub id: ConnectorId,
    pub state: SyncState,
    pub filter: FilterToken,
    pub root_size: usize,
    pub cached_pages: usize,
    pub pending_callbacks: usize,
    pub selected: Vec<ItemKey>,
    pub expanded: Vec<ItemKey>,
    pub stats: CacheStats,
}

impl<R: RemoteDataSource> From<&SyncController<R>> for ConnectorSnapshot {
    fn from(controller: &SyncController<R>) -> Self {
        let tree = controller.tree();
        let mut expanded: Vec<ItemKey> = tree.expanded_keys().cloned().collect();
        expanded.sort();
        Self {
            id: controller.id(),
            state: controller.state(),
            filter: controller.filter().clone(),
            root_size: controller.size(&ScopeKey::Root),
            cached_pages: tree.pages().page_count(),
            pending_callbacks: controller.pending_callbacks(),
            selected: controller.selection().selected_keys().cloned().collect(),
            expanded,
            stats: tree.pages().stats(),
        }
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable entry point into a running connector.
///
/// Every method fails with [`crate::SyncError::Closed`] once the task has stopped.
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ConnectorHandle {
    fn send(&self, command: Command) -> SyncResult<()> {
        self.commands.send(command)?;
        Ok(())
    }

    /// Ask for `page` of `scope` and wait until it resolves.
    ///
    /// Resolution may be loaded items, a placeholder, or an empty result
    /// when the request was cancelled by a filter change, reset or collapse.
    pub async fn request_page(
        &self,
        scope: ScopeKey,
        page: usize,
        page_size: usize,
    ) -> SyncResult<PageDelivery> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RequestPage {
            scope,
            page,
            page_size,
            reply,
        })?;
        Ok(rx.await??)
    }

    pub fn set_viewport(&self, first_visible: usize, last_visible: usize) -> SyncResult<()> {
        self.send(Command::SetViewport {
            first_visible,
            last_visible,
        })
    }

    pub fn set_filter(&self, filter: impl Into<FilterToken>) -> SyncResult<()> {
        self.send(Command::SetFilter(filter.into()))
    }

    pub fn ensure_subcache(&self, parent: ScopeKey, index: usize) -> SyncResult<()> {
        self.send(Command::EnsureSubcache { parent, index })
    }

    pub fn expand(&self, key: impl Into<ItemKey>) -> SyncResult<()> {
        self.send(Command::Expand(key.into()))
    }

    pub fn collapse(&self, key: impl Into<ItemKey>) -> SyncResult<()> {
        self.send(Command::Collapse(key.into()))
    }

    pub fn activate(&self, item: Item) -> SyncResult<()> {
        self.send(Command::Activate(item))
    }

    pub fn select(&self, item: Item) -> SyncResult<()> {
        self.send(Command::Select(item))
    }

    pub fn deselect(&self, key: impl Into<ItemKey>) -> SyncResult<()> {
        self.send(Command::Deselect(key.into()))
    }

    pub async fn set_selection_mode(&self, mode: impl Into<String>) -> SyncResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetSelectionMode {
            mode: mode.into(),
            reply,
        })?;
        Ok(rx.await??)
    }

    pub fn set_enabled(&self, enabled: bool) -> SyncResult<()> {
        self.send(Command::SetEnabled(enabled))
    }

    /// Hand a message from the remote side to the connector.
    pub fn deliver(&self, message: ServerMessage) -> SyncResult<()> {
        self.send(Command::Deliver(message))
    }

    pub fn reset(&self) -> SyncResult<()> {
        self.send(Command::Reset)
    }

    pub async fn snapshot(&self) -> SyncResult<ConnectorSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot(reply))?;
        Ok(rx.await?)
    }

    /// Stop the task. Pending page requests resolve empty.
    pub fn shutdown(&self) -> SyncResult<()> {
        self.send(Command::Shutdown)
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A connector running on its own task.
pub struct SpawnedConnector<R> {
    pub handle: ConnectorHandle,
    pub events: mpsc::UnboundedReceiver<ConnectorEvent>,
    /// Yields the outbound seam back once the task stops.
    pub task: JoinHandle<R>,
}

/// Start a connector on the current tokio runtime.
pub fn spawn_connector<R>(config: ConnectorConfig, remote: R) -> SyncResult<SpawnedConnector<R>>
where
    R: RemoteDataSource + Send + 'static,
{
    let controller = SyncController::new(config, remote)?;
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(controller, command_rx, event_tx));
    Ok(SpawnedConnector {
        handle: ConnectorHandle { commands },
        events,
        task,
    })
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

async fn run<R: RemoteDataSource>(
    mut controller: SyncController<R>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectorEvent>,
) -> R {
    info!(connector_id = %controller.id(), "connector task started");

    loop {
        let deadline = controller.next_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => apply(&mut controller, command),
            },
            _ = wait_until(deadline) => controller.tick(now()),
        }
        publish(&mut controller, &events);
    }

    controller.reset();
    publish(&mut controller, &events);
    info!(connector_id = %controller.id(), "connector task stopped");
    controller.into_remote()
}

fn publish<R: RemoteDataSource>(
    controller: &mut SyncController<R>,
    events: &mpsc::UnboundedSender<ConnectorEvent>,
) {
    for event in controller.drain_events() {
        // Nobody listening is fine
        let _ = events.send(event);
    }
}

fn apply<R: RemoteDataSource>(controller: &mut SyncController<R>, command: Command) {
    match command {
        Command::RequestPage {
            scope,
            page,
            page_size,
            reply,
        } => {
            let expected = controller.config().page_size;
            if page_size != expected {
                let _ = reply.send(Err(CacheError::PageSizeMismatch {
                    expected,
                    got: page_size,
                }
                .into()));
                return;
            }
            let callback = Box::new(move |delivery: PageDelivery| {
                let _ = reply.send(Ok(delivery));
            });
            if let Err(err) = controller.request_page(scope, page, page_size, callback, now()) {
                warn!(error = %err, "page request rejected");
            }
        }
        Command::SetViewport {
            first_visible,
            last_visible,
        } => controller.set_viewport(first_visible, last_visible),
        Command::SetFilter(filter) => controller.set_filter(filter, now()),
        Command::EnsureSubcache { parent, index } => {
            controller.ensure_subcache(parent, index, now())
        }
        Command::Expand(key) => controller.expand(key),
        Command::Collapse(key) => controller.collapse(key),
        Command::Activate(item) => controller.activate_item(item),
        Command::Select(item) => controller.select(item),
        Command::Deselect(key) => controller.deselect(&key),
        Command::SetSelectionMode { mode, reply } => {
            let _ = reply.send(controller.set_selection_mode(&mode));
        }
        Command::SetEnabled(enabled) => controller.set_enabled(enabled),
        Command::Deliver(message) => match controller.on_server_message(message) {
            Ok(outcome) => debug!(?outcome, "server message applied"),
            Err(err) => warn!(error = %err, "server message rejected"),
        },
        Command::Reset => controller.reset(),
        Command::Snapshot(reply) => {
            let _ = reply.send(ConnectorSnapshot::from(&*controller));
        }
        Command::Shutdown => {}
    }
}

// =============================================================================
// TESTS
// =============================================================================
