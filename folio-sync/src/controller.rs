//! Connector state machine.
//!
//! [`SyncController`] owns every piece of per-connector state and wires it to
//! widget requests, server messages and the passage of time:
//!
//! ```text
//!   Idle ──fetch──▶ Loading ──confirm──▶ Settled
//!     ▲                ▲                    │
//!     │                └─────debounce───────┤
//!   reset          FilterPending ◀──filter──┘ (from any state)
//! ```
//!
//! Callbacks are never invoked while a map is half-updated: every operation
//! collects [`Resolution`]s and fires them as its last step.

use crate::coordinator::{RequestCoordinator, SubcacheRequest, Viewport};
use crate::details::DetailsTracker;
use crate::remote::RemoteDataSource;
use crate::schedule::{earliest, ScheduledTask};
use folio_cache::{
    HierarchyCache, PageCallback, PendingCallbackRegistry, Resolution, SelectionChange,
    SelectionTracker,
};
use folio_core::{
    is_page_aligned, page_count_for, page_of_index, BatchId, CacheError, ClientMessage,
    ConnectorConfig, ConnectorId, FilterToken, FolioResult, Item, ItemKey, PageContent,
    PageDelivery, RequestedRange, ScopeKey, SelectionMode, SelectionOrigin, ServerMessage, SyncState,
};
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

// ============================================================================
// OUTCOMES AND EVENTS
// ============================================================================

/// What happened to a page of data from the remote side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOutcome {
    Stored { pages: Vec<usize> },
    /// Fetched under a filter that is no longer current.
    Stale,
    /// The scope is not materialized (never expanded, or collapsed since).
    UnknownScope,
}

/// What happened to a batch confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Flushed { resolved: usize },
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied,
    Data(DataOutcome),
    Confirm(ConfirmOutcome),
}

/// Observable changes, drained by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Selection(SelectionChange),
    DetailsChanged { key: ItemKey, opened: bool },
    ExpansionChanged { key: ItemKey, expanded: bool },
    PagesInvalidated { scope: ScopeKey },
    /// Data landed for a page nobody was waiting on; the widget should redraw it.
    PageRefreshed { scope: ScopeKey, page: usize },
    SizeChanged { scope: ScopeKey, size: usize },
    SubcacheMaterialized { scope: ScopeKey },
    StateChanged { from: SyncState, to: SyncState },
}

fn fire(resolutions: Vec<Resolution>) {
    if !resolutions.is_empty() {
        trace!(count = resolutions.len(), "firing page callbacks");
    }
    for resolution in resolutions {
        resolution.fire();
    }
}

// ============================================================================
// CONTROLLER
// ============================================================================

pub struct SyncController<R: RemoteDataSource> {
    id: ConnectorId,
    config: ConnectorConfig,
    state: SyncState,
    filter: FilterToken,
    /// Widget filter text applied locally when filtering client-side.
    label_filter: FilterToken,
    debounce: ScheduledTask,
    /// Root pages asked for while the filter debounce was running.
    debounce_pages: BTreeSet<usize>,
    tree: HierarchyCache,
    pending: PendingCallbackRegistry,
    coordinator: RequestCoordinator,
    selection: SelectionTracker,
    details: DetailsTracker,
    events: VecDeque<ConnectorEvent>,
    remote: R,
}

impl<R: RemoteDataSource> SyncController<R> {
    pub fn new(config: ConnectorConfig, remote: R) -> FolioResult<Self> {
        config.validate()?;
        let id = ConnectorId::now_v7();
        info!(connector_id = %id, page_size = config.page_size, "connector created");
        Ok(Self {
            id,
            state: SyncState::Idle,
            filter: FilterToken::none(),
            label_filter: FilterToken::none(),
            debounce: ScheduledTask::new(),
            debounce_pages: BTreeSet::new(),
            tree: HierarchyCache::new(config.page_size),
            pending: PendingCallbackRegistry::new(),
            coordinator: RequestCoordinator::new(&config),
            selection: SelectionTracker::new(SelectionMode::default()),
            details: DetailsTracker::new(),
            events: VecDeque::new(),
            remote,
            config,
        })
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Filter the remote is queried with.
    pub fn filter(&self) -> &FilterToken {
        &self.filter
    }

    /// Filter applied to delivered root pages in client-side mode.
    pub fn label_filter(&self) -> &FilterToken {
        &self.label_filter
    }

    /// Best-known size of `scope`, 0 when unknown.
    pub fn size(&self, scope: &ScopeKey) -> usize {
        self.tree.size(scope).unwrap_or(0)
    }

    pub fn tree(&self) -> &HierarchyCache {
        &self.tree
    }

    pub fn selection(&self) -> &SelectionTracker {
        &self.selection
    }

    pub fn details(&self) -> &DetailsTracker {
        &self.details
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    /// Number of page callbacks still owed a result.
    pub fn pending_callbacks(&self) -> usize {
        self.pending.callback_count()
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut R {
        &mut self.remote
    }

    /// Tear down and hand back the outbound seam.
    pub fn into_remote(mut self) -> R {
        fire(self.pending.drain_all());
        self.remote
    }

    pub fn drain_events(&mut self) -> Vec<ConnectorEvent> {
        self.events.drain(..).collect()
    }

    /// When the host should call [`Self::tick`] next.
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.debounce.deadline(), self.coordinator.next_deadline()])
    }

    fn set_state(&mut self, to: SyncState) {
        if self.state != to {
            debug!(connector_id = %self.id, from = ?self.state, to = ?to, "state changed");
            self.events.push_back(ConnectorEvent::StateChanged {
                from: self.state,
                to,
            });
            self.state = to;
        }
    }

    // ------------------------------------------------------------------------
    // Widget → controller
    // ------------------------------------------------------------------------

    pub fn set_viewport(&mut self, first_visible: usize, last_visible: usize) {
        self.coordinator
            .set_viewport(Viewport::new(first_visible, last_visible));
    }

    /// The widget wants `page` of `scope`.
    ///
    /// A fresh cached page answers immediately; otherwise the callback waits
    /// for the next confirmed batch. The widget must ask with the configured
    /// page size.
    pub fn request_page(
        &mut self,
        scope: ScopeKey,
        page: usize,
        page_size: usize,
        callback: PageCallback,
        now: Instant,
    ) -> FolioResult<()> {
        if page_size != self.config.page_size {
            warn!(connector_id = %self.id, expected = self.config.page_size, got = page_size, "page size mismatch");
            return Err(CacheError::PageSizeMismatch {
                expected: self.config.page_size,
                got: page_size,
            }
            .into());
        }

        if !self.tree.contains_scope(&scope) {
            debug!(scope = %scope, page, "page requested for unknown scope");
            fire(vec![Resolution::new(
                callback,
                PageDelivery::empty(scope, page, Some(0)),
            )]);
            return Ok(());
        }

        let page = self.clamp_page(&scope, page);

        if self.state == SyncState::FilterPending {
            if scope.is_root() {
                self.debounce_pages.insert(page);
            }
            self.pending.register(scope, page, callback);
            return Ok(());
        }

        if let Some(items) = self.tree.pages().get_fresh(&scope, page, &self.filter) {
            trace!(scope = %scope, page, "page served from cache");
            let delivery =
                PageDelivery::loaded(scope.clone(), page, items.to_vec(), self.tree.size(&scope));
            fire(self.narrow(vec![Resolution::new(callback, delivery)]));
            return Ok(());
        }

        self.pending.register(scope.clone(), page, callback);
        let evicted = if scope.is_root() {
            self.pending
                .enforce_cap(&scope, page, page_size, self.config.max_active_range)
        } else {
            Vec::new()
        };

        let fetched = self.coordinator.fetch_page(
            &scope,
            page,
            &self.tree,
            &self.filter,
            now,
            &mut self.remote,
        );
        if fetched.is_some() {
            self.set_state(SyncState::Loading);
        }

        fire(evicted);
        Ok(())
    }

    /// Widgets occasionally ask past the end; clamp to the last valid page.
    fn clamp_page(&self, scope: &ScopeKey, page: usize) -> usize {
        match (scope, self.tree.size(scope)) {
            (ScopeKey::Root, size) => page.min(size.unwrap_or(0) / self.config.page_size),
            (ScopeKey::Parent(_), Some(size)) => page.min(size / self.config.page_size),
            (ScopeKey::Parent(_), None) => page,
        }
    }

    /// The widget's filter text changed.
    ///
    /// Every pending request is answered empty and all cached data dropped
    /// right away, child scopes included; the new query goes out once the
    /// filter has been stable for the debounce window. Expansion flags
    /// survive, so sub-caches come back through [`Self::ensure_subcache`].
    ///
    /// With client-side filtering the remote is never re-queried: the text
    /// only narrows what later deliveries of the root scope contain.
    pub fn set_filter(&mut self, filter: impl Into<FilterToken>, now: Instant) {
        let filter = filter.into();
        if self.config.client_side_filter {
            self.set_label_filter(filter);
            return;
        }
        if filter == self.filter {
            return;
        }
        debug!(connector_id = %self.id, from = %self.filter, to = %filter, "filter changed");

        let resolutions = self.pending.drain_all();
        let dropped = self.tree.ensure_hierarchy();
        self.tree.clear_pages();
        self.coordinator.clear_ranges();
        self.coordinator.clear_queues();
        self.debounce_pages.clear();
        if !dropped.is_empty() {
            debug!(connector_id = %self.id, dropped = dropped.len(), "child scopes dropped for new filter");
        }
        self.filter = filter;
        self.debounce.schedule(now, self.config.filter_debounce());
        self.events.push_back(ConnectorEvent::PagesInvalidated {
            scope: ScopeKey::Root,
        });
        self.set_state(SyncState::FilterPending);

        fire(resolutions);
    }

    fn set_label_filter(&mut self, filter: FilterToken) {
        if filter == self.label_filter {
            return;
        }
        debug!(connector_id = %self.id, from = %self.label_filter, to = %filter, "label filter changed");
        self.label_filter = filter;
        self.events.push_back(ConnectorEvent::PagesInvalidated {
            scope: ScopeKey::Root,
        });
    }

    /// Client-side filtering: keep only root items whose label matches, and
    /// report the narrowed count as the size.
    fn narrow(&self, mut resolutions: Vec<Resolution>) -> Vec<Resolution> {
        if !self.config.client_side_filter {
            return resolutions;
        }
        for resolution in &mut resolutions {
            let delivery = resolution.delivery_mut();
            if !delivery.scope.is_root() {
                continue;
            }
            if let PageContent::Loaded(items) = &mut delivery.content {
                items.retain(|item| self.label_filter.matches_label(item.label()));
                delivery.size = Some(items.len());
            }
        }
        resolutions
    }

    /// Run whatever timers have expired by `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.debounce.take_if_due(now) {
            self.on_debounce_elapsed(now);
        }
        self.coordinator.poll_parents(now, &mut self.remote);
        if let Some(request) = self.coordinator.poll_subcache(now, &self.tree) {
            self.materialize(request.parent, request.index, now);
        }
    }

    fn on_debounce_elapsed(&mut self, now: Instant) {
        self.tree.clear_pages();
        self.coordinator.clear_ranges();

        if self.filter.is_empty() {
            // The remote may believe it already sent the unfiltered data
            self.remote.send(ClientMessage::ResetDataCommunicator);
        }

        let first = self.debounce_pages.first().copied().unwrap_or(0);
        let last = self.debounce_pages.last().copied().unwrap_or(0);
        self.debounce_pages.clear();

        info!(connector_id = %self.id, filter = %self.filter, first, last, "filter settled");
        self.coordinator.issue(
            &ScopeKey::Root,
            RequestedRange::new(first, last),
            &self.filter,
            now,
            &mut self.remote,
        );
        self.set_state(SyncState::Loading);
    }

    /// The widget wants the children of the item at `index` of `parent`.
    pub fn ensure_subcache(&mut self, parent: ScopeKey, index: usize, now: Instant) {
        let Some(item) = self.tree.pages().item_at(&parent, index) else {
            return;
        };
        let key = item.key.clone();
        if !self.tree.is_expanded(&key) || self.tree.contains_scope(&ScopeKey::Parent(key.clone())) {
            return;
        }

        if self.coordinator.defers_subcaches() {
            let depth = self.tree.depth(&parent).unwrap_or(0);
            self.coordinator.enqueue_subcache(
                SubcacheRequest {
                    parent,
                    index,
                    key,
                    depth,
                },
                now,
            );
        } else {
            self.materialize(parent, index, now);
        }
    }

    fn materialize(&mut self, parent: ScopeKey, index: usize, now: Instant) {
        let Some(child) = self.tree.materialize(&parent, index) else {
            return;
        };
        debug!(scope = %child, "sub-cache materialized");
        self.events
            .push_back(ConnectorEvent::SubcacheMaterialized { scope: child.clone() });

        if self.state != SyncState::FilterPending {
            let fetched = self.coordinator.fetch_page(
                &child,
                0,
                &self.tree,
                &self.filter,
                now,
                &mut self.remote,
            );
            if fetched.is_some() {
                self.set_state(SyncState::Loading);
            }
        }
    }

    /// User expanded `key`.
    pub fn expand(&mut self, key: ItemKey) {
        if self.tree.expand(key.clone()) {
            self.remote.send(ClientMessage::UpdateExpandedState {
                key: key.clone(),
                expanded: true,
            });
            self.events.push_back(ConnectorEvent::ExpansionChanged {
                key,
                expanded: true,
            });
        }
    }

    /// User collapsed `key`.
    pub fn collapse(&mut self, key: ItemKey) {
        self.remote.send(ClientMessage::UpdateExpandedState {
            key: key.clone(),
            expanded: false,
        });
        self.collapse_scope(&key);
    }

    /// Drop the subtree under `key` together with every request for it.
    fn collapse_scope(&mut self, key: &ItemKey) {
        let was_expanded = self.tree.is_expanded(key);
        let mut removed = self.tree.collapse(key);
        let own_scope = ScopeKey::Parent(key.clone());
        if !removed.contains(&own_scope) {
            removed.push(own_scope);
        }

        let mut resolutions = Vec::new();
        for scope in &removed {
            self.coordinator.forget_scope(scope);
            resolutions.extend(self.pending.drain_scope(scope));
        }

        if was_expanded {
            self.events.push_back(ConnectorEvent::ExpansionChanged {
                key: key.clone(),
                expanded: false,
            });
        }
        fire(resolutions);
    }

    /// User activated (clicked) `item`.
    ///
    /// In single-selection mode this toggles its selection. With details on
    /// click enabled it also toggles the item's details row.
    pub fn activate_item(&mut self, item: Item) {
        if self.selection.mode() == SelectionMode::Single {
            let changes = self.selection.toggle(item.clone(), SelectionOrigin::User);
            self.apply_selection(changes);
        }
        if self.config.details_visible_on_click {
            let request = self.details.toggle_request(&item);
            self.remote.send(request);
        }
    }

    pub fn select(&mut self, item: Item) {
        let changes = self.selection.select(item, SelectionOrigin::User);
        self.apply_selection(changes);
    }

    pub fn deselect(&mut self, key: &ItemKey) {
        let changes = self.selection.deselect(key, SelectionOrigin::User);
        self.apply_selection(changes);
    }

    /// Change the selection mode by name. An unknown name is rejected and
    /// the mode kept.
    pub fn set_selection_mode(&mut self, mode: &str) -> FolioResult<()> {
        let changes = self.selection.set_mode_str(mode)?;
        self.apply_selection(changes);
        Ok(())
    }

    /// A disabled widget ignores user-originated selection.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.selection.set_enabled(enabled);
    }

    fn apply_selection(&mut self, changes: impl IntoIterator<Item = SelectionChange>) {
        for change in changes {
            if change.origin.is_user() {
                let key = change.key.clone();
                self.remote.send(if change.selected {
                    ClientMessage::Select { key }
                } else {
                    ClientMessage::Deselect { key }
                });
            }
            self.events.push_back(ConnectorEvent::Selection(change));
        }
    }

    fn apply_details(&mut self, changes: Vec<(ItemKey, bool)>) {
        for (key, opened) in changes {
            self.events
                .push_back(ConnectorEvent::DetailsChanged { key, opened });
        }
    }

    /// Answer every pending request empty and drop all cached state.
    pub fn reset(&mut self) {
        info!(connector_id = %self.id, "connector reset");
        let resolutions = self.pending.drain_all();
        self.tree.reset();
        self.tree.set_size(&ScopeKey::Root, 0);
        self.coordinator.reset();
        self.debounce.cancel();
        self.debounce_pages.clear();
        self.events.push_back(ConnectorEvent::PagesInvalidated {
            scope: ScopeKey::Root,
        });
        self.set_state(SyncState::Idle);
        fire(resolutions);
    }

    // ------------------------------------------------------------------------
    // Remote → controller
    // ------------------------------------------------------------------------

    pub fn on_server_message(&mut self, message: ServerMessage) -> FolioResult<MessageOutcome> {
        match message {
            ServerMessage::PageData {
                start_index,
                items,
                parent_key,
                filter,
            } => self
                .on_page_data(parent_key.into(), start_index, items, filter)
                .map(MessageOutcome::Data),
            ServerMessage::SizeUpdate { parent_key, size } => {
                self.on_size_update(parent_key.into(), size);
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::BatchConfirmed {
                batch_id,
                parent_key,
                filter,
                level_size,
            } => Ok(MessageOutcome::Confirm(self.on_batch_confirmed(
                batch_id, parent_key, filter, level_size,
            ))),
            ServerMessage::ItemsUpdated { items } => {
                self.on_items_updated(items);
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::Clear {
                start_index,
                length,
                parent_key,
            } => {
                self.on_clear(parent_key.into(), start_index, length)?;
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::Reset => {
                self.reset();
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::ExpandItems { items } => {
                for item in items {
                    if self.tree.expand(item.key.clone()) {
                        self.events.push_back(ConnectorEvent::ExpansionChanged {
                            key: item.key,
                            expanded: true,
                        });
                    }
                }
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::CollapseItems { items } => {
                for item in items {
                    self.collapse_scope(&item.key);
                }
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::SetSelectionMode { mode } => {
                self.set_selection_mode(&mode)?;
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::EnsureHierarchy => {
                let removed = self.tree.ensure_hierarchy();
                self.drop_scopes(&removed);
                self.coordinator.clear_ranges();
                Ok(MessageOutcome::Applied)
            }
            ServerMessage::ClearExpanded => {
                let removed = self.tree.clear_expanded();
                self.coordinator.clear_queues();
                self.drop_scopes(&removed);
                Ok(MessageOutcome::Applied)
            }
        }
    }

    fn drop_scopes(&mut self, scopes: &[ScopeKey]) {
        let mut resolutions = Vec::new();
        for scope in scopes {
            self.coordinator.forget_scope(scope);
            resolutions.extend(self.pending.drain_scope(scope));
        }
        fire(resolutions);
    }

    /// Whether data or a confirmation stamped `incoming` belongs to the
    /// current query. Nothing does while a filter change is pending.
    fn is_current(&self, incoming: Option<&FilterToken>) -> bool {
        self.state != SyncState::FilterPending && self.filter.accepts(incoming)
    }

    fn on_page_data(
        &mut self,
        scope: ScopeKey,
        start_index: usize,
        mut items: Vec<Item>,
        filter: Option<FilterToken>,
    ) -> FolioResult<DataOutcome> {
        if !self.is_current(filter.as_ref()) {
            debug!(scope = %scope, start_index, filter = ?filter, current = %self.filter, "stale page data discarded");
            return Ok(DataOutcome::Stale);
        }
        if !self.tree.contains_scope(&scope) {
            debug!(scope = %scope, start_index, "page data for unknown scope discarded");
            return Ok(DataOutcome::UnknownScope);
        }
        if !is_page_aligned(start_index, self.config.page_size) {
            return Err(CacheError::Misaligned {
                scope,
                index: start_index,
                page_size: self.config.page_size,
            }
            .into());
        }

        let selection_changes = self.selection.reconcile(&mut items);
        let details_changes = self.details.reconcile(&items);
        let stamp = filter.unwrap_or_else(|| self.filter.clone());
        let pages = self
            .tree
            .put(&scope, start_index, items, &stamp)?
            .unwrap_or_default();

        for page in &pages {
            if !self.pending.is_pending(&scope, *page) {
                self.events.push_back(ConnectorEvent::PageRefreshed {
                    scope: scope.clone(),
                    page: *page,
                });
            }
        }
        self.apply_selection(selection_changes);
        self.apply_details(details_changes);

        trace!(scope = %scope, start_index, pages = pages.len(), "page data stored");
        Ok(DataOutcome::Stored { pages })
    }

    fn on_size_update(&mut self, scope: ScopeKey, size: usize) {
        if self.tree.set_size(&scope, size) {
            trace!(scope = %scope, size, "size updated");
            // Locally filtered deliveries carry their own count
            if self.config.client_side_filter && scope.is_root() {
                return;
            }
            self.events
                .push_back(ConnectorEvent::SizeChanged { scope, size });
        }
    }

    fn on_batch_confirmed(
        &mut self,
        batch_id: BatchId,
        parent_key: Option<ItemKey>,
        filter: Option<FilterToken>,
        level_size: Option<usize>,
    ) -> ConfirmOutcome {
        let scope = ScopeKey::from(parent_key.clone());
        if !self.is_current(filter.as_ref()) {
            debug!(%batch_id, scope = %scope, filter = ?filter, current = %self.filter, "stale confirmation ignored");
            return ConfirmOutcome::Stale;
        }

        let page_size = self.config.page_size;
        let (placeholder_len, size) = match &scope {
            ScopeKey::Root => (page_size, self.tree.size(&scope)),
            ScopeKey::Parent(_) => {
                if let Some(level_size) = level_size {
                    self.tree.set_size(&scope, level_size);
                }
                (
                    level_size.unwrap_or(page_size),
                    level_size.or_else(|| self.tree.size(&scope)),
                )
            }
        };

        let resolutions = self.pending.flush_scope(
            &scope,
            self.tree.pages(),
            self.coordinator.range(&scope),
            size,
            placeholder_len,
        );
        let resolved = resolutions.len();

        self.remote.send(match parent_key {
            None => ClientMessage::ConfirmUpdate { batch_id },
            Some(parent_key) => ClientMessage::ConfirmParentUpdate {
                batch_id,
                parent_key,
            },
        });
        debug!(%batch_id, scope = %scope, resolved, "batch confirmed");
        self.set_state(SyncState::Settled);

        fire(self.narrow(resolutions));
        ConfirmOutcome::Flushed { resolved }
    }

    fn on_items_updated(&mut self, mut items: Vec<Item>) {
        let selection_changes = self.selection.reconcile(&mut items);
        let details_changes = self.details.reconcile(&items);
        let touched = self.tree.pages_mut().update_items(&items);
        for (scope, page) in touched {
            self.events
                .push_back(ConnectorEvent::PageRefreshed { scope, page });
        }
        self.apply_selection(selection_changes);
        self.apply_details(details_changes);
    }

    fn on_clear(&mut self, scope: ScopeKey, start_index: usize, length: usize) -> FolioResult<()> {
        if self.tree.pages().scope_page_count(&scope) == 0 {
            return Ok(());
        }
        let page_size = self.config.page_size;
        if !is_page_aligned(start_index, page_size) {
            return Err(CacheError::Misaligned {
                scope,
                index: start_index,
                page_size,
            }
            .into());
        }

        let first_page = page_of_index(start_index, page_size);
        let count = page_count_for(length, page_size);
        let changes = self.tree.pages_mut().invalidate_range(
            &scope,
            first_page,
            count,
            &mut self.selection,
        );
        // The cleared pages must be fetchable again
        let overlaps = self.coordinator.range(&scope).is_some_and(|range| {
            (first_page..first_page + count).any(|page| range.contains(page))
        });
        if overlaps {
            self.coordinator.forget_range(&scope);
        }
        debug!(scope = %scope, first_page, count, deselected = changes.len(), "range cleared");
        self.events
            .push_back(ConnectorEvent::PagesInvalidated { scope });
        self.apply_selection(changes);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
