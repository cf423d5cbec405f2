//! Fetch planning, deduplication and request batching.
//!
//! The coordinator decides which page range to ask the remote for, given the
//! page the widget wants and what the widget currently shows. Child-range
//! requests and sub-cache materialization go through two debounced queues.

use crate::remote::RemoteDataSource;
use crate::schedule::{earliest, ScheduledTask};
use folio_cache::HierarchyCache;
use folio_core::{
    page_of_index, ClientMessage, ConnectorConfig, FilterToken, ItemKey, ParentRange,
    RequestedRange, ScopeKey,
};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Flattened rows the widget currently shows, inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub first_visible: usize,
    pub last_visible: usize,
}

impl Viewport {
    pub fn new(first_visible: usize, last_visible: usize) -> Self {
        Self {
            first_visible: first_visible.min(last_visible),
            last_visible: last_visible.max(first_visible),
        }
    }

    /// One viewport height.
    pub fn buffer(&self) -> usize {
        self.last_visible - self.first_visible
    }

    /// Visible rows widened by one buffer on each side, capped at `total`.
    pub fn buffered(&self, total: usize) -> (usize, usize) {
        let buffer = self.buffer();
        (
            self.first_visible.saturating_sub(buffer),
            (self.last_visible + buffer).min(total),
        )
    }
}

/// A deferred request to materialize the child scope of an expanded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcacheRequest {
    pub parent: ScopeKey,
    pub index: usize,
    pub key: ItemKey,
    pub depth: usize,
}

#[derive(Debug)]
pub struct RequestCoordinator {
    page_size: usize,
    parent_delay: Option<Duration>,
    parent_batch_max: usize,
    subcache_delay: Option<Duration>,
    viewport: Viewport,
    ranges: HashMap<ScopeKey, RequestedRange>,
    subcache_queue: Vec<SubcacheRequest>,
    subcache_timer: ScheduledTask,
    parent_queue: VecDeque<ParentRange>,
    parent_timer: ScheduledTask,
}

impl RequestCoordinator {
    pub fn new(config: &ConnectorConfig) -> Self {
        Self {
            page_size: config.page_size,
            parent_delay: config.parent_request_delay(),
            parent_batch_max: config.parent_request_batch_max,
            subcache_delay: config.ensure_subcache_delay(),
            viewport: Viewport::default(),
            ranges: HashMap::new(),
            subcache_queue: Vec::new(),
            subcache_timer: ScheduledTask::new(),
            parent_queue: VecDeque::new(),
            parent_timer: ScheduledTask::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Last range requested for `scope`.
    pub fn range(&self, scope: &ScopeKey) -> Option<RequestedRange> {
        self.ranges.get(scope).copied()
    }

    // -------------------------------------------------------------------------
    // Range planning
    // -------------------------------------------------------------------------

    /// Pages of `scope` worth fetching when the widget asks for `page`.
    ///
    /// Every buffered row owned by `scope` contributes its page; rows owned
    /// by other scopes are ignored. The root range never extends past
    /// `size / page_size`.
    pub fn plan_range(&self, scope: &ScopeKey, page: usize, tree: &HierarchyCache) -> RequestedRange {
        let total = tree.effective_size(&ScopeKey::Root);
        let (first_needed, last_needed) = self.viewport.buffered(total);

        let mut first = page;
        let mut last = page;
        for flat in first_needed..=last_needed {
            if let Some((owner, index)) = tree.locate(flat) {
                if &owner == scope {
                    let owned = page_of_index(index, self.page_size);
                    first = first.min(owned);
                    last = last.max(owned);
                }
            }
        }

        if scope.is_root() {
            let size = tree.size(&ScopeKey::Root).unwrap_or(0);
            last = last.min(size / self.page_size);
        }
        RequestedRange::new(first.min(last), last)
    }

    /// Request the pages around `page` unless the same range is already
    /// requested. Returns the range when a fetch was issued.
    pub fn fetch_page<R: RemoteDataSource>(
        &mut self,
        scope: &ScopeKey,
        page: usize,
        tree: &HierarchyCache,
        filter: &FilterToken,
        now: Instant,
        remote: &mut R,
    ) -> Option<RequestedRange> {
        let range = self.plan_range(scope, page, tree);
        if self.ranges.get(scope) == Some(&range) {
            trace!(scope = %scope, page, "requested range unchanged, fetch suppressed");
            return None;
        }
        self.issue(scope, range, filter, now, remote);
        Some(range)
    }

    /// Record `range` as requested for `scope` and send it.
    pub fn issue<R: RemoteDataSource>(
        &mut self,
        scope: &ScopeKey,
        range: RequestedRange,
        filter: &FilterToken,
        now: Instant,
        remote: &mut R,
    ) {
        self.ranges.insert(scope.clone(), range);
        let start = range.start_index(self.page_size);
        let count = range.item_count(self.page_size);
        debug!(scope = %scope, start, count, filter = %filter, "fetch issued");

        match scope {
            ScopeKey::Root => remote.send(ClientMessage::SetRequestedRange {
                start,
                count,
                filter: filter.clone(),
            }),
            ScopeKey::Parent(parent_key) => self.enqueue_parent(
                ParentRange {
                    first_index: start,
                    size: count,
                    parent_key: parent_key.clone(),
                    filter: filter.clone(),
                },
                now,
                remote,
            ),
        }
    }

    pub fn forget_range(&mut self, scope: &ScopeKey) {
        self.ranges.remove(scope);
    }

    pub fn clear_ranges(&mut self) {
        self.ranges.clear();
    }

    // -------------------------------------------------------------------------
    // Parent request queue
    // -------------------------------------------------------------------------

    fn enqueue_parent<R: RemoteDataSource>(&mut self, range: ParentRange, now: Instant, remote: &mut R) {
        match self.parent_delay {
            None => remote.send(ClientMessage::SetParentRequestedRange {
                first_index: range.first_index,
                size: range.size,
                parent_key: range.parent_key,
                filter: range.filter,
            }),
            Some(delay) => {
                self.parent_queue.push_back(range);
                self.parent_timer.schedule_if_idle(now, delay);
            }
        }
    }

    /// Send one batch of queued child ranges if the timer is due.
    pub fn poll_parents<R: RemoteDataSource>(&mut self, now: Instant, remote: &mut R) {
        if !self.parent_timer.take_if_due(now) {
            return;
        }
        let take = self.parent_batch_max.min(self.parent_queue.len());
        let ranges: Vec<ParentRange> = self.parent_queue.drain(..take).collect();
        if !ranges.is_empty() {
            debug!(batch = ranges.len(), queued = self.parent_queue.len(), "parent requests flushed");
            remote.send(ClientMessage::SetParentRequestedRanges { ranges });
        }
        if let (false, Some(delay)) = (self.parent_queue.is_empty(), self.parent_delay) {
            self.parent_timer.schedule(now, delay);
        }
    }

    pub fn queued_parent_requests(&self) -> impl Iterator<Item = &ParentRange> {
        self.parent_queue.iter()
    }

    // -------------------------------------------------------------------------
    // Sub-cache queue
    // -------------------------------------------------------------------------

    /// Whether sub-cache materialization is deferred at all.
    pub fn defers_subcaches(&self) -> bool {
        self.subcache_delay.is_some()
    }

    /// Queue a sub-cache request, kept sorted by `(index, depth)`.
    pub fn enqueue_subcache(&mut self, request: SubcacheRequest, now: Instant) {
        let Some(delay) = self.subcache_delay else {
            return;
        };
        if self.subcache_queue.iter().any(|queued| queued.key == request.key) {
            return;
        }
        self.subcache_queue.push(request);
        self.subcache_queue.sort_by_key(|queued| (queued.index, queued.depth));
        self.subcache_timer.schedule_if_idle(now, delay);
    }

    /// Pop queued requests until one is still dispatchable.
    ///
    /// A request is dispatchable while its item sits inside the buffered
    /// viewport and is still expanded. Others are dropped for good.
    pub fn poll_subcache(&mut self, now: Instant, tree: &HierarchyCache) -> Option<SubcacheRequest> {
        if !self.subcache_timer.take_if_due(now) {
            return None;
        }
        while !self.subcache_queue.is_empty() {
            let head = self.subcache_queue.remove(0);
            if self.is_dispatchable(&head, tree) {
                if let (false, Some(delay)) = (self.subcache_queue.is_empty(), self.subcache_delay) {
                    self.subcache_timer.schedule(now, delay);
                }
                return Some(head);
            }
            trace!(key = %head.key, "sub-cache request dropped, no longer visible or expanded");
        }
        None
    }

    fn is_dispatchable(&self, request: &SubcacheRequest, tree: &HierarchyCache) -> bool {
        if !tree.is_expanded(&request.key) {
            return false;
        }
        let Some(location) = tree.pages().locate_in(&request.parent, &request.key) else {
            return false;
        };
        let Some(flat) = tree.flat_index_of(&request.parent, location.index_in_scope(self.page_size))
        else {
            return false;
        };
        let (first, last) = self.viewport.buffered(tree.effective_size(&ScopeKey::Root));
        (first..=last).contains(&flat)
    }

    pub fn queued_subcache_requests(&self) -> impl Iterator<Item = &SubcacheRequest> {
        self.subcache_queue.iter()
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Forget everything about a removed scope: its requested range, queued
    /// child requests for it, and queued sub-cache requests in or for it.
    pub fn forget_scope(&mut self, scope: &ScopeKey) {
        self.ranges.remove(scope);
        let parent_key = scope.parent_key();
        self.parent_queue
            .retain(|range| Some(&range.parent_key) != parent_key);
        self.subcache_queue
            .retain(|request| &request.parent != scope && Some(&request.key) != parent_key);
        if self.parent_queue.is_empty() {
            self.parent_timer.cancel();
        }
        if self.subcache_queue.is_empty() {
            self.subcache_timer.cancel();
        }
    }

    /// Drop both queues and their timers.
    pub fn clear_queues(&mut self) {
        self.parent_queue.clear();
        self.parent_timer.cancel();
        self.subcache_queue.clear();
        self.subcache_timer.cancel();
    }

    pub fn reset(&mut self) {
        self.clear_ranges();
        self.clear_queues();
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([self.parent_timer.deadline(), self.subcache_timer.deadline()])
    }
}

// =============================================================================
// TESTS
// =============================================================================
