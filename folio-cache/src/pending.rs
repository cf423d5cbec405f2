//! Outstanding page requests from the widget.
//!
//! Every registered callback is resolved exactly once. Registry operations
//! never invoke callbacks; they hand back [`Resolution`]s for the owner to
//! fire after its own maps are consistent.

use crate::page_cache::PageCache;
use folio_core::{PageContent, PageDelivery, RequestedRange, ScopeKey};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, trace};

/// Receives the result of one page request.
pub type PageCallback = Box<dyn FnOnce(PageDelivery) + Send>;

/// A callback paired with the delivery it is owed.
pub struct Resolution {
    callback: PageCallback,
    delivery: PageDelivery,
}

impl Resolution {
    pub fn new(callback: PageCallback, delivery: PageDelivery) -> Self {
        Self { callback, delivery }
    }

    pub fn delivery(&self) -> &PageDelivery {
        &self.delivery
    }

    pub fn delivery_mut(&mut self) -> &mut PageDelivery {
        &mut self.delivery
    }

    /// Invoke the callback.
    pub fn fire(self) {
        (self.callback)(self.delivery)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

/// Callbacks waiting on one `(scope, page)`. The last one is the active
/// registration; earlier ones were superseded but are still owed a result.
struct Waiters(Vec<PageCallback>);

impl Waiters {
    fn resolve(self, delivery: PageDelivery, out: &mut Vec<Resolution>) {
        for callback in self.0 {
            out.push(Resolution::new(callback, delivery.clone()));
        }
    }
}

#[derive(Default)]
pub struct PendingCallbackRegistry {
    pending: HashMap<ScopeKey, BTreeMap<usize, Waiters>>,
}

impl fmt::Debug for PendingCallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (scope, pages) in &self.pending {
            map.entry(scope, &pages.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl PendingCallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` as the active request for `(scope, page)`.
    /// Returns `true` when an earlier registration was superseded.
    pub fn register(&mut self, scope: ScopeKey, page: usize, callback: PageCallback) -> bool {
        let waiters = self
            .pending
            .entry(scope)
            .or_default()
            .entry(page)
            .or_insert_with(|| Waiters(Vec::new()));
        waiters.0.push(callback);
        waiters.0.len() > 1
    }

    pub fn is_pending(&self, scope: &ScopeKey, page: usize) -> bool {
        self.pending
            .get(scope)
            .is_some_and(|pages| pages.contains_key(&page))
    }

    /// Pending pages of `scope`, ascending.
    pub fn pending_pages(&self, scope: &ScopeKey) -> Vec<usize> {
        self.pending
            .get(scope)
            .map(|pages| pages.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopeKey> {
        self.pending.keys()
    }

    /// Number of pending `(scope, page)` entries.
    pub fn len(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }

    /// Number of callbacks still owed a result, superseded ones included.
    pub fn callback_count(&self) -> usize {
        self.pending
            .values()
            .flat_map(BTreeMap::values)
            .map(|waiters| waiters.0.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.values().all(BTreeMap::is_empty)
    }

    fn take(&mut self, scope: &ScopeKey, page: usize) -> Option<Waiters> {
        let pages = self.pending.get_mut(scope)?;
        let waiters = pages.remove(&page);
        if pages.is_empty() {
            self.pending.remove(scope);
        }
        waiters
    }

    /// Resolve every callback waiting on `(scope, page)` with `content`.
    pub fn resolve(
        &mut self,
        scope: &ScopeKey,
        page: usize,
        content: PageContent,
        size: Option<usize>,
    ) -> Vec<Resolution> {
        let mut out = Vec::new();
        if let Some(waiters) = self.take(scope, page) {
            waiters.resolve(
                PageDelivery {
                    scope: scope.clone(),
                    page,
                    content,
                    size,
                },
                &mut out,
            );
        }
        out
    }

    /// Resolve every satisfiable request of `scope` after a confirmed batch.
    ///
    /// A page is satisfiable when it is cached (resolved with its items) or
    /// when it lies outside `range` (resolved with a placeholder of
    /// `placeholder_len` slots, since no data is coming for it). A missing
    /// range counts as `[0, 0]`.
    pub fn flush_scope(
        &mut self,
        scope: &ScopeKey,
        cache: &PageCache,
        range: Option<RequestedRange>,
        known_size: Option<usize>,
        placeholder_len: usize,
    ) -> Vec<Resolution> {
        let range = range.unwrap_or(RequestedRange::new(0, 0));
        let mut out = Vec::new();

        for page in self.pending_pages(scope) {
            let content = match cache.entry(scope, page) {
                Some(cached) => PageContent::Loaded(cached.items.clone()),
                None if !range.contains(page) => PageContent::Placeholder(placeholder_len),
                None => continue,
            };
            if let Some(waiters) = self.take(scope, page) {
                trace!(scope = %scope, page, loaded = content.is_loaded(), "pending page flushed");
                waiters.resolve(
                    PageDelivery {
                        scope: scope.clone(),
                        page,
                        content,
                        size: known_size,
                    },
                    &mut out,
                );
            }
        }
        out
    }

    /// Teardown of one scope: resolve everything with empty results.
    pub fn drain_scope(&mut self, scope: &ScopeKey) -> Vec<Resolution> {
        let mut out = Vec::new();
        if let Some(pages) = self.pending.remove(scope) {
            for (page, waiters) in pages {
                waiters.resolve(PageDelivery::empty(scope.clone(), page, Some(0)), &mut out);
            }
        }
        out
    }

    /// Teardown of everything: resolve every callback with an empty result.
    pub fn drain_all(&mut self) -> Vec<Resolution> {
        let scopes: Vec<ScopeKey> = self.pending.keys().cloned().collect();
        let out: Vec<Resolution> = scopes
            .iter()
            .flat_map(|scope| self.drain_scope(scope))
            .collect();
        if !out.is_empty() {
            debug!(resolved = out.len(), "pending callbacks drained");
        }
        out
    }

    /// Keep the pending pages of `scope` within `max_active_range` item slots.
    ///
    /// While over the cap, the pending page farthest from `newest_page` is
    /// resolved with an empty result. On equal distance the later page goes
    /// first.
    pub fn enforce_cap(
        &mut self,
        scope: &ScopeKey,
        newest_page: usize,
        page_size: usize,
        max_active_range: usize,
    ) -> Vec<Resolution> {
        let mut out = Vec::new();
        loop {
            let pages = self.pending_pages(scope);
            if pages.len() * page_size <= max_active_range || pages.len() <= 1 {
                break;
            }
            let Some(farthest) = pages
                .into_iter()
                .filter(|page| *page != newest_page)
                .max_by_key(|page| (page.abs_diff(newest_page), *page))
            else {
                break;
            };
            debug!(scope = %scope, page = farthest, newest_page, "pending page evicted by active range cap");
            if let Some(waiters) = self.take(scope, farthest) {
                waiters.resolve(PageDelivery::empty(scope.clone(), farthest, None), &mut out);
            }
        }
        out
    }
}

// =============================================================================
// TESTS
// =============================================================================
