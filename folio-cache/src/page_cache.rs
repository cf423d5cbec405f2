//! Page-aligned item cache.
//!
//! Pages are keyed by `(scope, page)`. Each entry remembers the filter token
//! it was fetched under so a read can insist on matching the current one.

use crate::selection::{SelectionChange, SelectionTracker};
use folio_core::{
    first_index_of_page, is_page_aligned, page_of_index, CacheError, FilterToken, Item, ItemKey,
    ScopeKey, SelectionOrigin,
};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// One stored page.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPage {
    pub items: Vec<Item>,
    /// Filter token the page was fetched under.
    pub filter: FilterToken,
}

/// Where a cached item lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLocation {
    pub scope: ScopeKey,
    pub page: usize,
    /// Position within the page.
    pub index: usize,
}

impl ItemLocation {
    /// Index of the item within its scope.
    pub fn index_in_scope(&self, page_size: usize) -> usize {
        first_index_of_page(self.page, page_size) + self.index
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups answered from the cache.
    pub hits: u64,
    /// Number of lookups that found nothing usable.
    pub misses: u64,
    /// Number of pages currently cached.
    pub page_count: u64,
    /// Number of pages dropped by invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Fetched pages for every scope.
#[derive(Debug)]
pub struct PageCache {
    page_size: usize,
    scopes: HashMap<ScopeKey, BTreeMap<usize, CachedPage>>,
    hits: Cell<u64>,
    misses: Cell<u64>,
    invalidations: u64,
}

impl PageCache {
    pub fn new(page_size: usize) -> Self {
        debug_assert!(page_size > 0, "page size must be positive");
        Self {
            page_size,
            scopes: HashMap::new(),
            hits: Cell::new(0),
            misses: Cell::new(0),
            invalidations: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Store `items` starting at the page-aligned `first_index` of `scope`.
    ///
    /// Items spanning several pages are split into page-sized slices, each
    /// overwriting whatever was there. An empty `items` stores an empty page
    /// at `first_index`. Returns the pages written.
    pub fn put(
        &mut self,
        scope: &ScopeKey,
        first_index: usize,
        items: Vec<Item>,
        filter: &FilterToken,
    ) -> Result<Vec<usize>, CacheError> {
        if !is_page_aligned(first_index, self.page_size) {
            return Err(CacheError::Misaligned {
                scope: scope.clone(),
                index: first_index,
                page_size: self.page_size,
            });
        }

        let first_page = page_of_index(first_index, self.page_size);
        let pages = self.scopes.entry(scope.clone()).or_default();

        if items.is_empty() {
            pages.insert(
                first_page,
                CachedPage {
                    items,
                    filter: filter.clone(),
                },
            );
            return Ok(vec![first_page]);
        }

        let mut written = Vec::new();
        let mut items = items.into_iter().peekable();
        let mut page = first_page;
        while items.peek().is_some() {
            let slice: Vec<Item> = items.by_ref().take(self.page_size).collect();
            pages.insert(
                page,
                CachedPage {
                    items: slice,
                    filter: filter.clone(),
                },
            );
            written.push(page);
            page += 1;
        }

        trace!(scope = %scope, first_page, pages = written.len(), "pages stored");
        Ok(written)
    }

    /// Items of a cached page, regardless of the filter it was fetched under.
    pub fn get(&self, scope: &ScopeKey, page: usize) -> Option<&[Item]> {
        let found = self.entry(scope, page).map(|p| p.items.as_slice());
        self.record(found.is_some());
        found
    }

    /// Items of a cached page fetched under `filter`.
    pub fn get_fresh(&self, scope: &ScopeKey, page: usize, filter: &FilterToken) -> Option<&[Item]> {
        let found = self
            .entry(scope, page)
            .filter(|p| &p.filter == filter)
            .map(|p| p.items.as_slice());
        self.record(found.is_some());
        found
    }

    /// Page entry without touching statistics.
    pub fn entry(&self, scope: &ScopeKey, page: usize) -> Option<&CachedPage> {
        self.scopes.get(scope).and_then(|pages| pages.get(&page))
    }

    pub fn contains(&self, scope: &ScopeKey, page: usize) -> bool {
        self.entry(scope, page).is_some()
    }

    /// Item at `index` within `scope`, if its page is cached.
    pub fn item_at(&self, scope: &ScopeKey, index: usize) -> Option<&Item> {
        let page = page_of_index(index, self.page_size);
        self.entry(scope, page)
            .and_then(|p| p.items.get(index - first_index_of_page(page, self.page_size)))
    }

    fn record(&self, hit: bool) {
        if hit {
            self.hits.set(self.hits.get() + 1);
        } else {
            self.misses.set(self.misses.get() + 1);
        }
    }

    /// Drop `count` pages of `scope` starting at `first_page`.
    ///
    /// Removed items that are currently selected get deselected
    /// programmatically.
    pub fn invalidate_range(
        &mut self,
        scope: &ScopeKey,
        first_page: usize,
        count: usize,
        selection: &mut SelectionTracker,
    ) -> Vec<SelectionChange> {
        let Some(pages) = self.scopes.get_mut(scope) else {
            return Vec::new();
        };

        let mut changes = Vec::new();
        for page in first_page..first_page + count {
            if let Some(removed) = pages.remove(&page) {
                self.invalidations += 1;
                for item in &removed.items {
                    changes.extend(selection.deselect(&item.key, SelectionOrigin::Server));
                }
            }
        }
        changes
    }

    /// Drop every page of `scope`. Returns the number of pages dropped.
    pub fn invalidate_scope(&mut self, scope: &ScopeKey) -> usize {
        let dropped = self.scopes.remove(scope).map_or(0, |pages| pages.len());
        self.invalidations += dropped as u64;
        dropped
    }

    /// Drop every page of every scope.
    pub fn clear(&mut self) {
        self.invalidations += self.page_count() as u64;
        self.scopes.clear();
    }

    /// Find a cached item by key in any scope.
    pub fn locate(&self, key: &ItemKey) -> Option<ItemLocation> {
        self.scopes
            .keys()
            .find_map(|scope| self.locate_in(scope, key))
    }

    /// Find a cached item by key within one scope.
    pub fn locate_in(&self, scope: &ScopeKey, key: &ItemKey) -> Option<ItemLocation> {
        let pages = self.scopes.get(scope)?;
        pages.iter().find_map(|(page, cached)| {
            cached
                .items
                .iter()
                .position(|item| &item.key == key)
                .map(|index| ItemLocation {
                    scope: scope.clone(),
                    page: *page,
                    index,
                })
        })
    }

    /// Replace cached records by key, in place.
    ///
    /// Items that are not cached are ignored. Returns each touched
    /// `(scope, page)` once.
    pub fn update_items(&mut self, items: &[Item]) -> Vec<(ScopeKey, usize)> {
        let mut touched = BTreeSet::new();
        for item in items {
            let location = match &item.parent_key {
                Some(parent) => self.locate_in(&ScopeKey::Parent(parent.clone()), &item.key),
                None => self.locate(&item.key),
            };
            let Some(location) = location else {
                continue;
            };
            if let Some(slot) = self
                .scopes
                .get_mut(&location.scope)
                .and_then(|pages| pages.get_mut(&location.page))
                .and_then(|page| page.items.get_mut(location.index))
            {
                *slot = item.clone();
                touched.insert((location.scope, location.page));
            }
        }
        touched.into_iter().collect()
    }

    /// Mutable access to a cached page's items.
    pub fn items_mut(&mut self, scope: &ScopeKey, page: usize) -> Option<&mut Vec<Item>> {
        self.scopes
            .get_mut(scope)
            .and_then(|pages| pages.get_mut(&page))
            .map(|p| &mut p.items)
    }

    /// Cached pages of `scope`, in page order.
    pub fn pages(&self, scope: &ScopeKey) -> impl Iterator<Item = (usize, &CachedPage)> {
        self.scopes
            .get(scope)
            .into_iter()
            .flat_map(|pages| pages.iter().map(|(page, cached)| (*page, cached)))
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopeKey> {
        self.scopes.keys()
    }

    pub fn scope_page_count(&self, scope: &ScopeKey) -> usize {
        self.scopes.get(scope).map_or(0, BTreeMap::len)
    }

    pub fn page_count(&self) -> usize {
        self.scopes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.values().all(BTreeMap::is_empty)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
            page_count: self.page_count() as u64,
            invalidations: self.invalidations,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::SelectionMode;

    fn items(prefix: &str, n: usize) -> Vec<Item> {
        (0..n).map(|i| Item::new(format!("{prefix}{i}"))).collect()
    }

    #[test]
    fn test_put_splits_into_pages() {
        let mut cache = PageCache::new(10);
        let written = cache
            .put(&ScopeKey::Root, 20, items("r", 25), &FilterToken::none())
            .unwrap();
        assert_eq!(written, vec![2, 3, 4]);
        assert_eq!(cache.get(&ScopeKey::Root, 2).unwrap().len(), 10);
        assert_eq!(cache.get(&ScopeKey::Root, 4).unwrap().len(), 5);
        assert_eq!(cache.get(&ScopeKey::Root, 3).unwrap()[0].key.as_str(), "r10");
    }

    #[test]
    fn test_unaligned_put_leaves_cache_unchanged() {
        let mut cache = PageCache::new(10);
        let err = cache
            .put(&ScopeKey::Root, 5, items("r", 3), &FilterToken::none())
            .unwrap_err();
        assert!(matches!(err, CacheError::Misaligned { index: 5, .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_empty_put_stores_empty_page() {
        let mut cache = PageCache::new(10);
        cache
            .put(&ScopeKey::Root, 0, Vec::new(), &FilterToken::from("zz"))
            .unwrap();
        assert_eq!(cache.get(&ScopeKey::Root, 0), Some(&[][..]));
    }

    #[test]
    fn test_get_fresh_requires_matching_filter() {
        let mut cache = PageCache::new(10);
        cache
            .put(&ScopeKey::Root, 0, items("r", 3), &FilterToken::from("a"))
            .unwrap();
        assert!(cache.get_fresh(&ScopeKey::Root, 0, &FilterToken::from("a")).is_some());
        assert!(cache.get_fresh(&ScopeKey::Root, 0, &FilterToken::from("ab")).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalidate_range_deselects_removed_items() {
        let mut cache = PageCache::new(2);
        let mut selection = SelectionTracker::new(SelectionMode::Multi);
        cache
            .put(&ScopeKey::Root, 0, items("r", 6), &FilterToken::none())
            .unwrap();
        selection.select(Item::new("r3"), SelectionOrigin::User);
        selection.select(Item::new("r5"), SelectionOrigin::User);

        let changes = cache.invalidate_range(&ScopeKey::Root, 1, 1, &mut selection);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].key.as_str(), "r3");
        assert_eq!(changes[0].origin, SelectionOrigin::Server);
        assert!(!cache.contains(&ScopeKey::Root, 1));
        assert!(cache.contains(&ScopeKey::Root, 2));
        assert!(selection.is_selected(&ItemKey::from("r5")));
    }

    #[test]
    fn test_invalidate_scope_and_clear() {
        let mut cache = PageCache::new(5);
        let child = ScopeKey::parent("p");
        cache
            .put(&ScopeKey::Root, 0, items("r", 5), &FilterToken::none())
            .unwrap();
        cache.put(&child, 0, items("c", 7), &FilterToken::none()).unwrap();

        assert_eq!(cache.invalidate_scope(&child), 2);
        assert_eq!(cache.page_count(), 1);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 3);
    }

    #[test]
    fn test_locate_and_update_items() {
        let mut cache = PageCache::new(4);
        let child = ScopeKey::parent("p");
        cache
            .put(&ScopeKey::Root, 0, items("r", 6), &FilterToken::none())
            .unwrap();
        cache.put(&child, 0, items("c", 2), &FilterToken::none()).unwrap();

        let location = cache.locate(&ItemKey::from("r5")).unwrap();
        assert_eq!(location.page, 1);
        assert_eq!(location.index, 1);
        assert_eq!(location.index_in_scope(4), 5);

        let touched = cache.update_items(&[
            Item::new("r5").with_data(serde_json::json!({"label": "new"})),
            Item::new("c1").with_parent("p"),
            Item::new("missing"),
        ]);
        assert_eq!(touched.len(), 2);
        assert_eq!(cache.item_at(&ScopeKey::Root, 5).and_then(Item::label), Some("new"));
    }
}
