//! Tree-shaped item cache.
//!
//! Scopes form an arena keyed by [`ScopeKey`]. A node knows its parent scope
//! and the positions of its materialized children; there are no back
//! pointers. Pages for every scope live in one shared [`PageCache`].
//!
//! A flat list is the degenerate case with only the root node.

use crate::page_cache::{ItemLocation, PageCache};
use folio_core::{CacheError, FilterToken, Item, ItemKey, ScopeKey};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// One materialized scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeNode {
    pub parent: Option<ScopeKey>,
    pub depth: usize,
    /// Best-known number of items in the scope.
    pub size: Option<usize>,
    /// Index within this scope → key of the expanded item whose child scope
    /// is materialized.
    pub children: BTreeMap<usize, ItemKey>,
}

impl ScopeNode {
    fn root() -> Self {
        Self {
            parent: None,
            depth: 0,
            size: None,
            children: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct HierarchyCache {
    nodes: HashMap<ScopeKey, ScopeNode>,
    expanded: HashSet<ItemKey>,
    pages: PageCache,
}

impl HierarchyCache {
    pub fn new(page_size: usize) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ScopeKey::Root, ScopeNode::root());
        Self {
            nodes,
            expanded: HashSet::new(),
            pages: PageCache::new(page_size),
        }
    }

    pub fn page_size(&self) -> usize {
        self.pages.page_size()
    }

    pub fn pages(&self) -> &PageCache {
        &self.pages
    }

    pub fn pages_mut(&mut self) -> &mut PageCache {
        &mut self.pages
    }

    pub fn node(&self, scope: &ScopeKey) -> Option<&ScopeNode> {
        self.nodes.get(scope)
    }

    pub fn contains_scope(&self, scope: &ScopeKey) -> bool {
        self.nodes.contains_key(scope)
    }

    pub fn depth(&self, scope: &ScopeKey) -> Option<usize> {
        self.nodes.get(scope).map(|node| node.depth)
    }

    pub fn size(&self, scope: &ScopeKey) -> Option<usize> {
        self.nodes.get(scope).and_then(|node| node.size)
    }

    /// Record the size of a materialized scope. Returns `false` for unknown
    /// scopes, whose sizes are discarded.
    pub fn set_size(&mut self, scope: &ScopeKey, size: usize) -> bool {
        match self.nodes.get_mut(scope) {
            Some(node) => {
                node.size = Some(size);
                true
            }
            None => false,
        }
    }

    /// Materialized scopes, root included.
    pub fn scopes(&self) -> impl Iterator<Item = &ScopeKey> {
        self.nodes.keys()
    }

    pub fn scope_count(&self) -> usize {
        self.nodes.len()
    }

    // -------------------------------------------------------------------------
    // Expansion
    // -------------------------------------------------------------------------

    pub fn is_expanded(&self, key: &ItemKey) -> bool {
        self.expanded.contains(key)
    }

    pub fn expanded_keys(&self) -> impl Iterator<Item = &ItemKey> {
        self.expanded.iter()
    }

    /// Mark `key` expanded. Returns `false` if it already was.
    pub fn expand(&mut self, key: ItemKey) -> bool {
        self.expanded.insert(key)
    }

    /// Collapse `key` and drop its materialized subtree with all pages.
    ///
    /// Returns the removed scopes, deepest last, so callers can forget their
    /// own per-scope state. Expansion flags of descendants are kept so that
    /// re-expanding restores them.
    pub fn collapse(&mut self, key: &ItemKey) -> Vec<ScopeKey> {
        self.expanded.remove(key);
        let scope = ScopeKey::Parent(key.clone());
        let removed = self.remove_subtree(&scope);
        if !removed.is_empty() {
            debug!(key = %key, scopes = removed.len(), "subtree collapsed");
        }
        removed
    }

    /// Forget all expansion state and every non-root scope.
    pub fn clear_expanded(&mut self) -> Vec<ScopeKey> {
        self.expanded.clear();
        self.drop_non_root()
    }

    /// Drop every non-root scope and its pages. Expansion flags survive.
    pub fn ensure_hierarchy(&mut self) -> Vec<ScopeKey> {
        self.drop_non_root()
    }

    fn drop_non_root(&mut self) -> Vec<ScopeKey> {
        let removed: Vec<ScopeKey> = self
            .nodes
            .keys()
            .filter(|scope| !scope.is_root())
            .cloned()
            .collect();
        for scope in &removed {
            self.nodes.remove(scope);
            self.pages.invalidate_scope(scope);
        }
        if let Some(root) = self.nodes.get_mut(&ScopeKey::Root) {
            root.children.clear();
        }
        removed
    }

    fn remove_subtree(&mut self, scope: &ScopeKey) -> Vec<ScopeKey> {
        let Some(node) = self.nodes.remove(scope) else {
            self.pages.invalidate_scope(scope);
            return Vec::new();
        };
        self.pages.invalidate_scope(scope);

        if let Some(parent) = node.parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|_, child| Some(&*child) != scope.parent_key());
        }

        let mut removed = vec![scope.clone()];
        for child in node.children.into_values() {
            removed.extend(self.remove_subtree(&ScopeKey::Parent(child)));
        }
        removed
    }

    /// Drop everything, including the root's pages and size.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.insert(ScopeKey::Root, ScopeNode::root());
        self.expanded.clear();
        self.pages.clear();
    }

    /// Drop all pages but keep the scope structure and sizes.
    pub fn clear_pages(&mut self) {
        self.pages.clear();
    }

    // -------------------------------------------------------------------------
    // Materialization and data
    // -------------------------------------------------------------------------

    /// Create the child scope of the expanded item at `index` of `parent`.
    ///
    /// Returns `None` when the parent scope is unknown, the item is not
    /// cached, or it is not expanded. Materializing twice is harmless.
    pub fn materialize(&mut self, parent: &ScopeKey, index: usize) -> Option<ScopeKey> {
        let key = self.pages.item_at(parent, index)?.key.clone();
        if !self.expanded.contains(&key) {
            return None;
        }
        let parent_depth = self.nodes.get(parent)?.depth;
        let child = ScopeKey::Parent(key.clone());

        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.insert(index, key);
        }
        self.nodes.entry(child.clone()).or_insert_with(|| ScopeNode {
            parent: Some(parent.clone()),
            depth: parent_depth + 1,
            size: None,
            children: BTreeMap::new(),
        });
        Some(child)
    }

    /// Store pages for a materialized scope.
    ///
    /// Data for an unknown scope (never materialized, or collapsed since the
    /// request went out) is discarded and `Ok(None)` returned.
    pub fn put(
        &mut self,
        scope: &ScopeKey,
        first_index: usize,
        items: Vec<Item>,
        filter: &FilterToken,
    ) -> Result<Option<Vec<usize>>, CacheError> {
        if !self.nodes.contains_key(scope) {
            debug!(scope = %scope, "data for unknown scope discarded");
            return Ok(None);
        }
        self.pages.put(scope, first_index, items, filter).map(Some)
    }

    /// Find an item by key: the root's pages first, then each materialized
    /// child in index order.
    pub fn find_by_key(&self, key: &ItemKey) -> Option<ItemLocation> {
        self.find_in(&ScopeKey::Root, key)
    }

    fn find_in(&self, scope: &ScopeKey, key: &ItemKey) -> Option<ItemLocation> {
        if let Some(location) = self.pages.locate_in(scope, key) {
            return Some(location);
        }
        let node = self.nodes.get(scope)?;
        node.children
            .values()
            .find_map(|child| self.find_in(&ScopeKey::Parent(child.clone()), key))
    }

    // -------------------------------------------------------------------------
    // Flattened view
    // -------------------------------------------------------------------------

    /// Items of `scope` plus the effective sizes of its materialized children.
    pub fn effective_size(&self, scope: &ScopeKey) -> usize {
        let Some(node) = self.nodes.get(scope) else {
            return 0;
        };
        node.size.unwrap_or(0)
            + node
                .children
                .values()
                .map(|child| self.effective_size(&ScopeKey::Parent(child.clone())))
                .sum::<usize>()
    }

    /// Map a flattened widget index to `(scope, index within scope)`.
    pub fn locate(&self, flat_index: usize) -> Option<(ScopeKey, usize)> {
        self.locate_in(&ScopeKey::Root, flat_index)
    }

    fn locate_in(&self, scope: &ScopeKey, flat_index: usize) -> Option<(ScopeKey, usize)> {
        let node = self.nodes.get(scope)?;
        // Flat rows consumed by children placed before the cursor
        let mut skipped = 0;
        for (position, child) in &node.children {
            let relative = flat_index - skipped;
            if relative <= *position {
                break;
            }
            let child_scope = ScopeKey::Parent(child.clone());
            let child_size = self.effective_size(&child_scope);
            if relative <= position + child_size {
                return self.locate_in(&child_scope, relative - position - 1);
            }
            skipped += child_size;
        }

        let index = flat_index - skipped;
        match node.size {
            Some(size) if index >= size => None,
            _ => Some((scope.clone(), index)),
        }
    }

    /// Flattened index of `index` within `scope`, if the scope is reachable.
    pub fn flat_index_of(&self, scope: &ScopeKey, index: usize) -> Option<usize> {
        let node = self.nodes.get(scope)?;
        let preceding: usize = node
            .children
            .range(..index)
            .map(|(_, child)| self.effective_size(&ScopeKey::Parent(child.clone())))
            .sum();
        let within = index + preceding;

        match &node.parent {
            None => Some(within),
            Some(parent) => {
                let parent_node = self.nodes.get(parent)?;
                let position = parent_node
                    .children
                    .iter()
                    .find(|(_, child)| Some(*child) == scope.parent_key())
                    .map(|(position, _)| *position)?;
                self.flat_index_of(parent, position)
                    .map(|parent_flat| parent_flat + 1 + within)
            }
        }
    }

    /// Cached item at a flattened index.
    pub fn item_at_flat(&self, flat_index: usize) -> Option<&Item> {
        let (scope, index) = self.locate(flat_index)?;
        self.pages.item_at(&scope, index)
    }
}

// =============================================================================
// TESTS
// =============================================================================
