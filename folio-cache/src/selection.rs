//! Selection state, independent of which page currently holds an item.

use folio_core::{Item, ItemKey, SelectionError, SelectionMode, SelectionOrigin};
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::debug;

/// One observable change of selection state.
///
/// Only user-originated changes are reported to the remote side; server
/// and implicit changes only update local state.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionChange {
    pub key: ItemKey,
    pub selected: bool,
    pub origin: SelectionOrigin,
}

impl SelectionChange {
    fn selected(key: ItemKey, origin: SelectionOrigin) -> Self {
        Self {
            key,
            selected: true,
            origin,
        }
    }

    fn deselected(key: ItemKey, origin: SelectionOrigin) -> Self {
        Self {
            key,
            selected: false,
            origin,
        }
    }
}

/// Selected items keyed by item key.
///
/// Holds at most one item in [`SelectionMode::Single`], any number in
/// [`SelectionMode::Multi`] and nothing in [`SelectionMode::None`].
#[derive(Debug, Clone)]
pub struct SelectionTracker {
    mode: SelectionMode,
    selected: BTreeMap<ItemKey, Item>,
    enabled: bool,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::new(SelectionMode::default())
    }
}

impl SelectionTracker {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            selected: BTreeMap::new(),
            enabled: true,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Parse and apply a mode name. An unknown name leaves the mode unchanged.
    pub fn set_mode_str(&mut self, mode: &str) -> Result<Vec<SelectionChange>, SelectionError> {
        let mode = SelectionMode::from_str(mode)?;
        Ok(self.set_mode(mode))
    }

    /// Switch modes. The selection is cleared on every mode change.
    pub fn set_mode(&mut self, mode: SelectionMode) -> Vec<SelectionChange> {
        debug!(from = %self.mode, to = %mode, "selection mode changed");
        self.mode = mode;
        self.clear(SelectionOrigin::Server)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A disabled widget ignores user-originated selection.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_selected(&self, key: &ItemKey) -> bool {
        self.selected.contains_key(key)
    }

    pub fn get(&self, key: &ItemKey) -> Option<&Item> {
        self.selected.get(key)
    }

    pub fn selected_items(&self) -> impl Iterator<Item = &Item> {
        self.selected.values()
    }

    pub fn selected_keys(&self) -> impl Iterator<Item = &ItemKey> {
        self.selected.keys()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    fn accepts(&self, origin: SelectionOrigin) -> bool {
        !(origin.is_user() && !self.enabled)
    }

    /// Select `item`.
    ///
    /// In single mode the previous selection is dropped first; those implicit
    /// deselections carry [`SelectionOrigin::Server`] since the remote side
    /// applies the same rule itself. Re-selecting a selected item only
    /// refreshes the stored record.
    pub fn select(&mut self, mut item: Item, origin: SelectionOrigin) -> Vec<SelectionChange> {
        if self.mode == SelectionMode::None || !self.accepts(origin) {
            return Vec::new();
        }

        item.selected = true;
        if let Some(existing) = self.selected.get_mut(&item.key) {
            *existing = item;
            return Vec::new();
        }

        let mut changes = Vec::new();
        if self.mode == SelectionMode::Single {
            changes.extend(self.clear(SelectionOrigin::Server));
        }

        let key = item.key.clone();
        self.selected.insert(key.clone(), item);
        changes.push(SelectionChange::selected(key, origin));
        changes
    }

    /// Deselect the item with `key`, if selected.
    pub fn deselect(&mut self, key: &ItemKey, origin: SelectionOrigin) -> Option<SelectionChange> {
        if self.mode == SelectionMode::None || !self.accepts(origin) {
            return None;
        }
        self.selected
            .remove(key)
            .map(|_| SelectionChange::deselected(key.clone(), origin))
    }

    /// Flip the selection state of `item`.
    pub fn toggle(&mut self, item: Item, origin: SelectionOrigin) -> Vec<SelectionChange> {
        if self.is_selected(&item.key) {
            self.deselect(&item.key, origin).into_iter().collect()
        } else {
            self.select(item, origin)
        }
    }

    /// Drop every selected item.
    pub fn clear(&mut self, origin: SelectionOrigin) -> Vec<SelectionChange> {
        std::mem::take(&mut self.selected)
            .into_keys()
            .map(|key| SelectionChange::deselected(key, origin))
            .collect()
    }

    /// Reconcile freshly written items with the selection.
    ///
    /// A selected key has its stored record refreshed and the incoming item
    /// forced to `selected = true`. An incoming item flagged `selected` that
    /// is not yet selected gets selected programmatically.
    pub fn reconcile(&mut self, items: &mut [Item]) -> Vec<SelectionChange> {
        let mut changes = Vec::new();
        for item in items.iter_mut() {
            if let Some(existing) = self.selected.get_mut(&item.key) {
                item.selected = true;
                *existing = item.clone();
            } else if item.selected {
                changes.extend(self.select(item.clone(), SelectionOrigin::Server));
                // A mode of NONE keeps nothing; the flag must not claim otherwise
                item.selected = self.selected.contains_key(&item.key);
            }
        }
        changes
    }
}

// =============================================================================
// TESTS
// =============================================================================
