//! Details-row state.

use folio_core::{ClientMessage, Item, ItemKey};
use std::collections::BTreeSet;

/// Keys whose details row is open, as last reported by the remote side.
#[derive(Debug, Clone, Default)]
pub struct DetailsTracker {
    opened: BTreeSet<ItemKey>,
}

impl DetailsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, key: &ItemKey) -> bool {
        self.opened.contains(key)
    }

    pub fn opened(&self) -> impl Iterator<Item = &ItemKey> {
        self.opened.iter()
    }

    /// Follow the `details_opened` flags of written items.
    /// Returns `(key, opened)` for every key whose state flipped.
    pub fn reconcile(&mut self, items: &[Item]) -> Vec<(ItemKey, bool)> {
        let mut changed = Vec::new();
        for item in items {
            let flipped = if item.details_opened {
                self.opened.insert(item.key.clone())
            } else {
                self.opened.remove(&item.key)
            };
            if flipped {
                changed.push((item.key.clone(), item.details_opened));
            }
        }
        changed
    }

    /// Request for the remote side when `item` is activated: open its
    /// details, or close whatever is open when it already shows them.
    pub fn toggle_request(&self, item: &Item) -> ClientMessage {
        let open = item.details_opened || self.is_open(&item.key);
        ClientMessage::SetDetailsVisible {
            key: (!open).then(|| item.key.clone()),
        }
    }

    pub fn clear(&mut self) {
        self.opened.clear();
    }
}
