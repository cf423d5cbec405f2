//! FOLIO Test Utilities
//!
//! Shared test infrastructure for the FOLIO workspace:
//! - Proptest generators for keys, items, filters and configs
//! - Fixtures for server messages and connector configs
//! - [`DeliveryProbe`] for capturing page callback results
//! - Custom assertions for deliveries and errors

pub use folio_cache::PageCallback;
pub use folio_core::{
    BatchId, CacheError, ConnectorConfig, FilterToken, FolioError, FolioResult, Item, ItemKey,
    PageContent, PageDelivery, ScopeKey, ServerMessage,
};

use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// DELIVERY PROBE
// ============================================================================

/// Records every delivery handed to the callbacks it creates.
#[derive(Debug, Clone, Default)]
pub struct DeliveryProbe {
    deliveries: Arc<Mutex<Vec<PageDelivery>>>,
}

impl DeliveryProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page callback that appends to this probe.
    pub fn callback(&self) -> PageCallback {
        let deliveries = Arc::clone(&self.deliveries);
        Box::new(move |delivery| {
            deliveries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(delivery);
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PageDelivery>> {
        self.deliveries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn deliveries(&self) -> Vec<PageDelivery> {
        self.lock().clone()
    }

    pub fn last(&self) -> Option<PageDelivery> {
        self.lock().last().cloned()
    }

    /// Deliveries for `(scope, page)`, in arrival order.
    pub fn for_page(&self, scope: &ScopeKey, page: usize) -> Vec<PageDelivery> {
        self.lock()
            .iter()
            .filter(|d| &d.scope == scope && d.page == page)
            .cloned()
            .collect()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for FOLIO types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_item_key() -> impl Strategy<Value = ItemKey> {
        "[a-z]{1,3}-[0-9]{1,4}".prop_map(ItemKey::from)
    }

    pub fn arb_item() -> impl Strategy<Value = Item> {
        (arb_item_key(), any::<bool>(), any::<bool>()).prop_map(|(key, selected, details)| {
            Item::new(key)
                .with_selected(selected)
                .with_details_opened(details)
        })
    }

    /// `count` items with distinct keys `p-0..p-{count}`.
    pub fn arb_item_run(max: usize) -> impl Strategy<Value = Vec<Item>> {
        (0..=max).prop_map(|count| fixtures::labelled_items("p", count))
    }

    pub fn arb_page_size() -> impl Strategy<Value = usize> {
        prop_oneof![Just(1usize), Just(10), Just(20), Just(50), 2usize..100]
    }

    pub fn arb_filter_token() -> impl Strategy<Value = FilterToken> {
        prop_oneof![Just(FilterToken::none()), "[a-z ]{1,6}".prop_map(FilterToken::from)]
    }

    pub fn arb_scope_key() -> impl Strategy<Value = ScopeKey> {
        prop_oneof![Just(ScopeKey::Root), arb_item_key().prop_map(ScopeKey::Parent)]
    }

    /// Configs that pass validation, with every timer disabled.
    pub fn arb_valid_config() -> impl Strategy<Value = ConnectorConfig> {
        (arb_page_size(), 1usize..40).prop_map(|(page_size, batch_max)| {
            fixtures::immediate_config(page_size).with_parent_request_batch_max(batch_max)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made configs, items and server messages.

    use super::*;
    use std::time::Duration;

    /// Defaults for `page_size`, with child requests and sub-cache
    /// materialization sent immediately.
    pub fn immediate_config(page_size: usize) -> ConnectorConfig {
        ConnectorConfig::with_page_size(page_size)
            .with_parent_request_delay(Duration::ZERO)
            .with_ensure_subcache_delay(Duration::ZERO)
    }

    /// Items keyed `{prefix}-N`, labelled `{prefix} N`.
    pub fn labelled_items(prefix: &str, count: usize) -> Vec<Item> {
        (0..count)
            .map(|i| {
                Item::new(format!("{prefix}-{i}"))
                    .with_data(serde_json::json!({ "label": format!("{prefix} {i}") }))
            })
            .collect()
    }

    /// Children of `parent`, keyed `{parent}/N`.
    pub fn child_items(parent: &str, count: usize) -> Vec<Item> {
        (0..count)
            .map(|i| Item::new(format!("{parent}/{i}")).with_parent(parent))
            .collect()
    }

    pub fn size_update(size: usize) -> ServerMessage {
        ServerMessage::SizeUpdate {
            parent_key: None,
            size,
        }
    }

    pub fn root_page(start_index: usize, items: Vec<Item>, filter: &str) -> ServerMessage {
        ServerMessage::PageData {
            start_index,
            items,
            parent_key: None,
            filter: Some(FilterToken::from(filter)),
        }
    }

    pub fn child_page(parent: &str, start_index: usize, items: Vec<Item>) -> ServerMessage {
        ServerMessage::PageData {
            start_index,
            items,
            parent_key: Some(ItemKey::from(parent)),
            filter: None,
        }
    }

    pub fn root_confirm(batch: u64, filter: &str) -> ServerMessage {
        ServerMessage::BatchConfirmed {
            batch_id: BatchId(batch),
            parent_key: None,
            filter: Some(FilterToken::from(filter)),
            level_size: None,
        }
    }

    pub fn child_confirm(batch: u64, parent: &str, level_size: usize) -> ServerMessage {
        ServerMessage::BatchConfirmed {
            batch_id: BatchId(batch),
            parent_key: Some(ItemKey::from(parent)),
            filter: None,
            level_size: Some(level_size),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for FOLIO-specific validation.

    use super::*;

    /// Assert that a delivery carries exactly `count` loaded items.
    #[track_caller]
    pub fn assert_loaded(delivery: &PageDelivery, count: usize) {
        match &delivery.content {
            PageContent::Loaded(items) => assert_eq!(
                items.len(),
                count,
                "Wrong item count for page {} of {}",
                delivery.page,
                delivery.scope
            ),
            other => panic!("Expected loaded page, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_empty(delivery: &PageDelivery) {
        assert_eq!(
            delivery.content,
            PageContent::Empty,
            "Expected empty delivery for page {} of {}",
            delivery.page,
            delivery.scope
        );
    }

    #[track_caller]
    pub fn assert_placeholder(delivery: &PageDelivery, slots: usize) {
        assert_eq!(delivery.content, PageContent::Placeholder(slots));
    }

    /// Assert that every key in `keys` appears in the delivered items, in order.
    #[track_caller]
    pub fn assert_keys(delivery: &PageDelivery, keys: &[&str]) {
        let got: Vec<&str> = delivery.items().iter().map(|i| i.key.as_str()).collect();
        assert_eq!(got, keys);
    }

    #[track_caller]
    pub fn assert_misaligned<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Cache(CacheError::Misaligned { .. })) => {}
            other => panic!("Expected Misaligned error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_selection_error<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Selection(_)) => {}
            other => panic!("Expected Selection error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &FolioResult<T>) {
        match result {
            Err(FolioError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_records_deliveries() {
        let probe = DeliveryProbe::new();
        (probe.callback())(PageDelivery::empty(ScopeKey::Root, 3, None));
        (probe.callback())(PageDelivery::placeholder(ScopeKey::Root, 4, 10, None));
        assert_eq!(probe.len(), 2);
        assert_eq!(probe.for_page(&ScopeKey::Root, 4).len(), 1);
        assertions::assert_placeholder(&probe.last().unwrap(), 10);
    }

    #[test]
    fn test_immediate_config_is_valid() {
        let config = fixtures::immediate_config(20);
        assert!(config.validate().is_ok());
        assert!(config.parent_request_delay().is_none());
        assert!(config.ensure_subcache_delay().is_none());
    }
}
