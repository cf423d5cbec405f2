//! Property-Based Tests for the sync controller
//!
//! Properties:
//! - Miss, fetch, data and confirm resolve a page with its items and size
//! - Identical page requests without new data issue one fetch
//! - Reset resolves every pending callback and empties every cache
//! - Single selection replaces, multi selection accumulates
//! - A filter change discards in-flight responses and fetches once after
//!   the debounce window
//! - Collapse removes the sub-cache and its queued sub-fetches, and late
//!   responses repopulate nothing
//! - A filter change drops child scopes and queued child requests, and every
//!   pending callback is answered by the next confirmation
//! - A page cleared by the server is fetched again when re-requested

use folio_core::{ClientMessage, FilterToken, Item, ItemKey, ScopeKey, ServerMessage, SyncState};
use folio_sync::{ConfirmOutcome, DataOutcome, MessageOutcome, SyncController};
use folio_test_utils::assertions::{
    assert_empty, assert_keys, assert_loaded, assert_misaligned, assert_placeholder,
};
use folio_test_utils::fixtures::{
    child_confirm, child_items, child_page, immediate_config, labelled_items, root_confirm,
    root_page, size_update,
};
use folio_test_utils::generators::arb_valid_config;
use folio_test_utils::DeliveryProbe;
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn controller(page_size: usize) -> SyncController<Vec<ClientMessage>> {
    SyncController::new(immediate_config(page_size), Vec::new()).unwrap()
}

fn root_fetches(outbox: &[ClientMessage]) -> Vec<(usize, usize, FilterToken)> {
    outbox
        .iter()
        .filter_map(|message| match message {
            ClientMessage::SetRequestedRange {
                start,
                count,
                filter,
            } => Some((*start, *count, filter.clone())),
            _ => None,
        })
        .collect()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_page_size_twenty_scenario() {
    let now = Instant::now();
    let mut c = controller(20);
    let probe = DeliveryProbe::new();

    c.request_page(ScopeKey::Root, 0, 20, probe.callback(), now).unwrap();
    assert_eq!(root_fetches(c.remote()), vec![(0, 20, FilterToken::none())]);
    assert!(probe.is_empty());

    c.on_server_message(size_update(73)).unwrap();
    c.on_server_message(root_page(0, labelled_items("row", 20), ""))
        .unwrap();
    assert!(probe.is_empty());

    let outcome = c.on_server_message(root_confirm(1, "")).unwrap();
    assert_eq!(
        outcome,
        MessageOutcome::Confirm(ConfirmOutcome::Flushed { resolved: 1 })
    );

    let delivery = probe.last().unwrap();
    assert_loaded(&delivery, 20);
    assert_eq!(delivery.size, Some(73));
    assert_eq!(delivery.items()[19].key, ItemKey::from("row-19"));
    assert_eq!(c.state(), SyncState::Settled);
}

#[test]
fn test_misaligned_page_data_leaves_cache_unchanged() {
    let mut c = controller(10);
    let result = c.on_server_message(root_page(3, labelled_items("row", 4), ""));
    assert_misaligned(&result);
    assert!(c.tree().pages().is_empty());
}

#[test]
fn test_confirm_answers_unrequested_pages_with_placeholders() {
    let now = Instant::now();
    let mut c = controller(10);
    c.on_server_message(size_update(200)).unwrap();
    c.set_viewport(0, 0);

    let near = DeliveryProbe::new();
    let far = DeliveryProbe::new();
    c.request_page(ScopeKey::Root, 0, 10, near.callback(), now).unwrap();
    c.request_page(ScopeKey::Root, 5, 10, far.callback(), now).unwrap();
    c.on_server_message(root_page(0, labelled_items("row", 10), ""))
        .unwrap();

    // Forgets the requested ranges, so page 5 is no longer on its way
    c.on_server_message(ServerMessage::EnsureHierarchy).unwrap();
    c.on_server_message(root_confirm(1, "")).unwrap();

    assert_loaded(&near.last().unwrap(), 10);
    let far = far.last().unwrap();
    assert_placeholder(&far, 10);
    assert_eq!(far.size, Some(200));
}

#[test]
fn test_confirm_keeps_requested_pages_waiting() {
    let now = Instant::now();
    let mut c = controller(10);
    c.on_server_message(size_update(200)).unwrap();

    let far = DeliveryProbe::new();
    c.request_page(ScopeKey::Root, 5, 10, far.callback(), now).unwrap();
    c.on_server_message(root_confirm(1, "")).unwrap();
    assert!(far.is_empty());
    assert_eq!(c.pending_callbacks(), 1);
}

#[test]
fn test_selection_single_then_multi() {
    let mut c = controller(10);
    c.select(Item::new("K"));
    c.select(Item::new("J"));
    let selected: Vec<&ItemKey> = c.selection().selected_keys().collect();
    assert_eq!(selected, vec![&ItemKey::from("J")]);

    c.set_selection_mode("MULTI").unwrap();
    c.select(Item::new("J"));
    c.select(Item::new("K"));
    let selected: Vec<&ItemKey> = c.selection().selected_keys().collect();
    assert_eq!(selected, vec![&ItemKey::from("J"), &ItemKey::from("K")]);
}

#[test]
fn test_selection_survives_page_eviction() {
    let now = Instant::now();
    let mut c = controller(5);
    c.set_selection_mode("multi").unwrap();
    c.on_server_message(root_page(0, labelled_items("row", 5), ""))
        .unwrap();
    c.select(Item::new("row-2"));

    c.set_filter("x", now);
    assert!(c.tree().pages().is_empty());
    assert!(c.selection().is_selected(&ItemKey::from("row-2")));
}

#[test]
fn test_refetched_page_keeps_client_selection() {
    let mut c = controller(5);
    c.select(Item::new("row-1"));
    c.on_server_message(root_page(0, labelled_items("row", 5), ""))
        .unwrap();
    let cached = c.tree().pages().get(&ScopeKey::Root, 0).unwrap();
    assert!(cached[1].selected);
    assert!(!cached[0].selected);
}

#[test]
fn test_filter_change_discards_in_flight_response() {
    let now = Instant::now();
    let mut c = controller(10);
    let before = DeliveryProbe::new();
    c.request_page(ScopeKey::Root, 0, 10, before.callback(), now).unwrap();

    c.set_filter("ab", now);
    assert_empty(&before.last().unwrap());
    let fetches_before = root_fetches(c.remote()).len();

    let stale = c
        .on_server_message(root_page(0, labelled_items("row", 10), ""))
        .unwrap();
    assert_eq!(stale, MessageOutcome::Data(DataOutcome::Stale));
    let stale = c.on_server_message(root_confirm(1, "")).unwrap();
    assert_eq!(stale, MessageOutcome::Confirm(ConfirmOutcome::Stale));
    assert!(c.tree().pages().is_empty());

    let after = DeliveryProbe::new();
    c.request_page(ScopeKey::Root, 0, 10, after.callback(), now).unwrap();
    assert_eq!(root_fetches(c.remote()).len(), fetches_before);

    c.tick(now + Duration::from_millis(499));
    assert_eq!(root_fetches(c.remote()).len(), fetches_before);
    c.tick(now + Duration::from_millis(500));
    c.tick(now + Duration::from_millis(900));

    let fetches = root_fetches(c.remote());
    assert_eq!(fetches.len(), fetches_before + 1);
    assert_eq!(fetches.last(), Some(&(0, 10, FilterToken::from("ab"))));

    c.on_server_message(root_page(0, labelled_items("ab", 3), "ab"))
        .unwrap();
    c.on_server_message(root_confirm(2, "ab")).unwrap();
    assert_keys(&after.last().unwrap(), &["ab-0", "ab-1", "ab-2"]);
}

#[test]
fn test_filter_changes_within_window_restart_debounce() {
    let now = Instant::now();
    let mut c = controller(10);
    c.set_filter("a", now);
    c.set_filter("ab", now + Duration::from_millis(300));
    c.tick(now + Duration::from_millis(600));
    assert!(root_fetches(c.remote()).is_empty());
    c.tick(now + Duration::from_millis(800));
    assert_eq!(
        root_fetches(c.remote()),
        vec![(0, 10, FilterToken::from("ab"))]
    );
}

#[test]
fn test_collapse_tears_down_subtree() {
    let now = Instant::now();
    let mut c = controller(10);
    c.set_viewport(0, 9);
    c.on_server_message(size_update(3)).unwrap();
    c.on_server_message(root_page(0, labelled_items("p", 3), ""))
        .unwrap();

    c.expand(ItemKey::from("p-0"));
    c.ensure_subcache(ScopeKey::Root, 0, now);
    let child = ScopeKey::parent("p-0");
    assert!(c.tree().contains_scope(&child));
    assert!(c.remote().contains(&ClientMessage::SetParentRequestedRange {
        first_index: 0,
        size: 10,
        parent_key: ItemKey::from("p-0"),
        filter: FilterToken::none(),
    }));

    let waiting = DeliveryProbe::new();
    c.request_page(child.clone(), 0, 10, waiting.callback(), now).unwrap();
    assert!(waiting.is_empty());

    c.collapse(ItemKey::from("p-0"));
    assert_empty(&waiting.last().unwrap());
    assert!(!c.tree().contains_scope(&child));
    assert_eq!(
        c.remote().last(),
        Some(&ClientMessage::UpdateExpandedState {
            key: ItemKey::from("p-0"),
            expanded: false,
        })
    );

    let late = c
        .on_server_message(child_page("p-0", 0, child_items("p-0", 4)))
        .unwrap();
    assert_eq!(late, MessageOutcome::Data(DataOutcome::UnknownScope));
    assert_eq!(c.tree().pages().scope_page_count(&child), 0);
}

#[test]
fn test_collapse_drops_queued_subfetches() {
    let now = Instant::now();
    let config = immediate_config(10).with_ensure_subcache_delay(Duration::from_millis(16));
    let mut c = SyncController::new(config, Vec::new()).unwrap();
    c.set_viewport(0, 9);
    c.on_server_message(size_update(3)).unwrap();
    c.on_server_message(root_page(0, labelled_items("p", 3), ""))
        .unwrap();

    c.expand(ItemKey::from("p-0"));
    c.ensure_subcache(ScopeKey::Root, 0, now);
    assert_eq!(c.coordinator().queued_subcache_requests().count(), 1);
    c.tick(now + Duration::from_millis(16));
    let child = ScopeKey::parent("p-0");
    assert!(c.tree().contains_scope(&child));

    c.on_server_message(child_page("p-0", 0, child_items("p-0", 3)))
        .unwrap();
    c.on_server_message(child_confirm(2, "p-0", 3)).unwrap();
    assert_eq!(c.size(&child), 3);

    c.expand(ItemKey::from("p-0/0"));
    c.ensure_subcache(child.clone(), 0, now + Duration::from_millis(20));
    assert_eq!(c.coordinator().queued_subcache_requests().count(), 1);

    c.collapse(ItemKey::from("p-0"));
    assert_eq!(c.coordinator().queued_subcache_requests().count(), 0);

    c.tick(now + Duration::from_millis(100));
    assert!(!c.tree().contains_scope(&ScopeKey::parent("p-0/0")));
    assert_eq!(c.tree().scope_count(), 1);
}

#[test]
fn test_server_collapse_is_not_echoed() {
    let now = Instant::now();
    let mut c = controller(10);
    c.set_viewport(0, 9);
    c.on_server_message(root_page(0, labelled_items("p", 3), ""))
        .unwrap();
    c.expand(ItemKey::from("p-1"));
    c.ensure_subcache(ScopeKey::Root, 1, now);
    let sent = c.remote().len();

    c.on_server_message(ServerMessage::CollapseItems {
        items: vec![Item::new("p-1")],
    })
    .unwrap();
    assert_eq!(c.remote().len(), sent);
    assert!(!c.tree().is_expanded(&ItemKey::from("p-1")));
    assert!(!c.tree().contains_scope(&ScopeKey::parent("p-1")));
}

#[test]
fn test_filter_change_drops_child_scopes() {
    let now = Instant::now();
    let mut c = controller(10);
    c.set_viewport(0, 9);
    c.on_server_message(size_update(3)).unwrap();
    c.on_server_message(root_page(0, labelled_items("p", 3), ""))
        .unwrap();

    c.expand(ItemKey::from("p-0"));
    c.ensure_subcache(ScopeKey::Root, 0, now);
    let child = ScopeKey::parent("p-0");
    let before = DeliveryProbe::new();
    c.request_page(child.clone(), 0, 10, before.callback(), now).unwrap();
    assert!(before.is_empty());

    c.set_filter("x", now);
    assert_empty(&before.last().unwrap());
    assert!(!c.tree().contains_scope(&child));
    assert!(c.tree().is_expanded(&ItemKey::from("p-0")));

    let during = DeliveryProbe::new();
    c.request_page(child.clone(), 0, 10, during.callback(), now).unwrap();
    assert_empty(&during.last().unwrap());

    c.tick(now + Duration::from_millis(500));
    assert_eq!(
        root_fetches(c.remote()).last(),
        Some(&(0, 10, FilterToken::from("x")))
    );

    // Unstamped child data cannot answer a filtered query
    let late = c
        .on_server_message(child_page("p-0", 0, child_items("p-0", 4)))
        .unwrap();
    assert_eq!(late, MessageOutcome::Data(DataOutcome::Stale));

    c.on_server_message(root_page(0, labelled_items("p", 3), "x"))
        .unwrap();
    c.on_server_message(root_confirm(2, "x")).unwrap();
    assert_eq!(c.pending_callbacks(), 0);

    c.ensure_subcache(ScopeKey::Root, 0, now + Duration::from_millis(600));
    assert!(c.tree().contains_scope(&child));
    assert_eq!(
        c.remote().last(),
        Some(&ClientMessage::SetParentRequestedRange {
            first_index: 0,
            size: 10,
            parent_key: ItemKey::from("p-0"),
            filter: FilterToken::from("x"),
        })
    );
}

#[test]
fn test_filter_change_drops_queued_child_requests() {
    let now = Instant::now();
    let config = immediate_config(10).with_parent_request_delay(Duration::from_millis(20));
    let mut c = SyncController::new(config, Vec::new()).unwrap();
    c.set_viewport(0, 9);
    c.on_server_message(size_update(3)).unwrap();
    c.on_server_message(root_page(0, labelled_items("p", 3), ""))
        .unwrap();

    c.expand(ItemKey::from("p-0"));
    c.ensure_subcache(ScopeKey::Root, 0, now);
    assert_eq!(c.coordinator().queued_parent_requests().count(), 1);

    c.set_filter("x", now + Duration::from_millis(5));
    assert_eq!(c.coordinator().queued_parent_requests().count(), 0);

    c.tick(now + Duration::from_millis(20));
    assert!(!c
        .remote()
        .iter()
        .any(|message| matches!(message, ClientMessage::SetParentRequestedRanges { .. })));
}

#[test]
fn test_rerequest_after_clear_fetches_again() {
    let now = Instant::now();
    let mut c = controller(10);
    c.on_server_message(size_update(10)).unwrap();

    let first = DeliveryProbe::new();
    c.request_page(ScopeKey::Root, 0, 10, first.callback(), now).unwrap();
    c.on_server_message(root_page(0, labelled_items("row", 10), ""))
        .unwrap();
    c.on_server_message(root_confirm(1, "")).unwrap();
    assert_loaded(&first.last().unwrap(), 10);

    c.on_server_message(ServerMessage::Clear {
        start_index: 0,
        length: 10,
        parent_key: None,
    })
    .unwrap();
    assert!(c.coordinator().range(&ScopeKey::Root).is_none());

    let again = DeliveryProbe::new();
    c.request_page(ScopeKey::Root, 0, 10, again.callback(), now).unwrap();
    assert_eq!(root_fetches(c.remote()).len(), 2);

    c.on_server_message(root_page(0, labelled_items("new", 10), ""))
        .unwrap();
    c.on_server_message(root_confirm(2, "")).unwrap();
    let delivery = again.last().unwrap();
    assert_loaded(&delivery, 10);
    assert_eq!(delivery.items()[0].key, ItemKey::from("new-0"));
    assert_eq!(c.pending_callbacks(), 0);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_identical_requests_fetch_once(
        page in 0usize..10,
        page_size in 1usize..30,
    ) {
        let now = Instant::now();
        let mut c = controller(page_size);
        c.on_server_message(size_update(page_size * 20)).unwrap();

        c.request_page(ScopeKey::Root, page, page_size, DeliveryProbe::new().callback(), now).unwrap();
        c.request_page(ScopeKey::Root, page, page_size, DeliveryProbe::new().callback(), now).unwrap();

        prop_assert_eq!(root_fetches(c.remote()).len(), 1);
    }

    #[test]
    fn prop_reset_resolves_everything(
        config in arb_valid_config(),
        pages in prop::collection::vec(0usize..12, 0..20),
        cached in 0usize..3,
    ) {
        let now = Instant::now();
        let page_size = config.page_size;
        let mut c = SyncController::new(config, Vec::new()).unwrap();
        c.on_server_message(size_update(page_size * 12)).unwrap();
        c.on_server_message(root_page(0, labelled_items("row", cached * page_size), ""))
            .unwrap();

        let probe = DeliveryProbe::new();
        for page in &pages {
            c.request_page(ScopeKey::Root, *page, page_size, probe.callback(), now).unwrap();
        }

        c.reset();

        prop_assert_eq!(probe.len(), pages.len());
        prop_assert_eq!(c.pending_callbacks(), 0);
        prop_assert!(c.tree().pages().is_empty());
        prop_assert_eq!(c.size(&ScopeKey::Root), 0);
        prop_assert_eq!(c.state(), SyncState::Idle);
    }

    #[test]
    fn prop_stale_filter_never_populates_cache(
        old in "[a-z]{1,4}",
        new in "[A-Z]{1,4}",
        count in 1usize..30,
    ) {
        let now = Instant::now();
        let mut c = controller(10);
        c.set_filter(old.as_str(), now);
        c.tick(now + Duration::from_secs(1));
        c.set_filter(new.as_str(), now + Duration::from_secs(2));

        let outcome = c
            .on_server_message(root_page(0, labelled_items("row", count), &old))
            .unwrap();
        prop_assert_eq!(outcome, MessageOutcome::Data(DataOutcome::Stale));
        prop_assert!(c.tree().pages().is_empty());
    }
}
