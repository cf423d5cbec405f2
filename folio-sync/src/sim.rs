//! In-memory remote data source.
//!
//! Answers connector requests from a fixed item set, the way a server-side
//! data communicator would: every range request produces size, data and a
//! confirmation stamped with the filter it was computed under. Used by the
//! `folio-sim` binary and by integration tests.

use crate::driver::ConnectorHandle;
use folio_core::{BatchId, ClientMessage, FilterToken, Item, ItemKey, ParentRange, ServerMessage};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    roots: Vec<Item>,
    children: HashMap<ItemKey, Vec<Item>>,
    filter: FilterToken,
    next_batch: u64,
    selected: BTreeSet<ItemKey>,
    expanded: BTreeSet<ItemKey>,
    details: Option<ItemKey>,
    acknowledged: Vec<BatchId>,
}

impl InMemoryBackend {
    pub fn new(roots: Vec<Item>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// `count` root items keyed `item-N`, labelled `Item N`.
    pub fn with_labels(count: usize) -> Self {
        Self::new(
            (0..count)
                .map(|i| {
                    Item::new(format!("item-{i}"))
                        .with_data(serde_json::json!({ "label": format!("Item {i}") }))
                })
                .collect(),
        )
    }

    /// Give `parent` `count` children keyed `parent/N`.
    pub fn with_children(mut self, parent: impl Into<ItemKey>, count: usize) -> Self {
        let parent = parent.into();
        let children = (0..count)
            .map(|i| {
                Item::new(format!("{parent}/{i}"))
                    .with_parent(parent.clone())
                    .with_data(serde_json::json!({ "label": format!("{parent} child {i}") }))
            })
            .collect();
        self.children.insert(parent, children);
        self
    }

    pub fn selected(&self) -> impl Iterator<Item = &ItemKey> {
        self.selected.iter()
    }

    pub fn expanded(&self) -> impl Iterator<Item = &ItemKey> {
        self.expanded.iter()
    }

    pub fn acknowledged(&self) -> &[BatchId] {
        &self.acknowledged
    }

    fn visible_roots(&self) -> Vec<&Item> {
        self.roots
            .iter()
            .filter(|item| self.filter.matches_label(item.label()))
            .collect()
    }

    fn decorate(&self, item: &Item) -> Item {
        item.clone()
            .with_selected(self.selected.contains(&item.key))
            .with_details_opened(self.details.as_ref() == Some(&item.key))
    }

    fn batch(&mut self) -> BatchId {
        self.next_batch += 1;
        BatchId(self.next_batch)
    }

    /// Answer one connector message.
    pub fn handle(&mut self, message: ClientMessage) -> Vec<ServerMessage> {
        trace!(?message, "backend received");
        match message {
            ClientMessage::SetRequestedRange {
                start,
                count,
                filter,
            } => {
                self.filter = filter;
                let visible = self.visible_roots();
                let size = visible.len();
                let end = (start + count).min(size);
                let items: Vec<Item> = visible
                    .get(start.min(end)..end)
                    .unwrap_or_default()
                    .iter()
                    .map(|item| self.decorate(item))
                    .collect();
                debug!(start, count = items.len(), size, filter = %self.filter, "root range served");

                let batch_id = self.batch();
                vec![
                    ServerMessage::SizeUpdate {
                        parent_key: None,
                        size,
                    },
                    ServerMessage::PageData {
                        start_index: start,
                        items,
                        parent_key: None,
                        filter: Some(self.filter.clone()),
                    },
                    ServerMessage::BatchConfirmed {
                        batch_id,
                        parent_key: None,
                        filter: Some(self.filter.clone()),
                        level_size: None,
                    },
                ]
            }
            ClientMessage::SetParentRequestedRange {
                first_index,
                size,
                parent_key,
                filter,
            } => self.serve_children(ParentRange {
                first_index,
                size,
                parent_key,
                filter,
            }),
            ClientMessage::SetParentRequestedRanges { ranges } => ranges
                .into_iter()
                .flat_map(|range| self.serve_children(range))
                .collect(),
            ClientMessage::ConfirmUpdate { batch_id }
            | ClientMessage::ConfirmParentUpdate { batch_id, .. } => {
                self.acknowledged.push(batch_id);
                Vec::new()
            }
            ClientMessage::Select { key } => {
                self.selected.insert(key);
                Vec::new()
            }
            ClientMessage::Deselect { key } => {
                self.selected.remove(&key);
                Vec::new()
            }
            ClientMessage::UpdateExpandedState { key, expanded } => {
                if expanded {
                    self.expanded.insert(key);
                } else {
                    self.expanded.remove(&key);
                }
                Vec::new()
            }
            ClientMessage::SetDetailsVisible { key } => {
                let touched: Vec<ItemKey> = self.details.iter().chain(key.iter()).cloned().collect();
                self.details = key;
                let items: Vec<Item> = self
                    .roots
                    .iter()
                    .chain(self.children.values().flatten())
                    .filter(|item| touched.contains(&item.key))
                    .map(|item| self.decorate(item))
                    .collect();
                vec![ServerMessage::ItemsUpdated { items }]
            }
            ClientMessage::ResetDataCommunicator => {
                debug!("backend reset requested");
                Vec::new()
            }
        }
    }

    fn serve_children(&mut self, range: ParentRange) -> Vec<ServerMessage> {
        let ParentRange {
            first_index,
            size,
            parent_key,
            filter,
        } = range;
        let children = self.children.get(&parent_key).map(Vec::as_slice).unwrap_or_default();
        let level_size = children.len();
        let end = (first_index + size).min(level_size);
        let items: Vec<Item> = children
            .get(first_index.min(end)..end)
            .unwrap_or_default()
            .iter()
            .map(|item| self.decorate(item))
            .collect();
        debug!(parent = %parent_key, first_index, count = items.len(), level_size, "child range served");

        let batch_id = self.batch();
        vec![
            ServerMessage::PageData {
                start_index: first_index,
                items,
                parent_key: Some(parent_key.clone()),
                filter: Some(filter.clone()),
            },
            ServerMessage::BatchConfirmed {
                batch_id,
                parent_key: Some(parent_key),
                filter: Some(filter),
                level_size: Some(level_size),
            },
        ]
    }
}

/// Pump connector requests through `backend` and feed the answers back.
///
/// Stops when either side goes away and returns the backend for inspection.
pub fn spawn_backend(
    mut backend: InMemoryBackend,
    mut requests: mpsc::UnboundedReceiver<ClientMessage>,
    connector: ConnectorHandle,
) -> JoinHandle<InMemoryBackend> {
    tokio::spawn(async move {
        'pump: while let Some(request) = requests.recv().await {
            for reply in backend.handle(request) {
                if connector.deliver(reply).is_err() {
                    break 'pump;
                }
            }
        }
        backend
    })
}
