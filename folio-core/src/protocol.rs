//! Message-shaped protocol between the connector and the remote data source.
//!
//! Transport is out of scope; messages serialize to tagged JSON so any host
//! can carry them. Field semantics (page alignment, batch ids, filter echo)
//! are what matter.

use crate::error::{FolioResult, ProtocolError};
use crate::{BatchId, FilterToken, Item, ItemKey, ScopeKey};
use serde::{Deserialize, Serialize};

/// One child-range request inside a batched parent request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRange {
    pub first_index: usize,
    pub size: usize,
    pub parent_key: ItemKey,
    /// Filter active when the range was requested; the reply echoes it.
    pub filter: FilterToken,
}

/// Connector → remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Fetch `[start, start + count)` of the root scope under `filter`.
    #[serde(rename_all = "camelCase")]
    SetRequestedRange {
        start: usize,
        count: usize,
        filter: FilterToken,
    },
    /// Fetch one child range, sent when parent batching is disabled.
    #[serde(rename_all = "camelCase")]
    SetParentRequestedRange {
        first_index: usize,
        size: usize,
        parent_key: ItemKey,
        filter: FilterToken,
    },
    /// Fetch several child ranges at once.
    SetParentRequestedRanges { ranges: Vec<ParentRange> },
    /// The root batch has been applied.
    #[serde(rename_all = "camelCase")]
    ConfirmUpdate { batch_id: BatchId },
    /// A child batch has been applied.
    #[serde(rename_all = "camelCase")]
    ConfirmParentUpdate {
        batch_id: BatchId,
        parent_key: ItemKey,
    },
    Select { key: ItemKey },
    Deselect { key: ItemKey },
    UpdateExpandedState { key: ItemKey, expanded: bool },
    SetDetailsVisible { key: Option<ItemKey> },
    /// Ask the remote to resend from scratch (filter returned to empty).
    ResetDataCommunicator,
}

impl ClientMessage {
    pub fn encode(&self) -> FolioResult<String> {
        serde_json::to_string(self).map_err(|e| {
            ProtocolError::Encode {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Remote → connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Items for `[start_index, start_index + items.len())` of a scope.
    #[serde(rename_all = "camelCase")]
    PageData {
        start_index: usize,
        items: Vec<Item>,
        #[serde(default)]
        parent_key: Option<ItemKey>,
        #[serde(default)]
        filter: Option<FilterToken>,
    },
    #[serde(rename_all = "camelCase")]
    SizeUpdate {
        #[serde(default)]
        parent_key: Option<ItemKey>,
        size: usize,
    },
    /// A server-side update cycle has finished.
    #[serde(rename_all = "camelCase")]
    BatchConfirmed {
        batch_id: BatchId,
        #[serde(default)]
        parent_key: Option<ItemKey>,
        #[serde(default)]
        filter: Option<FilterToken>,
        #[serde(default)]
        level_size: Option<usize>,
    },
    /// Refreshed records for items that may already be cached.
    ItemsUpdated { items: Vec<Item> },
    #[serde(rename_all = "camelCase")]
    Clear {
        start_index: usize,
        length: usize,
        #[serde(default)]
        parent_key: Option<ItemKey>,
    },
    Reset,
    ExpandItems { items: Vec<Item> },
    CollapseItems { items: Vec<Item> },
    SetSelectionMode { mode: String },
    EnsureHierarchy,
    ClearExpanded,
}

impl ServerMessage {
    /// Parse one message and check its item payload.
    pub fn decode(raw: &str) -> FolioResult<Self> {
        let message: Self = serde_json::from_str(raw).map_err(|e| ProtocolError::Decode {
            reason: e.to_string(),
        })?;
        message.validate_items()?;
        Ok(message)
    }

    /// Every item needs a key, and page data for a parent may only carry
    /// that parent's children.
    fn validate_items(&self) -> Result<(), ProtocolError> {
        let (items, parent) = match self {
            Self::PageData {
                items, parent_key, ..
            } => (items, parent_key.as_ref()),
            Self::ItemsUpdated { items }
            | Self::ExpandItems { items }
            | Self::CollapseItems { items } => (items, None),
            _ => return Ok(()),
        };
        for item in items {
            if item.key.as_str().is_empty() {
                return Err(ProtocolError::InvalidItems {
                    reason: "item with empty key".to_string(),
                });
            }
            if let (Some(expected), Some(actual)) = (parent, item.parent_key.as_ref()) {
                if expected != actual {
                    return Err(ProtocolError::InvalidItems {
                        reason: format!(
                            "item {} has parent {} but was sent for {}",
                            item.key, actual, expected
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Scope a scoped message refers to.
    pub fn scope(&self) -> Option<ScopeKey> {
        match self {
            Self::PageData { parent_key, .. }
            | Self::SizeUpdate { parent_key, .. }
            | Self::BatchConfirmed { parent_key, .. }
            | Self::Clear { parent_key, .. } => Some(parent_key.clone().into()),
            _ => None,
        }
    }
}
