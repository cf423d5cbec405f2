//! Item records as delivered by the remote data source.

use crate::{ItemKey, ScopeKey};
use serde::{Deserialize, Serialize};

/// One row of data.
///
/// The connector only interprets the key, the parent key and the two
/// flags; everything else travels opaquely in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub key: ItemKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<ItemKey>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub details_opened: bool,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Item {
    /// Create a root-level item with an empty payload.
    pub fn new(key: impl Into<ItemKey>) -> Self {
        Self {
            key: key.into(),
            parent_key: None,
            selected: false,
            details_opened: false,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<ItemKey>) -> Self {
        self.parent_key = Some(parent.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = selected;
        self
    }

    pub fn with_details_opened(mut self, opened: bool) -> Self {
        self.details_opened = opened;
        self
    }

    /// The scope this item lives in.
    pub fn scope(&self) -> ScopeKey {
        self.parent_key.clone().into()
    }

    /// Identity comparison: same logical item regardless of payload.
    pub fn same_item(&self, other: &Item) -> bool {
        self.key == other.key
    }

    /// The `label` field of the payload, when present.
    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(|value| value.as_str())
    }
}
