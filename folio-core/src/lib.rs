//! FOLIO Core - Entity Types
//!
//! Pure data structures shared by every other crate: item identity, scopes,
//! page arithmetic, filter tokens, the wire protocol, errors and configuration.
//! No caching or scheduling logic lives here.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub mod config;
pub mod enums;
pub mod error;
pub mod filter;
pub mod item;
pub mod page;
pub mod protocol;

pub use config::ConnectorConfig;
pub use enums::{SelectionMode, SelectionOrigin, SyncState};
pub use error::{
    CacheError, ConfigError, FolioError, FolioResult, ProtocolError, SelectionError,
};
pub use filter::FilterToken;
pub use item::Item;
pub use page::{
    first_index_of_page, is_page_aligned, page_count_for, page_of_index, PageContent,
    PageDelivery, RequestedRange,
};
pub use protocol::{ClientMessage, ParentRange, ServerMessage};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Stable unique key of an item as assigned by the remote data source.
///
/// Identity is by key: two records carrying the same key are the same
/// logical item, even when their payloads differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Page-index namespace: the root level, or the children of one parent item.
///
/// On the wire a scope is an optional parent key, `None` meaning root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ScopeKey {
    #[default]
    Root,
    Parent(ItemKey),
}

impl ScopeKey {
    /// Scope holding the children of `key`.
    pub fn parent(key: impl Into<ItemKey>) -> Self {
        Self::Parent(key.into())
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// The parent item key, or `None` for the root scope.
    pub fn parent_key(&self) -> Option<&ItemKey> {
        match self {
            Self::Root => None,
            Self::Parent(key) => Some(key),
        }
    }
}

impl From<Option<ItemKey>> for ScopeKey {
    fn from(value: Option<ItemKey>) -> Self {
        value.map_or(Self::Root, Self::Parent)
    }
}

impl From<ScopeKey> for Option<ItemKey> {
    fn from(value: ScopeKey) -> Self {
        match value {
            ScopeKey::Root => None,
            ScopeKey::Parent(key) => Some(key),
        }
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("<root>"),
            Self::Parent(key) => write!(f, "{key}"),
        }
    }
}

/// Server-assigned id of one update cycle, echoed back on acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one connector instance, used to correlate log records.
/// UUIDv7 so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectorId(Uuid);

impl ConnectorId {
    pub fn now_v7() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectorId {
    fn default() -> Self {
        Self::now_v7()
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_option_roundtrip() {
        let root: ScopeKey = None.into();
        assert!(root.is_root());
        assert_eq!(Option::<ItemKey>::from(root), None);

        let child: ScopeKey = Some(ItemKey::from("p-1")).into();
        assert_eq!(child.parent_key(), Some(&ItemKey::from("p-1")));
    }

    #[test]
    fn test_scope_key_display() {
        assert_eq!(ScopeKey::Root.to_string(), "<root>");
        assert_eq!(ScopeKey::parent("a").to_string(), "a");
    }

    #[test]
    fn test_item_key_serializes_transparently() {
        let json = serde_json::to_string(&ItemKey::from("k7")).unwrap();
        assert_eq!(json, "\"k7\"");
    }

    #[test]
    fn test_connector_ids_are_unique() {
        assert_ne!(ConnectorId::now_v7(), ConnectorId::now_v7());
    }
}
