//! FOLIO Cache - In-memory state of one connector
//!
//! Everything here is synchronous and owned by a single controller:
//!
//! - [`PageCache`]: fetched pages keyed by `(scope, page)`, stamped with the
//!   filter token they were fetched under
//! - [`HierarchyCache`]: arena of per-parent scopes with expand/collapse and
//!   flattened index mapping
//! - [`PendingCallbackRegistry`]: outstanding page requests from the widget
//! - [`SelectionTracker`]: selected items, independent of cache residency
//!
//! Operations that complete page requests never call back directly. They
//! return [`Resolution`]s which the owner fires once its own state is
//! consistent again.

pub mod hierarchy;
pub mod page_cache;
pub mod pending;
pub mod selection;

pub use hierarchy::{HierarchyCache, ScopeNode};
pub use page_cache::{CacheStats, CachedPage, ItemLocation, PageCache};
pub use pending::{PageCallback, PendingCallbackRegistry, Resolution};
pub use selection::{SelectionChange, SelectionTracker};
