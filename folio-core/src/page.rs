//! Page arithmetic and the values handed back to the widget.
//!
//! A page is a fixed-size contiguous slice of one scope's items. Absolute
//! indices are always relative to the scope, so `page * page_size` recovers
//! the index of a page's first item.

use crate::{Item, ScopeKey};
use serde::{Deserialize, Serialize};

/// Page holding the item at `index`.
pub fn page_of_index(index: usize, page_size: usize) -> usize {
    index / page_size
}

/// Absolute index of the first item of `page`.
pub fn first_index_of_page(page: usize, page_size: usize) -> usize {
    page * page_size
}

/// Whether `index` sits on a page boundary.
pub fn is_page_aligned(index: usize, page_size: usize) -> bool {
    index % page_size == 0
}

/// Number of pages needed to hold `len` items (rounded up).
pub fn page_count_for(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size)
}

/// Inclusive `[first, last]` page window a scope believes is fetched or in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestedRange {
    pub first: usize,
    pub last: usize,
}

impl RequestedRange {
    pub fn new(first: usize, last: usize) -> Self {
        debug_assert!(first <= last, "range must not be inverted");
        Self { first, last }
    }

    pub fn contains(&self, page: usize) -> bool {
        page >= self.first && page <= self.last
    }

    pub fn page_count(&self) -> usize {
        self.last - self.first + 1
    }

    /// Absolute index of the first item covered.
    pub fn start_index(&self, page_size: usize) -> usize {
        first_index_of_page(self.first, page_size)
    }

    /// Number of item slots covered.
    pub fn item_count(&self, page_size: usize) -> usize {
        self.page_count() * page_size
    }
}

/// What a resolved page request carries.
#[derive(Debug, Clone, PartialEq)]
pub enum PageContent {
    /// Real items, at most `page_size` of them.
    Loaded(Vec<Item>),
    /// The server confirmed this page will not arrive in the current batch.
    /// Carries the number of slots the widget should render as not-yet-loaded.
    Placeholder(usize),
    /// The request was torn down (reset, collapse, filter change).
    Empty,
}

impl PageContent {
    pub fn items(&self) -> &[Item] {
        match self {
            Self::Loaded(items) => items,
            Self::Placeholder(_) | Self::Empty => &[],
        }
    }

    /// Number of slots, loaded or not.
    pub fn len(&self) -> usize {
        match self {
            Self::Loaded(items) => items.len(),
            Self::Placeholder(slots) => *slots,
            Self::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// A resolved page request, handed to the widget's callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDelivery {
    pub scope: ScopeKey,
    pub page: usize,
    pub content: PageContent,
    /// Best-known total size of the scope, if any.
    pub size: Option<usize>,
}

impl PageDelivery {
    pub fn loaded(scope: ScopeKey, page: usize, items: Vec<Item>, size: Option<usize>) -> Self {
        Self {
            scope,
            page,
            content: PageContent::Loaded(items),
            size,
        }
    }

    pub fn placeholder(scope: ScopeKey, page: usize, slots: usize, size: Option<usize>) -> Self {
        Self {
            scope,
            page,
            content: PageContent::Placeholder(slots),
            size,
        }
    }

    pub fn empty(scope: ScopeKey, page: usize, size: Option<usize>) -> Self {
        Self {
            scope,
            page,
            content: PageContent::Empty,
            size,
        }
    }

    pub fn items(&self) -> &[Item] {
        self.content.items()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        assert_eq!(page_of_index(0, 20), 0);
        assert_eq!(page_of_index(19, 20), 0);
        assert_eq!(page_of_index(20, 20), 1);
        assert_eq!(first_index_of_page(3, 20), 60);
        assert!(is_page_aligned(40, 20));
        assert!(!is_page_aligned(41, 20));
        assert_eq!(page_count_for(0, 20), 0);
        assert_eq!(page_count_for(21, 20), 2);
        assert_eq!(page_count_for(40, 20), 2);
    }

    #[test]
    fn test_requested_range_covers_items() {
        let range = RequestedRange::new(2, 4);
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
        assert_eq!(range.page_count(), 3);
        assert_eq!(range.start_index(10), 20);
        assert_eq!(range.item_count(10), 30);
    }

    #[test]
    fn test_page_content_lengths() {
        assert_eq!(PageContent::Placeholder(5).len(), 5);
        assert!(PageContent::Placeholder(5).items().is_empty());
        assert!(PageContent::Empty.is_empty());
        let loaded = PageContent::Loaded(vec![Item::new("a")]);
        assert!(loaded.is_loaded());
        assert_eq!(loaded.len(), 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            /// Every index lies inside the page that `page_of_index` names.
            #[test]
            fn prop_index_within_its_page(index in 0usize..100_000, page_size in 1usize..500) {
                let page = page_of_index(index, page_size);
                let first = first_index_of_page(page, page_size);
                prop_assert!(is_page_aligned(first, page_size));
                prop_assert!(first <= index && index < first + page_size);
            }

            /// `page_count_for` is the smallest page count covering `len` items.
            #[test]
            fn prop_page_count_covers_len(len in 0usize..100_000, page_size in 1usize..500) {
                let pages = page_count_for(len, page_size);
                prop_assert!(pages * page_size >= len);
                if pages > 0 {
                    prop_assert!((pages - 1) * page_size < len);
                }
            }
        }
    }
}
