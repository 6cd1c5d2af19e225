//! Paged read results.
//!
//! A [`Page`] carries one window of a ranged read together with the total number of
//! documents matching the same predicate, so callers can render navigation without a
//! second round trip.

use serde::{Deserialize, Serialize};

use crate::query::Pagination;

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use doctable::{page::Page, query::Pagination};
///
/// let page = Page::builder(vec!["a", "b"])
///     .with_count(12)
///     .with_window(Pagination::new(10, 10)?)
///     .build();
///
/// assert!(!page.has_more());
/// assert_eq!(page.previous_offset(), Some(0));
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Total count of matching items across all pages.
    pub count: u64,
    /// Number of items skipped before this page.
    pub offset: u64,
    /// Requested page size.
    pub limit: u64,
}

impl<T> Page<T> {
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Whether matching items remain after this page.
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as u64) < self.count
    }

    /// Offset of the next page, if any.
    pub fn next_offset(&self) -> Option<u64> {
        self.has_more().then(|| self.offset + self.items.len() as u64)
    }

    /// Offset of the previous page, if this is not the first one.
    pub fn previous_offset(&self) -> Option<u64> {
        (self.offset > 0).then(|| self.offset.saturating_sub(self.limit))
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: 0,
            offset: 0,
            limit: 0,
        }
    }
}

/// Builder for [`Page`].
pub struct PageBuilder<T> {
    items: Vec<T>,
    count: u64,
    offset: u64,
    limit: u64,
}

impl<T> PageBuilder<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            count: 0,
            offset: 0,
            limit: 0,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Sets the window the page was read with.
    pub fn with_window(mut self, window: Pagination) -> Self {
        self.offset = window.offset();
        self.limit = window.limit();
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            count: self.count,
            offset: self.offset,
            limit: self.limit,
        }
    }
}
