//! Translation of filter maps into store queries.
//!
//! Callers describe what they want as a sequence of [`FilterMap`]s. Each entry in a map is
//! either a literal match constraint or a sort directive for that field:
//!
//! ```ignore
//! use doctable::query::{FilterMap, QueryBuilder};
//!
//! let adults = FilterMap::new().eq("age", 30).asc("status");
//! let admins = FilterMap::new().eq("role", "admin");
//!
//! let query = QueryBuilder::build(&[adults, admins]);
//! // filter: {"$or": [{"age": 30}, {"role": "admin"}]}
//! // sort:   [status: +1]
//! ```
//!
//! # Combination semantics
//!
//! - Literal entries within one map combine with AND, since they form one query document.
//! - Maps combine with OR. A single non-empty map is used as the query directly; two or
//!   more are wrapped in `{"$or": [...]}`; no literal entries at all match everything.
//! - Sort entries from every map accumulate into one ordered [`SortSpec`]. A later entry
//!   for the same field overwrites the direction of the earlier one.
//!
//! Counting and paging must build their predicate with [`QueryBuilder::build`] so the
//! count and the page always describe the same set of documents.

use indexmap::IndexMap;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Document, Value},
};

/// Page size used when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl SortDirection {
    /// The store's numeric spelling of this direction.
    pub fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// An ordered sort specification: field name to direction.
pub type SortSpec = IndexMap<String, SortDirection>;

/// What a single [`FilterMap`] entry asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// The field must equal this value (or satisfy it, if it is an operator document).
    Match(Value),
    /// The field participates in the sort order instead of the filter.
    Sort(SortDirection),
}

/// A caller-supplied mapping combining match constraints and sort directives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterMap {
    entries: IndexMap<String, Criterion>,
}

impl FilterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a literal match constraint.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(field.into(), Criterion::Match(value.into()));
        self
    }

    /// Marks `field` as an ascending sort key.
    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.entries.insert(field.into(), Criterion::Sort(SortDirection::Asc));
        self
    }

    /// Marks `field` as a descending sort key.
    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.entries.insert(field.into(), Criterion::Sort(SortDirection::Desc));
        self
    }

    /// Inserts an entry, replacing any earlier entry for the same field.
    pub fn insert(&mut self, field: impl Into<String>, criterion: Criterion) {
        self.entries.insert(field.into(), criterion);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Criterion)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Document> for FilterMap {
    /// Every entry of a plain document is a match constraint.
    fn from(document: Document) -> Self {
        Self {
            entries: document
                .into_iter()
                .map(|(field, value)| (field, Criterion::Match(value)))
                .collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Criterion)> for FilterMap {
    fn from_iter<T: IntoIterator<Item = (K, Criterion)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(field, criterion)| (field.into(), criterion))
                .collect(),
        }
    }
}

/// A store query: the predicate document and the sort specification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreQuery {
    /// The query document handed to the store. Empty matches every document.
    pub filter: Document,
    /// The ordered sort specification.
    pub sort: SortSpec,
}

impl StoreQuery {
    /// Wraps a raw query document without any sort.
    pub fn raw(filter: Document) -> Self {
        Self {
            filter,
            sort: SortSpec::new(),
        }
    }
}

/// Builds [`StoreQuery`]s from filter maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Builds the query for a sequence of filter maps.
    pub fn build(filters: &[FilterMap]) -> StoreQuery {
        let mut sort = SortSpec::new();
        let mut clauses = Vec::with_capacity(filters.len());

        for filter in filters {
            let mut clause = Document::new();

            for (field, criterion) in filter.iter() {
                match criterion {
                    Criterion::Sort(direction) => {
                        sort.insert(field.clone(), *direction);
                    }
                    Criterion::Match(value) => {
                        clause.insert(field.clone(), value.clone());
                    }
                }
            }

            if !clause.is_empty() {
                clauses.push(clause);
            }
        }

        let filter = match clauses.len() {
            0 => Document::new(),
            1 => clauses.remove(0),
            _ => {
                let mut filter = Document::new();
                filter.insert(
                    "$or".to_string(),
                    Value::Array(clauses.into_iter().map(Value::Document).collect()),
                );
                filter
            }
        };

        StoreQuery { filter, sort }
    }
}

/// Offset and page size for ranged reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    offset: u64,
    limit: u64,
}

impl Pagination {
    /// Creates pagination from native 32- or 64-bit integers.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidArgument`] if either value is negative.
    pub fn new(offset: impl Into<i64>, limit: impl Into<i64>) -> DocumentStoreResult<Self> {
        let (offset, limit) = (offset.into(), limit.into());

        if limit < 0 {
            return Err(DocumentStoreError::invalid_argument(format!("negative limit {limit}")));
        }
        if offset < 0 {
            return Err(DocumentStoreError::invalid_argument(format!("negative offset {offset}")));
        }

        Ok(Self {
            offset: offset as u64,
            limit: limit as u64,
        })
    }

    /// Number of documents to skip.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Maximum number of documents on the page.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE as u64,
        }
    }
}

/// Converts a streaming cap into an optional bound, where zero means unbounded.
///
/// # Errors
///
/// Returns [`DocumentStoreError::InvalidArgument`] if `limit` is negative.
pub fn stream_cap(limit: impl Into<i64>) -> DocumentStoreResult<Option<u64>> {
    match limit.into() {
        0 => Ok(None),
        limit if limit < 0 => Err(DocumentStoreError::invalid_argument(format!(
            "negative limit {limit}"
        ))),
        limit => Ok(Some(limit as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    #[test]
    fn sort_sentinels_never_leak_into_the_filter() {
        let query = QueryBuilder::build(&[FilterMap::new().asc("status").eq("age", 30)]);

        assert_eq!(query.filter, document! { "age" => 30 });
        assert_eq!(
            query.sort.into_iter().collect::<Vec<_>>(),
            vec![("status".to_string(), SortDirection::Asc)]
        );
    }

    #[test]
    fn two_maps_combine_with_or() {
        let query =
            QueryBuilder::build(&[FilterMap::new().eq("a", 1), FilterMap::new().eq("b", 2)]);

        assert_eq!(
            query.filter,
            document! {
                "$or" => vec![
                    Value::from(document! { "a" => 1 }),
                    Value::from(document! { "b" => 2 }),
                ],
            }
        );
    }

    #[test]
    fn one_map_is_used_without_or_wrapper() {
        let query = QueryBuilder::build(&[FilterMap::new().eq("a", 1).eq("b", 2)]);
        assert_eq!(query.filter, document! { "a" => 1, "b" => 2 });
    }

    #[test]
    fn sort_only_maps_do_not_contribute_clauses() {
        let query = QueryBuilder::build(&[
            FilterMap::new().desc("created"),
            FilterMap::new().eq("a", 1),
        ]);

        assert_eq!(query.filter, document! { "a" => 1 });
        assert_eq!(query.sort.get("created"), Some(&SortDirection::Desc));
    }

    #[test]
    fn no_maps_match_everything() {
        let query = QueryBuilder::build(&[]);
        assert!(query.filter.is_empty());
        assert!(query.sort.is_empty());
    }

    #[test]
    fn later_sort_entries_overwrite_direction_in_place() {
        let query = QueryBuilder::build(&[
            FilterMap::new().asc("a").asc("b"),
            FilterMap::new().desc("a"),
        ]);

        assert_eq!(
            query.sort.into_iter().collect::<Vec<_>>(),
            vec![
                ("a".to_string(), SortDirection::Desc),
                ("b".to_string(), SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn building_twice_yields_identical_queries() {
        let filters = [
            FilterMap::new().eq("a", 1).asc("a"),
            FilterMap::new().eq("b", "x").desc("c"),
        ];
        assert_eq!(QueryBuilder::build(&filters), QueryBuilder::build(&filters));
    }

    #[test]
    fn pagination_accepts_both_integer_widths() {
        let narrow = Pagination::new(5_i32, 20_i32).unwrap();
        let wide = Pagination::new(5_i64, 20_i64).unwrap();

        assert_eq!(narrow, wide);
        assert_eq!(narrow.offset(), 5);
        assert_eq!(narrow.limit(), 20);
        assert_eq!(Pagination::default().limit(), 10);
    }

    #[test]
    fn negative_limits_are_rejected() {
        assert!(matches!(Pagination::new(0, -1), Err(DocumentStoreError::InvalidArgument(_))));
        assert!(matches!(stream_cap(-3), Err(DocumentStoreError::InvalidArgument(_))));
        assert_eq!(stream_cap(0).unwrap(), None);
        assert_eq!(stream_cap(4).unwrap(), Some(4));
    }
}
