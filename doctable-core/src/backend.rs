//! Storage backend abstraction.
//!
//! The [`StoreBackend`] trait is the store boundary: the standard document-store
//! operations (find, find-one, insert-one, update-one, update-many, delete-one,
//! delete-many, count) addressed by a [`Namespace`] and a query document.
//!
//! Queries and writes go in as native [`Document`]s. Everything a backend reads comes back
//! in wire form (Extended JSON), and the adapter normalizes it before use, so every read
//! path goes through [`normalize`](crate::normalize).
//!
//! # Examples
//!
//! ```ignore
//! use doctable::{backend::{Namespace, StoreBackend}, document};
//!
//! let users = Namespace::new("app", "users");
//! let id = backend.insert_one(&users, document! { "name" => "Alice" }).await?;
//! let count = backend.count(&users, &document! { "name" => "Alice" }).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value as JsonValue;

use crate::{error::DocumentStoreResult, query::SortSpec, value::Document};

/// A forward-only stream of wire documents. Dropping it closes the underlying cursor.
pub type WireStream = BoxStream<'static, DocumentStoreResult<JsonValue>>;

/// Where a collection lives: schema (database) and collection name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub schema: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(schema: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.collection)
    }
}

/// Sorting and paging applied to a find.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: SortSpec,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Counts reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// Abstract interface for document storage backends.
///
/// Implementations must be thread-safe: a single backend is shared by every session of a
/// connection. Update documents use the store's operator syntax (`$set`, `$inc`).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Streams the documents matching `filter`.
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<WireStream>;

    /// Returns the first document matching `filter` under `sort`, if any.
    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        sort: &SortSpec,
    ) -> DocumentStoreResult<Option<JsonValue>>;

    /// Inserts a document and returns its `_id` in wire form. Backends generate an object
    /// id when the document has no `_id`.
    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
    ) -> DocumentStoreResult<JsonValue>;

    /// Applies `update` to the first document matching `filter`.
    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies `update` to every document matching `filter`.
    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes the first document matching `filter` and returns the deleted count.
    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64>;

    /// Deletes every document matching `filter` and returns the deleted count.
    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64>;

    /// Counts the documents matching `filter`.
    async fn count(&self, namespace: &Namespace, filter: &Document) -> DocumentStoreResult<u64>;

    /// Releases connections held by the backend. The default is a no-op.
    async fn close(&self) -> DocumentStoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<WireStream> {
        (**self).find(namespace, filter, options).await
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        sort: &SortSpec,
    ) -> DocumentStoreResult<Option<JsonValue>> {
        (**self).find_one(namespace, filter, sort).await
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
    ) -> DocumentStoreResult<JsonValue> {
        (**self).insert_one(namespace, document).await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self).update_one(namespace, filter, update).await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self).update_many(namespace, filter, update).await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        (**self).delete_one(namespace, filter).await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        (**self).delete_many(namespace, filter).await
    }

    async fn count(&self, namespace: &Namespace, filter: &Document) -> DocumentStoreResult<u64> {
        (**self).count(namespace, filter).await
    }

    async fn close(&self) -> DocumentStoreResult<()> {
        (**self).close().await
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
