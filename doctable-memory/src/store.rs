//! In-memory storage implementation for document stores.
//!
//! Documents are kept per namespace in insertion order, as canonical Extended JSON
//! produced by the wire encoder, behind an async-safe read-write lock. Reads hand the
//! stored wire documents back unchanged, so callers normalize them exactly as they would
//! documents coming from a real server.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::{StreamExt, stream};
use indexmap::IndexMap;
use mea::rwlock::RwLock;
use serde_json::Value as JsonValue;
use tracing::debug;

use doctable_core::{
    backend::{FindOptions, Namespace, StoreBackend, StoreBackendBuilder, UpdateOutcome, WireStream},
    error::{DocumentStoreError, DocumentStoreResult},
    normalize::normalize_document,
    query::SortSpec,
    value::{Document, Value},
    wire::{encode_document, encode_value},
};

use crate::{
    evaluator::{DocumentEvaluator, sort_documents},
    modifier::apply_update,
};

/// Stored documents of one collection, keyed by the wire form of their `_id`.
type CollectionMap = IndexMap<String, JsonValue>;
type StoreMap = HashMap<Namespace, CollectionMap>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to
/// be shared across sessions and tasks. Clones share the same data.
///
/// Queries scan every document of a collection; there is no indexing.
///
/// # Example
///
/// ```ignore
/// use doctable_memory::InMemoryStore;
/// use doctable::{backend::{Namespace, StoreBackend}, document};
///
/// let store = InMemoryStore::new();
/// let users = Namespace::new("app", "users");
///
/// let id = store.insert_one(&users, document! { "name" => "Alice" }).await?;
/// assert_eq!(store.count(&users, &document! {}).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// namespace -> (wire id -> wire document)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder
    }

    /// Lists the namespaces holding at least one document.
    pub async fn namespaces(&self) -> Vec<Namespace> {
        self.store
            .read()
            .await
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(namespace, _)| namespace.clone())
            .collect()
    }
}

fn id_key(id: &Value) -> DocumentStoreResult<String> {
    Ok(serde_json::to_string(&encode_value(id))?)
}

fn encode(document: &Document) -> JsonValue {
    JsonValue::Object(encode_document(document))
}

/// Returns `(position, normalized document)` for every stored document matching `filter`,
/// sorted by `sort`.
fn select(
    collection: &CollectionMap,
    filter: &Document,
    sort: &SortSpec,
) -> DocumentStoreResult<Vec<(usize, Document)>> {
    let normalized = collection
        .values()
        .enumerate()
        .map(|(position, wire)| Ok((position, normalize_document(wire.clone())?)))
        .collect::<DocumentStoreResult<Vec<_>>>()?;

    let mut matched = DocumentEvaluator::filter_documents(normalized, filter)?;
    sort_documents(&mut matched, sort);

    Ok(matched)
}

impl InMemoryStore {
    async fn update(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
        many: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let mut store = self.store.write().await;
        let Some(collection) = store.get_mut(namespace) else {
            return Ok(UpdateOutcome::default());
        };

        let mut matched = select(collection, filter, &SortSpec::new())?;
        if !many {
            matched.truncate(1);
        }

        // Apply everything before writing anything back so a failing update leaves the
        // collection untouched.
        let mut changed = Vec::new();
        for (position, mut document) in matched.iter().cloned() {
            if apply_update(&mut document, update)? {
                changed.push((position, encode(&document)));
            }
        }

        let outcome = UpdateOutcome {
            matched: matched.len() as u64,
            modified: changed.len() as u64,
        };
        for (position, mut wire) in changed {
            if let Some((_, slot)) = collection.get_index_mut(position) {
                // Normalized ids are plain strings; keep the stored wire form.
                if let (JsonValue::Object(fresh), Some(id)) = (&mut wire, slot.get("_id")) {
                    fresh.insert("_id".to_string(), id.clone());
                }
                *slot = wire;
            }
        }

        debug!(
            %namespace,
            matched = outcome.matched,
            modified = outcome.modified,
            "in-memory update"
        );
        Ok(outcome)
    }

    async fn delete(
        &self,
        namespace: &Namespace,
        filter: &Document,
        many: bool,
    ) -> DocumentStoreResult<u64> {
        let mut store = self.store.write().await;
        let Some(collection) = store.get_mut(namespace) else {
            return Ok(0);
        };

        let mut positions: Vec<usize> = select(collection, filter, &SortSpec::new())?
            .into_iter()
            .map(|(position, _)| position)
            .collect();
        if !many {
            positions.truncate(1);
        }

        // Highest first so earlier positions stay valid.
        positions.sort_unstable_by(|a, b| b.cmp(a));
        for position in &positions {
            collection.shift_remove_index(*position);
        }

        debug!(%namespace, deleted = positions.len(), "in-memory delete");
        Ok(positions.len() as u64)
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<WireStream> {
        let store = self.store.read().await;
        let Some(collection) = store.get(namespace) else {
            return Ok(stream::empty().boxed());
        };

        let documents: Vec<DocumentStoreResult<JsonValue>> =
            select(collection, filter, &options.sort)?
                .into_iter()
                .skip(options.skip.unwrap_or(0) as usize)
                .take(options.limit.map_or(usize::MAX, |limit| limit as usize))
                .filter_map(|(position, _)| {
                    collection
                        .get_index(position)
                        .map(|(_, wire)| Ok(wire.clone()))
                })
                .collect();

        Ok(stream::iter(documents).boxed())
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        sort: &SortSpec,
    ) -> DocumentStoreResult<Option<JsonValue>> {
        let store = self.store.read().await;
        let Some(collection) = store.get(namespace) else {
            return Ok(None);
        };

        Ok(select(collection, filter, sort)?
            .first()
            .and_then(|(position, _)| collection.get_index(*position))
            .map(|(_, wire)| wire.clone()))
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        mut document: Document,
    ) -> DocumentStoreResult<JsonValue> {
        let id = document
            .entry("_id".to_string())
            .or_insert_with(|| Value::ObjectId(ObjectId::new()))
            .clone();
        let key = id_key(&id)?;

        let mut store = self.store.write().await;
        let collection = store.entry(namespace.clone()).or_default();

        if collection.contains_key(&key) {
            return Err(DocumentStoreError::Backend(format!("duplicate key {id} in {namespace}")));
        }
        collection.insert(key, encode(&document));

        debug!(%namespace, %id, "in-memory insert");
        Ok(encode_value(&id))
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update(namespace, filter, update, false).await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update(namespace, filter, update, true).await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        self.delete(namespace, filter, false).await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        self.delete(namespace, filter, true).await
    }

    async fn count(&self, namespace: &Namespace, filter: &Document) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;
        match store.get(namespace) {
            Some(collection) => Ok(select(collection, filter, &SortSpec::new())?.len() as u64),
            None => Ok(0),
        }
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctable_core::{document, query::SortDirection};
    use futures::TryStreamExt;
    use serde_json::json;

    fn users() -> Namespace {
        Namespace::new("app", "users")
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (name, age) in [("Alice", 31), ("Bob", 25), ("Carol", 40)] {
            store.insert_one(&users(), document! { "name" => name, "age" => age }).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn inserts_generate_object_ids_in_wire_form() {
        let store = InMemoryStore::new();
        let id = store.insert_one(&users(), document! { "name" => "Alice" }).await.unwrap();

        assert!(id.get("$oid").and_then(JsonValue::as_str).is_some());

        let stored = store
            .find_one(&users(), &Document::new(), &SortSpec::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["_id"], id);
        assert_eq!(stored["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryStore::new();
        store.insert_one(&users(), document! { "_id" => "u1" }).await.unwrap();

        let err = store.insert_one(&users(), document! { "_id" => "u1" }).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::Backend(_)));
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let store = seeded().await;
        let options = FindOptions {
            sort: SortSpec::from([("age".to_string(), SortDirection::Desc)]),
            skip: Some(1),
            limit: Some(1),
        };

        let found: Vec<JsonValue> = store
            .find(&users(), &Document::new(), options)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["name"], json!("Alice"));
    }

    #[tokio::test]
    async fn updates_count_matched_and_modified() {
        let store = seeded().await;
        let filter = document! { "age" => document! { "$gte" => 30 } };

        let outcome = store
            .update_many(&users(), &filter, &document! { "$set" => document! { "senior" => true } })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome {
                matched: 2,
                modified: 2,
            }
        );

        let again = store
            .update_many(&users(), &filter, &document! { "$set" => document! { "senior" => true } })
            .await
            .unwrap();
        assert_eq!(
            again,
            UpdateOutcome {
                matched: 2,
                modified: 0,
            }
        );

        assert_eq!(store.count(&users(), &document! { "senior" => true }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_updates_leave_documents_untouched() {
        let store = seeded().await;
        let result = store
            .update_many(
                &users(),
                &Document::new(),
                &document! { "$inc" => document! { "name" => 1 } },
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.count(&users(), &document! { "name" => "Alice" }).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_one_removes_a_single_match() {
        let store = seeded().await;

        assert_eq!(store.delete_one(&users(), &Document::new()).await.unwrap(), 1);
        assert_eq!(store.count(&users(), &Document::new()).await.unwrap(), 2);
        assert_eq!(store.delete_many(&users(), &Document::new()).await.unwrap(), 2);
        assert!(store.namespaces().await.is_empty());
    }
}
