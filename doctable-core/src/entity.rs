//! Entity handles: tables, views and models.
//!
//! An [`Entity`] is opened from a [`Session`] and bound to one resolved [`FieldSpec`].
//! The kind marker decides which operations are available:
//!
//! | handle | reads | writes |
//! |---|---|---|
//! | [`View`] | filter-map reads (`count`, `first`, `query`, `limit`, `entity`, `group`) | none |
//! | [`Table`] | same as a view | `create`, `change`, `remove`, `delete`, `update` |
//! | [`Model`] | raw query reads (`first`, `query`), streaming (`range`, `limit_range`) | none |
//!
//! Every public operation follows the same contract: the session's last error is cleared,
//! the operation runs, and any failure is routed through the session's error sink while
//! the operation itself returns an absent or zero result.
//!
//! Reads always pass through [`normalize`](crate::normalize) and then the field projector.
//! Writes project the caller's document first, then issue exactly one store call, then
//! fire (or defer) their lifecycle event.

use std::{fmt, marker::PhantomData, ops::ControlFlow, sync::Arc};

use bson::oid::ObjectId;
use chrono::Utc;
use futures::TryStreamExt;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    backend::{FindOptions, Namespace, StoreBackend},
    catalog::{EntityKind, FieldSpec},
    error::{DocumentStoreError, DocumentStoreResult},
    normalize::{normalize_document, normalize_value},
    page::Page,
    projection::FieldProjector,
    query::{
        DEFAULT_PAGE_SIZE, FilterMap, Pagination, QueryBuilder, SortSpec, StoreQuery, stream_cap,
    },
    session::Session,
    trigger::{TriggerDispatcher, TriggerEvent, TriggerKind, UnitOfWork},
    value::{Document, Value},
};

/// Field stamped with the current time on change, when the table declares it.
pub const CHANGED_FIELD: &str = "changed";

/// Spellings of the increment directive accepted in a patch. The later one wins.
const INCREMENT_KEYS: [&str; 2] = ["$inc", "inc"];

/// Marker for the kind of entity a handle was opened as.
pub trait EntityMarker {
    const KIND: EntityKind;
}

/// Entity kinds readable through filter maps.
pub trait FilteredReads: EntityMarker {}

#[derive(Debug, Clone, Copy)]
pub struct TableKind;

#[derive(Debug, Clone, Copy)]
pub struct ViewKind;

#[derive(Debug, Clone, Copy)]
pub struct ModelKind;

impl EntityMarker for TableKind {
    const KIND: EntityKind = EntityKind::Table;
}

impl EntityMarker for ViewKind {
    const KIND: EntityKind = EntityKind::View;
}

impl EntityMarker for ModelKind {
    const KIND: EntityKind = EntityKind::Model;
}

impl FilteredReads for TableKind {}
impl FilteredReads for ViewKind {}

pub type Table<'s, 'u> = Entity<'s, 'u, TableKind>;
pub type View<'s, 'u> = Entity<'s, 'u, ViewKind>;
pub type Model<'s, 'u> = Entity<'s, 'u, ModelKind>;

/// A proposed change: the values to set plus an optional increment directive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub values: Document,
    pub increment: Option<Value>,
}

impl Patch {
    /// Splits the increment directive (`$inc` or `inc`) off `values`.
    pub fn new(mut values: Document) -> Self {
        let mut increment = None;
        for key in INCREMENT_KEYS {
            if let Some(directive) = values.remove(key).filter(|v| !v.is_null()) {
                increment = Some(directive);
            }
        }

        Self { values, increment }
    }

    /// Builds the store update document for already projected values.
    fn into_update(self, projected: Document) -> DocumentStoreResult<Document> {
        let mut update = Document::new();
        if !projected.is_empty() {
            update.insert("$set".to_string(), Value::Document(projected));
        }
        if let Some(increment) = self.increment {
            update.insert("$inc".to_string(), increment);
        }

        if update.is_empty() {
            return Err(DocumentStoreError::invalid_argument("nothing to update"));
        }
        Ok(update)
    }
}

impl From<Document> for Patch {
    fn from(values: Document) -> Self {
        Patch::new(values)
    }
}

/// Which records a write applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// A query document. For single-record writes only its key entry is used.
    Filter(Document),
    /// A key value; hex strings are tried as object ids first.
    Id(String),
    ObjectId(ObjectId),
}

impl From<Document> for Selector {
    fn from(filter: Document) -> Self {
        Selector::Filter(filter)
    }
}

impl From<&Document> for Selector {
    fn from(filter: &Document) -> Self {
        Selector::Filter(filter.clone())
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Selector::Id(id.to_string())
    }
}

impl From<String> for Selector {
    fn from(id: String) -> Self {
        Selector::Id(id)
    }
}

impl From<ObjectId> for Selector {
    fn from(id: ObjectId) -> Self {
        Selector::ObjectId(id)
    }
}

/// Resolves a key value for querying: strings that parse as object ids become object ids.
pub fn resolve_key(id: &Value) -> Value {
    match id {
        Value::String(s) => ObjectId::parse_str(s)
            .map(Value::ObjectId)
            .unwrap_or_else(|_| id.clone()),
        other => other.clone(),
    }
}

/// A handle on one table, view or model.
pub struct Entity<'s, 'u, K> {
    session: &'s mut Session,
    spec: FieldSpec,
    dispatcher: TriggerDispatcher<'u>,
    kind: PhantomData<fn() -> K>,
}

impl<'s, K: EntityMarker> Entity<'s, 'static, K> {
    pub(crate) fn new(session: &'s mut Session, spec: FieldSpec) -> Self {
        debug_assert_eq!(spec.kind, K::KIND);
        let dispatcher = TriggerDispatcher::Auto(session.events());

        Self {
            session,
            spec,
            dispatcher,
            kind: PhantomData,
        }
    }
}

impl<'s, 'u, K: EntityMarker> Entity<'s, 'u, K> {
    /// Binds the handle to `unit`: lifecycle events are deferred into it instead of being
    /// published.
    pub fn within<'v>(self, unit: &'v mut UnitOfWork) -> Entity<'s, 'v, K> {
        Entity {
            session: self.session,
            spec: self.spec,
            dispatcher: TriggerDispatcher::Manual(unit),
            kind: PhantomData,
        }
    }

    /// The resolved entity definition.
    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    fn backend(&self) -> Arc<dyn StoreBackend> {
        self.session.backend().clone()
    }

    fn namespace(&self) -> Namespace {
        self.spec.namespace()
    }

    fn projector(&self) -> FieldProjector<'_> {
        FieldProjector::new(&self.spec, self.session.mapper())
    }

    /// Normalizes and projects a wire document read from the store.
    fn decode(&self, wire: JsonValue) -> DocumentStoreResult<Document> {
        let document = normalize_document(wire)?;
        self.projector().read(&document)
    }

    fn key_filter(&self, id: &Value) -> Document {
        let mut filter = Document::new();
        filter.insert(self.spec.key.clone(), resolve_key(id));
        filter
    }

    /// Clears the previous error and routes a failure through the error sink.
    ///
    /// `context` is the filter or update the operation ran with; it is only logged.
    fn settle<T>(
        &mut self,
        operation: &str,
        context: &Document,
        result: DocumentStoreResult<T>,
    ) -> Option<T> {
        self.session.last_error = None;

        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.session.capture(
                    operation,
                    error,
                    &self.spec.name,
                    context,
                    &mut self.dispatcher,
                );
                None
            }
        }
    }

    fn emit(&mut self, event: TriggerEvent) {
        self.dispatcher.dispatch(event);
    }

    fn event(&self, kind: TriggerKind) -> TriggerEvent {
        TriggerEvent::new(kind, self.session.base(), &self.spec.name)
    }

    async fn try_find_one(
        &self,
        filter: &Document,
        sort: &SortSpec,
    ) -> DocumentStoreResult<Option<Document>> {
        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, ?filter, "find one");

        match self.backend().find_one(&namespace, filter, sort).await? {
            Some(wire) => self.decode(wire).map(Some),
            None => Ok(None),
        }
    }

    async fn try_find(
        &self,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<Document>> {
        let namespace = self.namespace();
        debug!(
            entity = %self.spec.name,
            %namespace,
            ?filter,
            skip = ?options.skip,
            limit = ?options.limit,
            "find"
        );

        let wires: Vec<JsonValue> = self
            .backend()
            .find(&namespace, filter, options)
            .await?
            .try_collect()
            .await?;
        wires.into_iter().map(|wire| self.decode(wire)).collect()
    }

    async fn try_count(&self, filter: &Document) -> DocumentStoreResult<u64> {
        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, ?filter, "count");

        self.backend().count(&namespace, filter).await
    }

    async fn try_limit(
        &self,
        window: Pagination,
        query: &StoreQuery,
    ) -> DocumentStoreResult<Page<Document>> {
        let count = self.try_count(&query.filter).await?;

        let options = FindOptions {
            sort: query.sort.clone(),
            skip: (window.offset() > 0).then_some(window.offset()),
            limit: (window.limit() > 0).then_some(window.limit()),
        };
        let items = self.try_find(&query.filter, options).await?;

        Ok(Page::builder(items)
            .with_count(count)
            .with_window(window)
            .build())
    }

    async fn try_range<F>(
        &self,
        cap: Option<u64>,
        query: &StoreQuery,
        next: &mut F,
    ) -> DocumentStoreResult<u64>
    where
        F: FnMut(Document) -> ControlFlow<()>,
    {
        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, filter = ?query.filter, ?cap, "range");

        let options = FindOptions {
            sort: query.sort.clone(),
            skip: None,
            limit: cap,
        };
        let mut stream = self.backend().find(&namespace, &query.filter, options).await?;

        let mut delivered = 0;
        while let Some(wire) = stream.try_next().await? {
            let document = self.decode(wire)?;
            delivered += 1;

            if next(document).is_break() || cap.is_some_and(|cap| delivered >= cap) {
                break;
            }
        }
        drop(stream);

        Ok(delivered)
    }
}

impl<'s, 'u, K: FilteredReads> Entity<'s, 'u, K> {
    /// Counts the documents matching `filters`.
    pub async fn count(&mut self, filters: &[FilterMap]) -> u64 {
        let query = QueryBuilder::build(filters);
        let result = self.try_count(&query.filter).await;
        self.settle("data.count", &query.filter, result).unwrap_or_default()
    }

    /// Returns the first document matching `filters` under their sort.
    pub async fn first(&mut self, filters: &[FilterMap]) -> Option<Document> {
        let query = QueryBuilder::build(filters);
        let result = self.try_find_one(&query.filter, &query.sort).await;
        self.settle("data.first", &query.filter, result).flatten()
    }

    /// Returns every document matching `filters`.
    pub async fn query(&mut self, filters: &[FilterMap]) -> Vec<Document> {
        let query = QueryBuilder::build(filters);
        let options = FindOptions {
            sort: query.sort.clone(),
            ..FindOptions::default()
        };
        let result = self.try_find(&query.filter, options).await;
        self.settle("data.query", &query.filter, result).unwrap_or_default()
    }

    /// Returns one page of the documents matching `filters` together with their total count.
    ///
    /// A limit of zero reads to the end. Negative offsets or limits are rejected.
    pub async fn limit(
        &mut self,
        offset: impl Into<i64>,
        limit: impl Into<i64>,
        filters: &[FilterMap],
    ) -> Page<Document> {
        let query = QueryBuilder::build(filters);
        let result = match Pagination::new(offset, limit) {
            Ok(window) => self.try_limit(window, &query).await,
            Err(error) => Err(error),
        };
        self.settle("data.limit", &query.filter, result).unwrap_or_default()
    }

    /// Like [`limit`](Self::limit) with the default page size of [`DEFAULT_PAGE_SIZE`].
    pub async fn page(&mut self, offset: impl Into<i64>, filters: &[FilterMap]) -> Page<Document> {
        self.limit(offset, DEFAULT_PAGE_SIZE, filters).await
    }

    /// Returns the document whose key equals `id`.
    pub async fn entity(&mut self, id: impl Into<Value>) -> Option<Document> {
        let filter = self.key_filter(&id.into());
        let result = self.try_find_one(&filter, &SortSpec::new()).await;
        self.settle("data.entity", &filter, result).flatten()
    }

    /// Groups documents by `field`. Aggregation is not supported, so this always fails.
    pub async fn group(&mut self, field: &str, filters: &[FilterMap]) -> Vec<Document> {
        debug!(entity = %self.spec.name, field, "group requested");
        let query = QueryBuilder::build(filters);
        let result: DocumentStoreResult<Vec<Document>> =
            Err(DocumentStoreError::unsupported("group"));
        self.settle("data.group", &query.filter, result).unwrap_or_default()
    }
}

impl<'s, 'u> Entity<'s, 'u, ModelKind> {
    /// Returns the first document matching a raw query document.
    pub async fn first(&mut self, query: &Document) -> Option<Document> {
        let result = self.try_find_one(query, &SortSpec::new()).await;
        self.settle("data.first", query, result).flatten()
    }

    /// Returns every document matching a raw query document.
    pub async fn query(&mut self, query: &Document) -> Vec<Document> {
        let result = self.try_find(query, FindOptions::default()).await;
        self.settle("data.query", query, result).unwrap_or_default()
    }

    /// Streams every document matching `filters` to `next`. See [`limit_range`](Self::limit_range).
    pub async fn range<F>(&mut self, filters: &[FilterMap], next: F) -> u64
    where
        F: FnMut(Document) -> ControlFlow<()>,
    {
        self.limit_range(0, filters, next).await
    }

    /// Streams up to `limit` documents matching `filters` to `next`, one at a time.
    ///
    /// A limit of zero is unbounded. Returning [`ControlFlow::Break`] from `next` stops the
    /// stream; the cursor is closed before this returns. Returns the number of documents
    /// delivered.
    pub async fn limit_range<F>(
        &mut self,
        limit: impl Into<i64>,
        filters: &[FilterMap],
        mut next: F,
    ) -> u64
    where
        F: FnMut(Document) -> ControlFlow<()>,
    {
        let query = QueryBuilder::build(filters);
        let result = match stream_cap(limit) {
            Ok(cap) => self.try_range(cap, &query, &mut next).await,
            Err(error) => Err(error),
        };
        self.settle("data.range", &query.filter, result).unwrap_or_default()
    }
}

impl<'s, 'u> Entity<'s, 'u, TableKind> {
    /// Inserts `input` and returns the stored record with its key attached.
    pub async fn create(&mut self, input: &Document) -> Option<Document> {
        let result = self.try_create(input).await;
        self.settle("data.create", input, result)
    }

    /// Applies `patch` to the `existing` record and returns the post-image.
    ///
    /// `existing` must carry the table's key. When the table declares a `changed` field
    /// that `patch` does not supply, it is stamped with the current time.
    pub async fn change(&mut self, existing: &Document, patch: &Document) -> Option<Document> {
        let result = self.try_change(existing, patch).await;
        self.settle("data.change", patch, result)
    }

    /// Deletes the single record addressed by `selector` and returns it.
    ///
    /// Fails without deleting anything when the record does not exist.
    pub async fn remove(&mut self, selector: impl Into<Selector>) -> Option<Document> {
        let selector = selector.into();
        let context = self.selector_filter(selector.clone());
        let result = self.try_remove(selector).await;
        self.settle("data.remove", &context, result)
    }

    /// Deletes every record matching `selector` and returns how many were deleted.
    pub async fn delete(&mut self, selector: impl Into<Selector>) -> u64 {
        let filter = self.selector_filter(selector.into());
        let result = self.try_delete(&filter).await;
        self.settle("data.delete", &filter, result).unwrap_or_default()
    }

    /// Applies `patch` to every record matching `selector` and returns how many were
    /// modified. Bulk updates fire no lifecycle event, and require declared fields.
    pub async fn update(&mut self, patch: &Document, selector: impl Into<Selector>) -> u64 {
        let filter = self.selector_filter(selector.into());
        let result = self.try_update(patch, &filter).await;

        let mut context = Document::new();
        context.insert("filter".to_string(), Value::Document(filter));
        context.insert("update".to_string(), Value::Document(patch.clone()));
        self.settle("data.update", &context, result).unwrap_or_default()
    }

    fn selector_filter(&self, selector: Selector) -> Document {
        match selector {
            Selector::Filter(filter) => filter,
            Selector::Id(id) => self.key_filter(&Value::String(id)),
            Selector::ObjectId(id) => self.key_filter(&Value::ObjectId(id)),
        }
    }

    fn missing_key(&self) -> DocumentStoreError {
        DocumentStoreError::MissingKey {
            entity: self.spec.name.clone(),
            key: self.spec.key.clone(),
        }
    }

    async fn try_create(&mut self, input: &Document) -> DocumentStoreResult<Document> {
        let mut value = self.projector().create(input)?;

        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, "insert one");
        let inserted = self.backend().insert_one(&namespace, value.clone()).await?;

        let key = &self.spec.key;
        if key == "_id" || !value.contains_key(key) {
            value.insert(key.clone(), normalize_value(inserted));
        }

        let event = self.event(TriggerKind::Create).with_entity(value.clone());
        self.emit(event);

        Ok(value)
    }

    async fn try_change(
        &mut self,
        existing: &Document,
        patch: &Document,
    ) -> DocumentStoreResult<Document> {
        let id = existing
            .get(&self.spec.key)
            .filter(|id| !id.is_null())
            .ok_or_else(|| self.missing_key())?;

        let mut patch = Patch::new(patch.clone());
        let stamp = self.spec.fields.contains_key(CHANGED_FIELD)
            && patch.values.get(CHANGED_FIELD).is_none_or(Value::is_null);
        if stamp {
            patch.values.insert(CHANGED_FIELD.to_string(), Value::DateTime(Utc::now()));
        }

        let projected = self.projector().patch(&patch.values)?;
        let update = patch.into_update(projected.clone())?;
        let filter = self.key_filter(id);

        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, ?filter, "update one");
        self.backend().update_one(&namespace, &filter, &update).await?;

        let mut after = existing.clone();
        after.extend(projected);

        let event = self
            .event(TriggerKind::Change)
            .with_entity(after.clone())
            .with_change(existing.clone(), after.clone());
        self.emit(event);

        Ok(after)
    }

    async fn try_remove(&mut self, selector: Selector) -> DocumentStoreResult<Document> {
        let id = match selector {
            Selector::Filter(filter) => filter
                .get(&self.spec.key)
                .cloned()
                .ok_or_else(|| self.missing_key())?,
            Selector::Id(id) => Value::String(id),
            Selector::ObjectId(id) => Value::ObjectId(id),
        };
        let filter = self.key_filter(&id);

        let entity = self
            .try_find_one(&filter, &SortSpec::new())
            .await?
            .ok_or_else(|| {
                DocumentStoreError::DocumentNotFound(id.to_string(), self.spec.name.clone())
            })?;

        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, ?filter, "delete one");
        self.backend().delete_one(&namespace, &filter).await?;

        let event = self.event(TriggerKind::Remove).with_entity(entity.clone());
        self.emit(event);

        Ok(entity)
    }

    async fn try_delete(&mut self, filter: &Document) -> DocumentStoreResult<u64> {
        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, ?filter, "delete many");
        let deleted = self.backend().delete_many(&namespace, filter).await?;

        let event = self.event(TriggerKind::Remove);
        self.emit(event);

        Ok(deleted)
    }

    async fn try_update(
        &mut self,
        patch: &Document,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        if !self.spec.has_fields() {
            return Err(DocumentStoreError::Mapping {
                entity: self.spec.name.clone(),
                field: "*".to_string(),
                reason: "bulk updates require declared fields".to_string(),
            });
        }

        let patch = Patch::new(patch.clone());
        let projected = self.projector().patch(&patch.values)?;
        let update = patch.into_update(projected)?;

        let namespace = self.namespace();
        debug!(entity = %self.spec.name, %namespace, ?filter, "update many");
        let outcome = self.backend().update_many(&namespace, filter, &update).await?;

        Ok(outcome.modified)
    }
}

impl<K> fmt::Debug for Entity<'_, '_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("session", &self.session.id())
            .field("spec", &self.spec)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document;

    #[test]
    fn hex_strings_resolve_to_object_ids() {
        let hex = "65a1b2c3d4e5f60718293a4b";

        assert!(matches!(
            resolve_key(&Value::from(hex)),
            Value::ObjectId(oid) if oid.to_hex() == hex
        ));
        assert_eq!(resolve_key(&Value::from("user-1")), Value::from("user-1"));
        assert_eq!(resolve_key(&Value::Int64(7)), Value::Int64(7));
    }

    #[test]
    fn plain_inc_overrides_dollar_inc() {
        let patch = Patch::new(document! {
            "name" => "Bob",
            "$inc" => document! { "visits" => 1 },
            "inc" => document! { "visits" => 5 },
        });

        assert_eq!(patch.values, document! { "name" => "Bob" });
        assert_eq!(patch.increment, Some(Value::Document(document! { "visits" => 5 })));
    }

    #[test]
    fn update_documents_skip_empty_sets() {
        let only_inc = Patch::new(document! { "$inc" => document! { "n" => 1 } })
            .into_update(Document::new())
            .unwrap();
        assert_eq!(only_inc, document! { "$inc" => document! { "n" => 1 } });

        let nothing = Patch::new(Document::new()).into_update(Document::new());
        assert!(matches!(nothing, Err(DocumentStoreError::InvalidArgument(_))));
    }
}
