#![allow(dead_code)]

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::{Stream, StreamExt, stream};
use parking_lot::Mutex;
use serde_json::{Value as JsonValue, json};

use doctable::{
    backend::{FindOptions, UpdateOutcome, WireStream},
    memory::InMemoryStore,
    prelude::*,
    query::SortSpec,
};

type Calls = Arc<Mutex<Vec<&'static str>>>;

/// In-memory store that records the name of every call it receives.
///
/// Cursors returned by `find` record `cursor_closed` when they are dropped.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    calls: Calls,
    broken_after: Option<usize>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every cursor yield a non-document entry after `count` documents.
    pub fn breaking_after(mut self, count: usize) -> Self {
        self.broken_after = Some(count);
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

struct RecordedCursor {
    inner: WireStream,
    calls: Calls,
}

impl Stream for RecordedCursor {
    type Item = DocumentStoreResult<JsonValue>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for RecordedCursor {
    fn drop(&mut self) {
        self.calls.lock().push("cursor_closed");
    }
}

#[async_trait]
impl StoreBackend for RecordingStore {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Document,
        options: FindOptions,
    ) -> DocumentStoreResult<WireStream> {
        self.record("find");
        let mut cursor = self.inner.find(namespace, filter, options).await?;
        if let Some(count) = self.broken_after {
            let garbage = JsonValue::String("not a document".to_string());
            cursor = cursor.take(count).chain(stream::iter([Ok(garbage)])).boxed();
        }

        Ok(RecordedCursor {
            inner: cursor,
            calls: self.calls.clone(),
        }
        .boxed())
    }

    async fn find_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        sort: &SortSpec,
    ) -> DocumentStoreResult<Option<JsonValue>> {
        self.record("find_one");
        self.inner.find_one(namespace, filter, sort).await
    }

    async fn insert_one(
        &self,
        namespace: &Namespace,
        document: Document,
    ) -> DocumentStoreResult<JsonValue> {
        self.record("insert_one");
        self.inner.insert_one(namespace, document).await
    }

    async fn update_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.record("update_one");
        self.inner.update_one(namespace, filter, update).await
    }

    async fn update_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
        update: &Document,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.record("update_many");
        self.inner.update_many(namespace, filter, update).await
    }

    async fn delete_one(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        self.record("delete_one");
        self.inner.delete_one(namespace, filter).await
    }

    async fn delete_many(
        &self,
        namespace: &Namespace,
        filter: &Document,
    ) -> DocumentStoreResult<u64> {
        self.record("delete_many");
        self.inner.delete_many(namespace, filter).await
    }

    async fn count(&self, namespace: &Namespace, filter: &Document) -> DocumentStoreResult<u64> {
        self.record("count");
        self.inner.count(namespace, filter).await
    }
}

/// Collects every published event.
pub fn recording_bus() -> (ListenerBus, Arc<Mutex<Vec<(String, TriggerEvent)>>>) {
    let bus = ListenerBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for kind in [TriggerKind::Create, TriggerKind::Change, TriggerKind::Remove] {
        let seen = seen.clone();
        bus.subscribe(kind.event_name(), move |event: &TriggerEvent| {
            seen.lock().push((kind.event_name().to_string(), event.clone()));
        });
    }

    (bus, seen)
}

pub fn user_fields() -> FieldTable {
    FieldTable::from([
        ("name".to_string(), FieldDef::new(FieldType::String)),
        ("age".to_string(), FieldDef::new(FieldType::Int32).nullable()),
        ("visits".to_string(), FieldDef::new(FieldType::Int64).with_default(json!(0))),
        ("changed".to_string(), FieldDef::new(FieldType::DateTime).nullable()),
    ])
}

/// Catalog with a typed `users` table, a schema-less `notes` table, a `people` view
/// and an `audience` model over the users collection.
pub fn catalog() -> EntityRegistry {
    EntityRegistry::new()
        .table("users", EntityConfig::new().fields(user_fields()))
        .table("notes", EntityConfig::new())
        .view("people", EntityConfig::new().collection("users").fields(user_fields()))
        .model("audience", EntityConfig::new().collection("users"))
}

pub fn connection(store: RecordingStore, events: ListenerBus) -> Connection {
    Connection::builder("main", store)
        .catalog(catalog())
        .events(events)
        .build()
}

pub async fn seed_users(session: &mut Session) {
    seed(session, &[("Alice", 31), ("Bob", 25), ("Carol", 40), ("Dave", 25)]).await;
}

pub async fn seed(session: &mut Session, people: &[(&str, i32)]) {
    let mut users = session.table("users").unwrap();
    for &(name, age) in people {
        users
            .create(&doctable::document! { "name" => name, "age" => age })
            .await
            .unwrap();
    }
}
