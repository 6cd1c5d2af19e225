mod common;

use common::{RecordingStore, connection, recording_bus, seed_users};
use doctable::{document, prelude::*};

#[tokio::test]
async fn create_projects_input_and_attaches_the_generated_key() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();

    let created = session
        .table("users")
        .unwrap()
        .create(&document! { "name" => "Alice", "age" => "31", "extra" => true })
        .await
        .unwrap();

    let id = created["_id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 24);
    assert_eq!(created["name"], Value::from("Alice"));
    assert_eq!(created["age"], Value::Int32(31));
    assert_eq!(created["visits"], Value::Int64(0));
    assert!(!created.contains_key("extra"));
    assert_eq!(store.calls(), ["insert_one"]);

    let events = seen.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "data.create");
    assert_eq!(events[0].1.base, "main");
    assert_eq!(events[0].1.table, "users");
    assert_eq!(events[0].1.entity.as_ref(), Some(&created));
    drop(events);

    let stored = session.table("users").unwrap().entity(id.as_str()).await.unwrap();
    assert_eq!(stored, created);
}

#[tokio::test]
async fn create_failures_are_captured_without_touching_the_store() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();

    let created = session.table("users").unwrap().create(&document! { "age" => 31 }).await;

    assert!(created.is_none());
    assert!(store.calls().is_empty());
    assert!(seen.lock().is_empty());
    assert!(matches!(
        session.take_error(),
        Some(DocumentStoreError::Mapping { entity, field, .. })
            if entity == "users" && field == "name"
    ));
    assert!(session.last_error().is_none());
}

#[tokio::test]
async fn schema_less_tables_keep_documents_and_caller_keys() {
    let connection = connection(RecordingStore::new(), ListenerBus::new());
    let mut session = connection.session();
    let mut notes = session.table("notes").unwrap();

    let created = notes
        .create(&document! { "_id" => "n1", "text" => "hello", "tags" => vec![Value::from("a")] })
        .await
        .unwrap();

    assert_eq!(created["_id"], Value::from("n1"));
    assert_eq!(notes.entity("n1").await, Some(created));
}

#[tokio::test]
async fn change_updates_the_record_and_emits_before_and_after() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();
    let mut users = session.table("users").unwrap();

    let alice = users.create(&document! { "name" => "Alice", "age" => 31 }).await.unwrap();
    store.clear();

    let after = users
        .change(&alice, &document! { "name" => "Alicia", "$inc" => document! { "visits" => 2 } })
        .await
        .unwrap();

    assert_eq!(store.calls(), ["update_one"]);
    assert_eq!(after["name"], Value::from("Alicia"));
    assert_eq!(after["age"], Value::Int32(31));
    assert!(matches!(after["changed"], Value::DateTime(_)));

    let id = alice["_id"].clone();
    let stored = users.entity(id).await.unwrap();
    assert_eq!(stored["name"], Value::from("Alicia"));
    assert_eq!(stored["visits"], Value::Int64(2));
    assert!(matches!(stored["changed"], Value::DateTime(_)));

    let events = seen.lock();
    let (name, change) = &events[1];
    assert_eq!(name, "data.change");
    assert_eq!(change.before.as_ref(), Some(&alice));
    assert_eq!(change.after.as_ref(), Some(&after));
    assert_eq!(change.entity.as_ref(), Some(&after));
}

#[tokio::test]
async fn change_keeps_a_supplied_changed_value() {
    let connection = connection(RecordingStore::new(), ListenerBus::new());
    let mut session = connection.session();
    let mut users = session.table("users").unwrap();

    let alice = users.create(&document! { "name" => "Alice" }).await.unwrap();
    let after = users
        .change(&alice, &document! { "changed" => "2024-01-01T00:00:00Z" })
        .await
        .unwrap();

    assert!(matches!(
        &after["changed"],
        Value::DateTime(at) if at.to_rfc3339() == "2024-01-01T00:00:00+00:00"
    ));
}

#[tokio::test]
async fn change_without_a_key_fails_before_any_store_call() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();

    let result = session
        .table("users")
        .unwrap()
        .change(&document! { "name" => "Alice" }, &document! { "name" => "Bob" })
        .await;

    assert!(result.is_none());
    assert!(store.calls().is_empty());
    assert!(seen.lock().is_empty());
    assert!(matches!(
        session.take_error(),
        Some(DocumentStoreError::MissingKey { key, .. }) if key == "_id"
    ));
}

#[tokio::test]
async fn change_with_an_empty_patch_is_rejected() {
    let store = RecordingStore::new();
    let connection = connection(store.clone(), ListenerBus::new());
    let mut session = connection.session();

    let notes = document! { "_id" => "n1", "text" => "hi" };
    session.table("notes").unwrap().create(&notes).await.unwrap();
    store.clear();

    let result = session.table("notes").unwrap().change(&notes, &document! {}).await;

    assert!(result.is_none());
    assert!(store.calls().is_empty());
    assert!(matches!(session.take_error(), Some(DocumentStoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn remove_of_a_missing_record_issues_no_delete() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();

    let removed = session
        .table("users")
        .unwrap()
        .remove("65a1b2c3d4e5f60718293a4b")
        .await;

    assert!(removed.is_none());
    assert_eq!(store.calls(), ["find_one"]);
    assert!(seen.lock().is_empty());
    assert!(matches!(
        session.take_error(),
        Some(DocumentStoreError::DocumentNotFound(_, table)) if table == "users"
    ));
}

#[tokio::test]
async fn remove_returns_the_deleted_record() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();
    seed_users(&mut session).await;

    let mut users = session.table("users").unwrap();
    let bob = users.first(&[FilterMap::new().eq("name", "Bob")]).await.unwrap();
    store.clear();

    let removed = users.remove(&bob).await;

    assert_eq!(removed.as_ref(), Some(&bob));
    assert_eq!(store.calls(), ["find_one", "delete_one"]);
    assert_eq!(users.count(&[]).await, 3);

    let events = seen.lock();
    let (name, event) = events.last().unwrap();
    assert_eq!(name, "data.remove");
    assert_eq!(event.entity.as_ref(), Some(&bob));
}

#[tokio::test]
async fn remove_with_a_filter_lacking_the_key_is_rejected() {
    let store = RecordingStore::new();
    let connection = connection(store.clone(), ListenerBus::new());
    let mut session = connection.session();

    let removed = session.table("users").unwrap().remove(document! { "name" => "Bob" }).await;

    assert!(removed.is_none());
    assert!(store.calls().is_empty());
    assert!(matches!(session.take_error(), Some(DocumentStoreError::MissingKey { .. })));
}

#[tokio::test]
async fn delete_removes_every_match_and_emits_one_event() {
    let (bus, seen) = recording_bus();
    let connection = connection(RecordingStore::new(), bus);
    let mut session = connection.session();
    seed_users(&mut session).await;
    seen.lock().clear();

    let mut users = session.table("users").unwrap();
    let deleted = users.delete(document! { "age" => 25 }).await;

    assert_eq!(deleted, 2);
    assert_eq!(users.count(&[]).await, 2);

    let events = seen.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "data.remove");
    assert!(events[0].1.entity.is_none());
}

#[tokio::test]
async fn update_modifies_matches_without_emitting() {
    let store = RecordingStore::new();
    let (bus, seen) = recording_bus();
    let connection = connection(store.clone(), bus);
    let mut session = connection.session();
    seed_users(&mut session).await;
    seen.lock().clear();
    store.clear();

    let mut users = session.table("users").unwrap();
    let modified = users.update(&document! { "age" => "26" }, document! { "age" => 25 }).await;

    assert_eq!(modified, 2);
    assert_eq!(store.calls(), ["update_many"]);
    assert!(seen.lock().is_empty());
    assert_eq!(users.count(&[FilterMap::new().eq("age", 26)]).await, 2);
}

#[tokio::test]
async fn update_applies_increments() {
    let connection = connection(RecordingStore::new(), ListenerBus::new());
    let mut session = connection.session();
    seed_users(&mut session).await;

    let mut users = session.table("users").unwrap();
    let increment = document! { "inc" => document! { "visits" => 3 } };
    let modified = users.update(&increment, document! {}).await;

    assert_eq!(modified, 4);
    assert_eq!(users.count(&[FilterMap::new().eq("visits", 3_i64)]).await, 4);
}

#[tokio::test]
async fn update_requires_declared_fields() {
    let store = RecordingStore::new();
    let connection = connection(store.clone(), ListenerBus::new());
    let mut session = connection.session();

    let modified = session
        .table("notes")
        .unwrap()
        .update(&document! { "text" => "x" }, document! {})
        .await;

    assert_eq!(modified, 0);
    assert!(store.calls().is_empty());
    assert!(matches!(
        session.take_error(),
        Some(DocumentStoreError::Mapping { field, .. }) if field == "*"
    ));
}
