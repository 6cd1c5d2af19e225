//! Main doctable crate: a table/view/model adapter over JSON document stores.
//!
//! This crate is the primary entry point. It re-exports the core types from the
//! sub-crates and gives access to the storage backends.
//!
//! # Features
//!
//! - **Entity handles** - Tables, views and models resolved from a catalog by logical name
//! - **Wire normalization** - Extended JSON from any backend becomes native [`value::Value`]s
//! - **Field projection** - Declared fields are converted to their types on every read and write
//! - **Lifecycle events** - Creates, changes and removes are published to an event bus, or
//!   deferred into a unit of work
//! - **Error sink** - Operations return absent or zero results; the failure is kept on the session
//!
//! # Quick Start
//!
//! ```ignore
//! use doctable::{document, prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fields = FieldTable::from([
//!         ("name".to_string(), FieldDef::new(FieldType::String)),
//!         ("age".to_string(), FieldDef::new(FieldType::Int32).nullable()),
//!     ]);
//!     let connection = Connection::builder("main", InMemoryStore::new())
//!         .catalog(EntityRegistry::new().table("users", EntityConfig::new().fields(fields)))
//!         .build();
//!
//!     let mut session = connection.session();
//!     let mut users = session.table("users")?;
//!
//!     let alice = users.create(&document! { "name" => "Alice", "age" => "31" }).await;
//!     let adults = users.count(&[FilterMap::new().eq("age", 31)]).await;
//!     println!("{alice:?} {adults}");
//!
//!     drop(users);
//!     if let Some(error) = session.take_error() {
//!         eprintln!("last operation failed: {error}");
//!     }
//!
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Manual mode
//!
//! Entity handles bound to a [`UnitOfWork`](trigger::UnitOfWork) defer their lifecycle
//! events instead of publishing them:
//!
//! ```ignore
//! let mut unit = session.begin();
//! session.table("users")?.within(&mut unit).create(&document! { "name" => "Bob" }).await;
//! assert_eq!(unit.len(), 1);
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use doctable_core::{
    backend, catalog, document, entity, error, fields, normalize, page, projection, query, session,
    trigger, value, wire,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use doctable_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doctable_mongodb::{MongoDbConfig, MongoDbStore, MongoDbStoreBuilder};
}
