//! In-memory document storage backend for doctable.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Wire-faithful storage** - Documents are stored as canonical Extended JSON
//! - **Query documents** - Literal matches, `$or`/`$and`/`$nor` and the common field operators
//! - **Update operators** - `$set` and `$inc`
//!
//! # Quick Start
//!
//! ```ignore
//! use doctable::{document, prelude::*};
//! use doctable_memory::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::builder("main", InMemoryStore::new())
//!         .catalog(EntityRegistry::new().table("users", EntityConfig::new()))
//!         .build();
//!
//!     let mut session = connection.session();
//!     session.table("users")?.create(&document! { "name" => "Alice" }).await;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctable_memory;

pub mod evaluator;
pub mod modifier;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
