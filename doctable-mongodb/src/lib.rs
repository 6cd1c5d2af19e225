//! MongoDB backend implementation for doctable.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait. Queries
//! and writes are sent to the server as BSON; documents read back are converted to
//! canonical Extended JSON so the adapter normalizes them the same way for every backend.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! doctable = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! Connections are described by a [`MongoDbConfig`]. The `mgdb://` and `mongo://` scheme
//! aliases are accepted, and the database name falls back to the connection name.
//!
//! # Example
//!
//! ```ignore
//! use doctable::{prelude::*, mongodb::{MongoDbConfig, MongoDbStore}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MongoDbConfig::new("mongo://localhost:27017/shop");
//!     let store = MongoDbStore::builder(config, "main").build().await?;
//!     let connection = Connection::builder("main", store.clone())
//!         .schema(store.database())
//!         .build();
//!
//!     connection.close().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctable_mongodb;

pub mod config;
pub mod convert;
pub mod store;

pub use config::MongoDbConfig;
pub use store::{MongoDbStore, MongoDbStoreBuilder};
