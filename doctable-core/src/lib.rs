//! A table/view/model abstraction over document stores.
//!
//! This crate is the core of the doctable project and provides:
//!
//! - **Value model** ([`value`]) - Native values and documents used above the store boundary
//! - **Normalization** ([`normalize`]) - Canonicalization of Extended JSON wire documents
//! - **Wire encoding** ([`wire`]) - The inverse direction, used by backends that store wire
//!   documents
//! - **Query building** ([`query`]) - Translation of filter maps into store queries and sort specs
//! - **Field definitions** ([`fields`]) and **projection** ([`projection`]) - Declarative field
//!   mapping
//! - **Entity catalog** ([`catalog`]) - Configuration and resolution of tables, views and models
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing different storage
//!   backends
//! - **Sessions** ([`session`]) and **entity handles** ([`entity`]) - The operations callers use
//! - **Lifecycle events** ([`trigger`]) - Event bus and unit-of-work deferral
//! - **Error handling** ([`error`]) - Error types and result types
//! - **Paging** ([`page`]) - Paged read results
//!
//! # Example
//!
//! ```ignore
//! use doctable::{document, prelude::*};
//!
//! let connection = Connection::builder("main", InMemoryStore::new())
//!     .catalog(EntityRegistry::new().table("users", EntityConfig::new()))
//!     .build();
//!
//! let mut session = connection.session();
//! let mut users = session.table("users")?;
//!
//! let alice = users.create(&document! { "name" => "Alice", "age" => 30 }).await;
//! let adults = users.count(&[FilterMap::new().eq("age", 30)]).await;
//! ```

#[allow(unused_extern_crates)]
extern crate self as doctable_core;

pub mod backend;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod fields;
pub mod normalize;
pub mod page;
pub mod projection;
pub mod query;
pub mod session;
pub mod trigger;
pub mod value;
pub mod wire;
