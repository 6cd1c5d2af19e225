//! Convenient re-exports of commonly used types from doctable.
//!
//! ```ignore
//! use doctable::prelude::*;
//! ```

pub use doctable_core::{
    backend::{Namespace, StoreBackend, StoreBackendBuilder},
    catalog::{EntityCatalog, EntityConfig, EntityKind, EntityRegistry},
    entity::{Model, Patch, Selector, Table, View},
    error::{ConfigurationError, DocumentStoreError, DocumentStoreResult},
    fields::{FieldDef, FieldTable, FieldType},
    page::Page,
    query::{Criterion, FilterMap, SortDirection},
    session::{Connection, Session},
    trigger::{EventBus, ListenerBus, TriggerEvent, TriggerKind, UnitOfWork},
    value::{Document, Value},
};
