//! Connections and sessions.
//!
//! A [`Connection`] owns the shared pieces: the store backend, the entity catalog, the
//! event bus and the field mapper. It hands out [`Session`]s, each of which is a
//! short-lived handle used by one caller at a time. Entity handles borrow their session
//! mutably, so a session can never be used concurrently.
//!
//! # Error sink
//!
//! Entity operations never return runtime errors directly. Every failure is logged,
//! stored as the session's last error and the bound unit of work is cancelled; the
//! operation then returns an absent or zero result. Callers inspect the failure with
//! [`Session::take_error`]:
//!
//! ```ignore
//! let mut session = connection.session();
//! let created = session.table("users")?.create(&document! { "name" => "Alice" }).await;
//!
//! if created.is_none() {
//!     eprintln!("create failed: {:?}", session.take_error());
//! }
//! ```

use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::StoreBackend,
    catalog::{EntityCatalog, EntityKind, EntityRegistry, FieldSpec},
    entity::{Entity, Model, Table, View},
    error::{ConfigurationError, DocumentStoreError, DocumentStoreResult},
    projection::{FieldMapper, TypedFieldMapper},
    trigger::{EventBus, NullEventBus, TriggerDispatcher, UnitOfWork},
    value::Document,
};

/// Snapshot of a connection's load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHealth {
    /// Number of sessions currently open.
    pub workload: usize,
}

struct ConnectionInner {
    name: String,
    schema: String,
    backend: Arc<dyn StoreBackend>,
    catalog: Arc<dyn EntityCatalog>,
    events: Arc<dyn EventBus>,
    mapper: Arc<dyn FieldMapper>,
    active: Mutex<usize>,
}

/// A named connection to a document store.
///
/// Cloning is cheap; clones share the backend and the session counter.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Starts building a connection named `name` over `backend`.
    pub fn builder(
        name: impl Into<String>,
        backend: impl StoreBackend + 'static,
    ) -> ConnectionBuilder {
        ConnectionBuilder::new(name, Arc::new(backend))
    }

    /// The connection name. Entity lookups scoped to this connection use it as prefix.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The schema (database) used by entities that do not override it.
    pub fn schema(&self) -> &str {
        &self.inner.schema
    }

    /// Opens a new session.
    pub fn session(&self) -> Session {
        let workload = {
            let mut active = self.inner.active.lock();
            *active += 1;
            *active
        };

        let session = Session {
            id: Uuid::new_v4(),
            connection: self.clone(),
            last_error: None,
        };
        debug!(session = %session.id, base = %self.inner.name, workload, "session opened");

        session
    }

    /// Reports how many sessions are open.
    pub fn health(&self) -> ConnectionHealth {
        ConnectionHealth {
            workload: *self.inner.active.lock(),
        }
    }

    /// Closes the underlying backend.
    ///
    /// # Errors
    ///
    /// Returns any error reported by the backend while releasing its resources.
    pub async fn close(&self) -> DocumentStoreResult<()> {
        info!(base = %self.inner.name, workload = self.health().workload, "closing connection");
        self.inner.backend.close().await
    }

    fn release(&self) {
        let mut active = self.inner.active.lock();
        *active = active.saturating_sub(1);
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.name)
            .field("schema", &self.inner.schema)
            .field("backend", &self.inner.backend)
            .field("workload", &*self.inner.active.lock())
            .finish()
    }
}

/// Builder for [`Connection`].
pub struct ConnectionBuilder {
    name: String,
    schema: Option<String>,
    backend: Arc<dyn StoreBackend>,
    catalog: Arc<dyn EntityCatalog>,
    events: Arc<dyn EventBus>,
    mapper: Arc<dyn FieldMapper>,
}

impl ConnectionBuilder {
    fn new(name: impl Into<String>, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            backend,
            catalog: Arc::new(EntityRegistry::new()),
            events: Arc::new(NullEventBus),
            mapper: Arc::new(TypedFieldMapper),
        }
    }

    /// Sets the default schema. Defaults to the connection name.
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn catalog(mut self, catalog: impl EntityCatalog + 'static) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn events(mut self, events: impl EventBus + 'static) -> Self {
        self.events = Arc::new(events);
        self
    }

    pub fn mapper(mut self, mapper: impl FieldMapper + 'static) -> Self {
        self.mapper = Arc::new(mapper);
        self
    }

    pub fn build(self) -> Connection {
        let schema = self.schema.unwrap_or_else(|| self.name.clone());
        info!(base = %self.name, %schema, "connection ready");

        Connection {
            inner: Arc::new(ConnectionInner {
                name: self.name,
                schema,
                backend: self.backend,
                catalog: self.catalog,
                events: self.events,
                mapper: self.mapper,
                active: Mutex::new(0),
            }),
        }
    }
}

/// A single caller's handle on a connection.
///
/// Dropping the session (or calling [`close`](Session::close)) releases it from the
/// connection's workload.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    connection: Connection,
    pub(crate) last_error: Option<DocumentStoreError>,
}

impl Session {
    /// Correlation id used in log records.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Name of the connection this session belongs to.
    pub fn base(&self) -> &str {
        self.connection.name()
    }

    /// Opens the table registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EntityNotFound`] when no definition matches.
    pub fn table(&mut self, name: &str) -> Result<Table<'_, 'static>, ConfigurationError> {
        let spec = self.resolve(EntityKind::Table, name)?;
        Ok(Entity::new(self, spec))
    }

    /// Opens the view registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EntityNotFound`] when no definition matches.
    pub fn view(&mut self, name: &str) -> Result<View<'_, 'static>, ConfigurationError> {
        let spec = self.resolve(EntityKind::View, name)?;
        Ok(Entity::new(self, spec))
    }

    /// Opens the model registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EntityNotFound`] when no definition matches.
    pub fn model(&mut self, name: &str) -> Result<Model<'_, 'static>, ConfigurationError> {
        let spec = self.resolve(EntityKind::Model, name)?;
        Ok(Entity::new(self, spec))
    }

    fn resolve(&self, kind: EntityKind, name: &str) -> Result<FieldSpec, ConfigurationError> {
        let inner = &self.connection.inner;
        FieldSpec::resolve(inner.catalog.as_ref(), kind, &inner.name, name, &inner.schema)
    }

    /// Starts manual mode: entity handles bound to the returned unit with
    /// [`Entity::within`] defer their lifecycle events into it.
    pub fn begin(&mut self) -> UnitOfWork {
        self.last_error = None;
        debug!(session = %self.id, "unit of work started");
        UnitOfWork::new()
    }

    /// Commits a unit of work. Transactions are not supported, so this always fails and
    /// the pending events are never flushed.
    pub fn commit(&mut self, unit: &mut UnitOfWork) -> DocumentStoreResult<()> {
        debug!(session = %self.id, pending = unit.len(), "commit requested");
        unit.commit()
    }

    /// Rolls back a unit of work. Always fails.
    pub fn rollback(&mut self, unit: &mut UnitOfWork) -> DocumentStoreResult<()> {
        unit.rollback()
    }

    /// The error captured by the last entity operation, if it failed.
    pub fn last_error(&self) -> Option<&DocumentStoreError> {
        self.last_error.as_ref()
    }

    /// Returns and clears the last captured error.
    pub fn take_error(&mut self) -> Option<DocumentStoreError> {
        self.last_error.take()
    }

    /// Sequence-based id generator. Not supported by this store.
    pub fn serial(&mut self, key: &str, _start: i64, _step: i64) -> DocumentStoreResult<i64> {
        debug!(session = %self.id, key, "serial requested");
        Err(DocumentStoreError::unsupported("serial"))
    }

    /// Drops a sequence-based id generator. Not supported by this store.
    pub fn break_serial(&mut self, key: &str) -> DocumentStoreResult<()> {
        debug!(session = %self.id, key, "break serial requested");
        Err(DocumentStoreError::unsupported("break_serial"))
    }

    /// Runs `work` inside a transaction. Not supported by this store, so `work` is never
    /// called.
    pub fn batch<F>(&mut self, _work: F) -> DocumentStoreResult<()>
    where
        F: FnOnce(&mut Session) -> DocumentStoreResult<()>,
    {
        Err(DocumentStoreError::unsupported("batch"))
    }

    /// Releases the session.
    pub fn close(self) {}

    pub(crate) fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.connection.inner.backend
    }

    pub(crate) fn events(&self) -> Arc<dyn EventBus> {
        self.connection.inner.events.clone()
    }

    pub(crate) fn mapper(&self) -> &dyn FieldMapper {
        self.connection.inner.mapper.as_ref()
    }

    /// Records a failed operation: logs it, stores it as the last error and cancels the
    /// bound unit of work. `context` carries the filter or update the operation was given.
    pub(crate) fn capture(
        &mut self,
        operation: &str,
        error: DocumentStoreError,
        entity: &str,
        context: &Document,
        dispatcher: &mut TriggerDispatcher<'_>,
    ) {
        if let Err(cancel) = dispatcher.cancel() {
            debug!(session = %self.id, error = %cancel, "unit of work not cancelled");
        }

        warn!(
            session = %self.id,
            base = %self.connection.inner.name,
            operation,
            entity,
            manual = dispatcher.is_manual(),
            ?context,
            error = %error,
            "document store operation failed"
        );
        self.last_error = Some(error);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.connection.release();
        debug!(session = %self.id, "session closed");
    }
}
