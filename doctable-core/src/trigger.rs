//! Lifecycle events emitted by table mutations.
//!
//! Every successful create, change and remove produces a [`TriggerEvent`]. How it is
//! delivered depends on the [`TriggerDispatcher`] the entity handle was opened with:
//!
//! - **Auto** (default): the event is published to the [`EventBus`] immediately.
//! - **Manual**: the handle is bound to a caller-owned [`UnitOfWork`] and the event is
//!   appended to it, in call order, to be flushed on commit.
//!
//! Transactions are not supported by this adapter, so [`UnitOfWork::commit`] always fails
//! and pending events are never flushed. They stay in the unit, where callers can inspect
//! them.

use std::{fmt, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Document, Value},
};

/// The kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Create,
    Change,
    Remove,
}

impl TriggerKind {
    /// The event-bus name events of this kind are published under.
    pub fn event_name(self) -> &'static str {
        match self {
            TriggerKind::Create => "data.create",
            TriggerKind::Change => "data.change",
            TriggerKind::Remove => "data.remove",
        }
    }
}

/// A lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    /// Name of the connection the session belongs to.
    pub base: String,
    /// Logical name of the table.
    pub table: String,
    /// The affected record, when known.
    pub entity: Option<Document>,
    /// Record before a change.
    pub before: Option<Document>,
    /// Record after a change.
    pub after: Option<Document>,
}

impl TriggerEvent {
    pub fn new(kind: TriggerKind, base: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            kind,
            base: base.into(),
            table: table.into(),
            entity: None,
            before: None,
            after: None,
        }
    }

    pub fn with_entity(mut self, entity: Document) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_change(mut self, before: Document, after: Document) -> Self {
        self.before = Some(before);
        self.after = Some(after);
        self
    }

    /// The event as a plain payload document.
    pub fn to_document(&self) -> Document {
        let mut payload = Document::new();
        payload.insert("base".to_string(), Value::from(self.base.as_str()));
        payload.insert("table".to_string(), Value::from(self.table.as_str()));

        let parts = [
            ("entity", &self.entity),
            ("before", &self.before),
            ("after", &self.after),
        ];
        for (name, part) in parts {
            if let Some(doc) = part {
                payload.insert(name.to_string(), Value::Document(doc.clone()));
            }
        }

        payload
    }
}

/// A named-event bus the adapter publishes lifecycle events to.
pub trait EventBus: Send + Sync + fmt::Debug {
    fn publish(&self, name: &str, event: &TriggerEvent);
}

/// An event bus that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventBus;

impl EventBus for NullEventBus {
    fn publish(&self, _name: &str, _event: &TriggerEvent) {}
}

/// A callback registered on a [`ListenerBus`].
pub type Listener = Arc<dyn Fn(&TriggerEvent) + Send + Sync>;

/// An event bus that calls registered listeners synchronously, in registration order.
#[derive(Clone, Default)]
pub struct ListenerBus {
    listeners: Arc<RwLock<Vec<(String, Listener)>>>,
}

impl ListenerBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for events published under `name`.
    pub fn subscribe<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&TriggerEvent) + Send + Sync + 'static,
    {
        self.listeners.write().push((name.into(), Arc::new(listener)));
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.read().is_empty()
    }
}

impl fmt::Debug for ListenerBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBus")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl EventBus for ListenerBus {
    fn publish(&self, name: &str, event: &TriggerEvent) {
        // Listeners run outside the lock so they may subscribe further listeners.
        let matching: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|(subscribed, _)| subscribed == name)
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in matching {
            listener(event);
        }
    }
}

/// A caller-owned unit of work collecting events raised in manual mode.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    pending: Vec<TriggerEvent>,
}

impl UnitOfWork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, in call order.
    pub fn pending(&self) -> &[TriggerEvent] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn record(&mut self, event: TriggerEvent) {
        self.pending.push(event);
    }

    /// Commits the unit and flushes its events.
    ///
    /// Always fails: the store transaction mechanism is not implemented, so the pending
    /// events are left in place and never dispatched.
    pub fn commit(&mut self) -> DocumentStoreResult<()> {
        Err(DocumentStoreError::unsupported("commit"))
    }

    /// Cancels the unit. Always fails, for the same reason as [`commit`](Self::commit).
    pub fn rollback(&mut self) -> DocumentStoreResult<()> {
        Err(DocumentStoreError::unsupported("rollback"))
    }
}

/// Routes lifecycle events either to the bus or into a unit of work.
pub enum TriggerDispatcher<'u> {
    Auto(Arc<dyn EventBus>),
    Manual(&'u mut UnitOfWork),
}

impl<'u> TriggerDispatcher<'u> {
    /// Fires or records `event`.
    pub fn dispatch(&mut self, event: TriggerEvent) {
        match self {
            TriggerDispatcher::Auto(bus) => {
                let name = event.kind.event_name();
                debug!(event = name, table = %event.table, "publishing trigger");
                bus.publish(name, &event);
            }
            TriggerDispatcher::Manual(unit) => {
                debug!(
                    event = event.kind.event_name(),
                    table = %event.table,
                    pending = unit.len() + 1,
                    "deferring trigger"
                );
                unit.record(event);
            }
        }
    }

    /// Cancels the bound unit of work, if any.
    pub fn cancel(&mut self) -> DocumentStoreResult<()> {
        match self {
            TriggerDispatcher::Auto(_) => Ok(()),
            TriggerDispatcher::Manual(unit) => unit.rollback(),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, TriggerDispatcher::Manual(_))
    }
}

impl fmt::Debug for TriggerDispatcher<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerDispatcher::Auto(bus) => f.debug_tuple("Auto").field(bus).finish(),
            TriggerDispatcher::Manual(unit) => f.debug_tuple("Manual").field(&unit.len()).finish(),
        }
    }
}
