//! Entity configuration lookup and resolution.
//!
//! Tables, views and models are configured under logical names. A session resolves a
//! logical name to a [`FieldSpec`] by trying three keys in order, the first match winning:
//!
//! 1. `{caller}.{name}`: a definition scoped to the calling connection,
//! 2. `*.{name}`: a definition shared by every connection,
//! 3. `{name}`: the bare name.
//!
//! A missing definition is a [`ConfigurationError`], never a runtime error.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{backend::Namespace, error::ConfigurationError, fields::FieldTable};

/// The primary-key field used when an entity does not declare one.
pub const DEFAULT_KEY: &str = "_id";

/// The kinds of entity a catalog can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Table,
    View,
    Model,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Table => "table",
            EntityKind::View => "view",
            EntityKind::Model => "model",
        })
    }
}

/// Configuration of a single entity as it is declared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Storage schema (database) override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Storage collection name override.
    #[serde(
        default,
        alias = "table",
        alias = "view",
        alias = "model",
        skip_serializing_if = "Option::is_none"
    )]
    pub collection: Option<String>,
    /// Primary-key field override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Declared fields. Empty means the entity is schema-less.
    #[serde(default)]
    pub fields: FieldTable,
}

impl EntityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn fields(mut self, fields: FieldTable) -> Self {
        self.fields = fields;
        self
    }
}

/// Source of entity configurations.
pub trait EntityCatalog: Send + Sync + fmt::Debug {
    /// Returns the configuration registered under exactly `key`.
    fn lookup(&self, kind: EntityKind, key: &str) -> Option<&EntityConfig>;
}

/// An in-memory [`EntityCatalog`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRegistry {
    #[serde(default)]
    tables: HashMap<String, EntityConfig>,
    #[serde(default)]
    views: HashMap<String, EntityConfig>,
    #[serde(default)]
    models: HashMap<String, EntityConfig>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity configuration under `key`, replacing any earlier one.
    pub fn register(
        &mut self,
        kind: EntityKind,
        key: impl Into<String>,
        config: EntityConfig,
    ) -> &mut Self {
        self.entries_mut(kind).insert(key.into(), config);
        self
    }

    pub fn table(mut self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.register(EntityKind::Table, key, config);
        self
    }

    pub fn view(mut self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.register(EntityKind::View, key, config);
        self
    }

    pub fn model(mut self, key: impl Into<String>, config: EntityConfig) -> Self {
        self.register(EntityKind::Model, key, config);
        self
    }

    fn entries(&self, kind: EntityKind) -> &HashMap<String, EntityConfig> {
        match kind {
            EntityKind::Table => &self.tables,
            EntityKind::View => &self.views,
            EntityKind::Model => &self.models,
        }
    }

    fn entries_mut(&mut self, kind: EntityKind) -> &mut HashMap<String, EntityConfig> {
        match kind {
            EntityKind::Table => &mut self.tables,
            EntityKind::View => &mut self.views,
            EntityKind::Model => &mut self.models,
        }
    }
}

impl EntityCatalog for EntityRegistry {
    fn lookup(&self, kind: EntityKind, key: &str) -> Option<&EntityConfig> {
        self.entries(kind).get(key)
    }
}

/// A fully resolved entity: where it lives and what it exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub kind: EntityKind,
    /// The logical name the entity was requested under.
    pub name: String,
    /// Storage schema (database) name.
    pub schema: String,
    /// Storage collection name, with dots flattened to underscores.
    pub collection: String,
    /// Primary-key field name.
    pub key: String,
    /// Declared fields.
    pub fields: FieldTable,
}

impl FieldSpec {
    /// Resolves `name` through the three-tier lookup.
    ///
    /// `caller` is the name of the calling connection, `default_schema` the schema used
    /// when the configuration does not override it.
    pub fn resolve(
        catalog: &dyn EntityCatalog,
        kind: EntityKind,
        caller: &str,
        name: &str,
        default_schema: &str,
    ) -> Result<Self, ConfigurationError> {
        let keys = [format!("{caller}.{name}"), format!("*.{name}"), name.to_string()];

        let config = keys
            .iter()
            .find_map(|key| catalog.lookup(kind, key))
            .ok_or_else(|| ConfigurationError::EntityNotFound { kind, name: name.to_string() })?;

        let collection = config
            .collection
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(name)
            .replace('.', "_");

        Ok(Self {
            kind,
            name: name.to_string(),
            schema: config
                .schema
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| default_schema.to_string()),
            collection,
            key: config
                .key
                .clone()
                .filter(|k| !k.is_empty())
                .unwrap_or_else(|| DEFAULT_KEY.to_string()),
            fields: config.fields.clone(),
        })
    }

    /// Where the entity's documents live in the store.
    pub fn namespace(&self) -> Namespace {
        Namespace::new(&self.schema, &self.collection)
    }

    /// Whether the entity declares any fields.
    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}
