//! Field projection between external documents and stored documents.
//!
//! [`FieldProjector`] applies an entity's declared [`FieldTable`] to a document. When the
//! entity declares no fields the document passes through unchanged, so the adapter works
//! schema-less. The structural work is delegated to a [`FieldMapper`]; the default is
//! [`TypedFieldMapper`].
//!
//! Two flags shape a projection:
//!
//! - `partial`: missing fields are tolerated instead of defaulted (updates).
//! - `strict`: a field that cannot be converted fails the call. Without it the offending
//!   value passes through as-is.
//!
//! The entity's primary key is carried through reads and full writes even when it is not
//! declared, and stripped from partial writes.

use std::fmt::Debug;

use crate::{
    catalog::FieldSpec,
    error::{DocumentStoreError, DocumentStoreResult},
    fields::FieldTable,
    value::{Document, Value},
};

/// A single field that could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub field: String,
    pub reason: String,
}

/// Structural mapper from a source document to a target document under a field table.
pub trait FieldMapper: Send + Sync + Debug {
    /// Maps `source` into a new document containing only the fields of `fields`.
    fn map(
        &self,
        fields: &FieldTable,
        source: &Document,
        partial: bool,
        strict: bool,
    ) -> Result<Document, FieldFailure>;
}

/// Field mapper that converts every declared field to its declared type.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedFieldMapper;

impl FieldMapper for TypedFieldMapper {
    fn map(
        &self,
        fields: &FieldTable,
        source: &Document,
        partial: bool,
        strict: bool,
    ) -> Result<Document, FieldFailure> {
        let mut target = Document::new();

        for (name, def) in fields {
            let failure = |reason: String| FieldFailure {
                field: name.clone(),
                reason,
            };

            match source.get(name) {
                Some(Value::Null) => {
                    if def.nullable || !strict {
                        target.insert(name.clone(), Value::Null);
                    } else {
                        return Err(failure("field is not nullable".to_string()));
                    }
                }
                Some(value) => match def.kind.coerce(value) {
                    Ok(converted) => {
                        target.insert(name.clone(), converted);
                    }
                    Err(reason) if strict => return Err(failure(reason)),
                    Err(_) => {
                        target.insert(name.clone(), value.clone());
                    }
                },
                None if partial => {}
                None => match def.default_value() {
                    Some(default) => match def.kind.coerce(&default) {
                        Ok(converted) => {
                            target.insert(name.clone(), converted);
                        }
                        Err(reason) if strict => {
                            return Err(failure(format!("invalid default: {reason}")));
                        }
                        Err(_) => {
                            target.insert(name.clone(), default);
                        }
                    },
                    None if def.nullable || !strict => {}
                    None => return Err(failure("field is required".to_string())),
                },
            }
        }

        Ok(target)
    }
}

/// Applies an entity's field table to documents.
#[derive(Debug)]
pub struct FieldProjector<'a> {
    spec: &'a FieldSpec,
    mapper: &'a dyn FieldMapper,
}

impl<'a> FieldProjector<'a> {
    pub fn new(spec: &'a FieldSpec, mapper: &'a dyn FieldMapper) -> Self {
        Self { spec, mapper }
    }

    /// Projects a document with explicit flags.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Mapping`] naming the entity and the failing field.
    pub fn project(
        &self,
        source: &Document,
        partial: bool,
        strict: bool,
    ) -> DocumentStoreResult<Document> {
        if !self.spec.has_fields() {
            let mut target = source.clone();
            if partial {
                target.remove(&self.spec.key);
            }
            return Ok(target);
        }

        let mut target = self
            .mapper
            .map(&self.spec.fields, source, partial, strict)
            .map_err(|failure| DocumentStoreError::Mapping {
                entity: self.spec.name.clone(),
                field: failure.field,
                reason: failure.reason,
            })?;

        let key = &self.spec.key;
        if partial {
            target.remove(key);
        } else if let Some(id) = source.get(key) {
            target.entry(key.clone()).or_insert_with(|| id.clone());
        }

        Ok(target)
    }

    /// Projects a normalized stored document into its external form (best effort).
    pub fn read(&self, stored: &Document) -> DocumentStoreResult<Document> {
        self.project(stored, false, false)
    }

    /// Projects a complete external document for insertion.
    pub fn create(&self, input: &Document) -> DocumentStoreResult<Document> {
        self.project(input, false, true)
    }

    /// Projects a partial external document for an update.
    pub fn patch(&self, input: &Document) -> DocumentStoreResult<Document> {
        self.project(input, true, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{EntityKind, DEFAULT_KEY},
        document,
        fields::{FieldDef, FieldType},
    };
    use serde_json::json;

    fn spec(fields: FieldTable) -> FieldSpec {
        FieldSpec {
            kind: EntityKind::Table,
            name: "users".into(),
            schema: "app".into(),
            collection: "users".into(),
            key: DEFAULT_KEY.into(),
            fields,
        }
    }

    fn user_fields() -> FieldTable {
        FieldTable::from([
            ("name".to_string(), FieldDef::new(FieldType::String)),
            ("age".to_string(), FieldDef::new(FieldType::Int32).nullable()),
            ("active".to_string(), FieldDef::new(FieldType::Bool).with_default(json!(true))),
        ])
    }

    #[test]
    fn passes_through_when_no_fields_are_declared() {
        let spec = spec(FieldTable::new());
        let projector = FieldProjector::new(&spec, &TypedFieldMapper);
        let source = document! { "anything" => 1, "goes" => "here" };

        assert_eq!(projector.create(&source).unwrap(), source);
        assert_eq!(projector.patch(&source).unwrap(), source);
    }

    #[test]
    fn keeps_only_declared_fields_and_converts_them() {
        let spec = spec(user_fields());
        let projector = FieldProjector::new(&spec, &TypedFieldMapper);

        let created = projector
            .create(&document! { "name" => "Alice", "age" => "31", "extra" => 1 })
            .unwrap();

        assert_eq!(created, document! { "name" => "Alice", "age" => 31, "active" => true });
    }

    #[test]
    fn strict_failures_name_the_entity_and_field() {
        let spec = spec(user_fields());
        let projector = FieldProjector::new(&spec, &TypedFieldMapper);

        let err = projector.create(&document! { "name" => "Alice", "age" => "old" }).unwrap_err();
        match err {
            DocumentStoreError::Mapping { entity, field, .. } => {
                assert_eq!(entity, "users");
                assert_eq!(field, "age");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_required_fields_fail_full_writes_only() {
        let spec = spec(user_fields());
        let projector = FieldProjector::new(&spec, &TypedFieldMapper);

        assert!(projector.create(&document! { "age" => 3 }).is_err());
        assert_eq!(projector.patch(&document! { "age" => 3 }).unwrap(), document! { "age" => 3 });
    }

    #[test]
    fn reads_pass_offending_values_through() {
        let spec = spec(user_fields());
        let projector = FieldProjector::new(&spec, &TypedFieldMapper);

        let read = projector
            .read(&document! { "_id" => "abc", "name" => "Bob", "age" => "unknown" })
            .unwrap();

        assert_eq!(
            read,
            document! { "_id" => "abc", "name" => "Bob", "age" => "unknown", "active" => true }
        );
    }

    #[test]
    fn partial_projections_strip_the_key() {
        let user_spec = spec(user_fields());
        let projector = FieldProjector::new(&user_spec, &TypedFieldMapper);

        let patch = projector.patch(&document! { "_id" => "abc", "name" => "Bob" }).unwrap();
        assert_eq!(patch, document! { "name" => "Bob" });

        let schemaless = spec(FieldTable::new());
        let projector = FieldProjector::new(&schemaless, &TypedFieldMapper);
        let patch = projector.patch(&document! { "_id" => "abc", "free" => 1 }).unwrap();
        assert_eq!(patch, document! { "free" => 1 });
    }
}
