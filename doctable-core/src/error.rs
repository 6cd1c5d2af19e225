//! Error types and result types for adapter operations.
//!
//! Two families are kept apart by severity:
//!
//! - [`ConfigurationError`] is returned when an entity (table, view, model) cannot be
//!   resolved. It signals a deployment or programming mistake and is never captured by a
//!   session's error sink.
//! - [`DocumentStoreError`] covers everything that can go wrong at runtime. Entity
//!   operations capture it as the session's last error.
//!
//! Use [`DocumentStoreResult<T>`] as the return type for fallible runtime operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::catalog::EntityKind;

/// A fatal lookup failure for an entity definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No configuration matched any of the lookup keys for the entity.
    #[error("{kind} not found: {name}")]
    EntityNotFound {
        /// What kind of entity was requested.
        kind: EntityKind,
        /// The logical name that was requested.
        name: String,
    },
}

/// Represents all runtime errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during store initialization or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// The requested document was not found in the collection.
    /// The first argument is the document key, the second is the entity name.
    #[error("Document not found {0} in {1}")]
    DocumentNotFound(String, String),
    /// A wire document could not be normalized at all (it was not a document).
    #[error("Normalization error: {0}")]
    Normalization(String),
    /// Field projection failed for a single field of an entity.
    #[error("Mapping error on {entity}.{field}: {reason}")]
    Mapping {
        /// The logical entity name.
        entity: String,
        /// The external field name that failed.
        field: String,
        /// Why the field could not be mapped.
        reason: String,
    },
    /// The existing record handed to a change did not carry its primary key.
    #[error("Missing primary key {key} on {entity}")]
    MissingKey {
        /// The logical entity name.
        entity: String,
        /// The primary-key field name.
        key: String,
    },
    /// A caller-supplied argument is out of range or of the wrong shape.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The operation is not supported by this adapter.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DocumentStoreError {
    /// Builds an [`Unsupported`](DocumentStoreError::Unsupported) error for the named operation.
    pub fn unsupported(operation: &str) -> Self {
        DocumentStoreError::Unsupported(operation.to_string())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        DocumentStoreError::InvalidArgument(message.into())
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
