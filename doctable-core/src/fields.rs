//! Declarative field definitions.
//!
//! An entity may declare a [`FieldTable`]: the external field names it exposes, each with
//! a [`FieldDef`] carrying its type, nullability and display metadata. Definitions are
//! plain `serde` structs so they can be loaded from configuration files:
//!
//! ```json
//! {
//!     "name":    { "type": "string", "name": "Display name" },
//!     "age":     { "type": "int", "nullable": true },
//!     "changed": { "type": "datetime", "nullable": true }
//! }
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{normalize::normalize_value, value::Value};

/// Declared fields of an entity, in declaration order.
pub type FieldTable = IndexMap<String, FieldDef>;

/// The declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Any value is accepted unchanged.
    #[default]
    Any,
    #[serde(alias = "boolean")]
    Bool,
    #[serde(alias = "int")]
    Int32,
    #[serde(alias = "long")]
    Int64,
    #[serde(alias = "float", alias = "number")]
    Double,
    String,
    #[serde(alias = "binary")]
    Bytes,
    #[serde(alias = "date", alias = "timestamp")]
    DateTime,
    #[serde(alias = "oid")]
    ObjectId,
    #[serde(alias = "map", alias = "object")]
    Document,
    Array,
}

impl FieldType {
    /// Converts a non-null value to this type.
    ///
    /// Returns a short reason on failure.
    pub fn coerce(self, value: &Value) -> Result<Value, String> {
        let converted = match (self, value) {
            (FieldType::Any, v) => Some(v.clone()),

            (FieldType::Bool, Value::Bool(v)) => Some(Value::Bool(*v)),
            (FieldType::Bool, v) if v.as_i64().is_some() => match v.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            (FieldType::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "no" => Some(Value::Bool(false)),
                _ => None,
            },

            (FieldType::Int32, Value::Int32(v)) => Some(Value::Int32(*v)),
            (FieldType::Int32, Value::Int64(v)) => i32::try_from(*v).ok().map(Value::Int32),
            (FieldType::Int32, Value::Double(v)) => whole(*v)
                .and_then(|v| i32::try_from(v).ok())
                .map(Value::Int32),
            (FieldType::Int32, Value::String(s)) => s.trim().parse().ok().map(Value::Int32),

            (FieldType::Int64, v) if v.as_i64().is_some() => v.as_i64().map(Value::Int64),
            (FieldType::Int64, Value::Double(v)) => whole(*v).map(Value::Int64),
            (FieldType::Int64, Value::String(s)) => s.trim().parse().ok().map(Value::Int64),

            (FieldType::Double, v) if v.as_f64().is_some() => v.as_f64().map(Value::Double),
            (FieldType::Double, Value::String(s)) => s.trim().parse().ok().map(Value::Double),

            (FieldType::String, Value::String(s)) => Some(Value::String(s.clone())),
            (
                FieldType::String,
                v @ (Value::Bool(_)
                | Value::Int32(_)
                | Value::Int64(_)
                | Value::Double(_)
                | Value::ObjectId(_)
                | Value::DateTime(_)),
            ) => Some(Value::String(v.to_string())),

            (FieldType::Bytes, Value::Bytes(v)) => Some(Value::Bytes(v.clone())),
            (FieldType::Bytes, Value::String(s)) => STANDARD.decode(s).ok().map(Value::Bytes),

            (FieldType::DateTime, Value::DateTime(v)) => Some(Value::DateTime(*v)),
            (FieldType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|at| Value::DateTime(at.with_timezone(&Utc))),
            (FieldType::DateTime, v) if v.as_i64().is_some() => v
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(Value::DateTime),

            (FieldType::ObjectId, Value::ObjectId(v)) => Some(Value::ObjectId(*v)),
            (FieldType::ObjectId, Value::String(s)) => {
                ObjectId::parse_str(s.trim()).ok().map(Value::ObjectId)
            }

            (FieldType::Document, Value::Document(v)) => Some(Value::Document(v.clone())),
            (FieldType::Array, Value::Array(v)) => Some(Value::Array(v.clone())),

            _ => None,
        };

        converted.ok_or_else(|| format!("cannot convert {} to {:?}", value.kind(), self))
    }
}

fn whole(v: f64) -> Option<i64> {
    (v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64).then_some(v as i64)
}

/// The definition of a single external field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Declared type.
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    /// Whether the field may be absent or null.
    #[serde(default)]
    pub nullable: bool,
    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default used when a full (non-partial) write omits the field, in Extended JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl FieldDef {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Returns the declared default as a native value.
    pub fn default_value(&self) -> Option<Value> {
        self.default.clone().map(normalize_value)
    }
}
