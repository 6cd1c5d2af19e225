//! Canonicalization of wire-format documents into native values.
//!
//! Stores hand documents to the adapter in Extended JSON, where values that JSON cannot
//! express unambiguously (32- vs 64-bit integers, dates, binary, ...) travel inside
//! single-key wrapper maps such as `{"$numberInt": "42"}`. This module rewrites those
//! wrappers into [`Value`]s.
//!
//! The rules:
//!
//! - A map is a wrapper only when it has exactly one key and that key is one of the
//!   recognized [`Wrapper`] tags. Anything else recurses as a nested document.
//! - Arrays recurse element-wise. Plain JSON scalars pass through (integers become
//!   [`Value::Int64`], other numbers [`Value::Double`]).
//! - A wrapper whose payload is malformed (say `{"$numberInt": "abc"}`) degrades to its
//!   payload, normalized like any other value. Normalization of a value never fails.
//! - `$numberDecimal` is narrowed to `f64` and loses precision. `$regularExpression`
//!   becomes a descriptive string; regexes do not round-trip.
//!
//! # Example
//!
//! ```ignore
//! use doctable::{normalize::normalize_document, value::Value};
//! use serde_json::json;
//!
//! let doc = normalize_document(json!({ "n": { "$numberInt": "42" } }))?;
//! assert_eq!(doc.get("n"), Some(&Value::Int32(42)));
//! ```

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Document, Value},
};

/// Sentinel string a `$minKey` wrapper normalizes to.
pub const MIN_KEY: &str = "__MinKey__";
/// Sentinel string a `$maxKey` wrapper normalizes to.
pub const MAX_KEY: &str = "__MaxKey__";

/// The closed set of recognized extended-type wrapper tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wrapper {
    Int,
    Long,
    Double,
    Decimal,
    ObjectId,
    Date,
    Bool,
    Undefined,
    Timestamp,
    RegularExpression,
    Binary,
    MinKey,
    MaxKey,
}

impl Wrapper {
    /// Looks up the wrapper for a map key, if it is a recognized tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "$numberInt" => Wrapper::Int,
            "$numberLong" => Wrapper::Long,
            "$numberDouble" => Wrapper::Double,
            "$numberDecimal" => Wrapper::Decimal,
            "$oid" => Wrapper::ObjectId,
            "$date" => Wrapper::Date,
            "$bool" => Wrapper::Bool,
            "$undefined" => Wrapper::Undefined,
            "$timestamp" => Wrapper::Timestamp,
            "$regularExpression" => Wrapper::RegularExpression,
            "$binary" => Wrapper::Binary,
            "$minKey" => Wrapper::MinKey,
            "$maxKey" => Wrapper::MaxKey,
            _ => return None,
        })
    }

    /// Returns the wire tag of this wrapper.
    pub fn tag(self) -> &'static str {
        match self {
            Wrapper::Int => "$numberInt",
            Wrapper::Long => "$numberLong",
            Wrapper::Double => "$numberDouble",
            Wrapper::Decimal => "$numberDecimal",
            Wrapper::ObjectId => "$oid",
            Wrapper::Date => "$date",
            Wrapper::Bool => "$bool",
            Wrapper::Undefined => "$undefined",
            Wrapper::Timestamp => "$timestamp",
            Wrapper::RegularExpression => "$regularExpression",
            Wrapper::Binary => "$binary",
            Wrapper::MinKey => "$minKey",
            Wrapper::MaxKey => "$maxKey",
        }
    }

    /// Decodes a wrapper payload. A malformed payload is handed back unchanged.
    fn decode(self, payload: JsonValue) -> Result<Value, JsonValue> {
        match self {
            Wrapper::Int => match integer_payload(&payload).and_then(|v| i32::try_from(v).ok()) {
                Some(v) => Ok(Value::Int32(v)),
                None => Err(payload),
            },
            Wrapper::Long => match integer_payload(&payload) {
                Some(v) => Ok(Value::Int64(v)),
                None => Err(payload),
            },
            Wrapper::Double | Wrapper::Decimal => match float_payload(&payload) {
                Some(v) => Ok(Value::Double(v)),
                None => Err(payload),
            },
            Wrapper::ObjectId => match payload {
                JsonValue::String(hex) => Ok(Value::String(hex)),
                other => Err(other),
            },
            Wrapper::Date => match date_payload(&payload) {
                Some(at) => Ok(Value::DateTime(at)),
                None => Err(payload),
            },
            Wrapper::Bool => match payload {
                JsonValue::Bool(v) => Ok(Value::Bool(v)),
                other => Err(other),
            },
            Wrapper::Undefined => Ok(Value::Null),
            Wrapper::Timestamp => match &payload {
                JsonValue::Object(ts) => {
                    let part = |key: &str| ts.get(key).and_then(JsonValue::as_i64).unwrap_or(0);
                    let mut doc = Document::new();
                    doc.insert("t".to_string(), Value::Int64(part("t")));
                    doc.insert("i".to_string(), Value::Int64(part("i")));
                    Ok(Value::Document(doc))
                }
                _ => Err(payload),
            },
            Wrapper::RegularExpression => match &payload {
                JsonValue::Object(re) => {
                    let part = |key: &str| re.get(key).and_then(JsonValue::as_str).unwrap_or("");
                    Ok(Value::String(format!("regex({}, {})", part("pattern"), part("options"))))
                }
                _ => Err(payload),
            },
            Wrapper::Binary => {
                let decoded = payload
                    .get("base64")
                    .and_then(JsonValue::as_str)
                    .and_then(|encoded| STANDARD.decode(encoded).ok());
                match decoded {
                    Some(bytes) => Ok(Value::Bytes(bytes)),
                    None => Err(payload),
                }
            }
            Wrapper::MinKey => Ok(Value::String(MIN_KEY.to_string())),
            Wrapper::MaxKey => Ok(Value::String(MAX_KEY.to_string())),
        }
    }
}

fn integer_payload(payload: &JsonValue) -> Option<i64> {
    match payload {
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Number(n) => n.as_i64(),
        _ => None,
    }
}

fn float_payload(payload: &JsonValue) -> Option<f64> {
    match payload {
        // Accepts the Extended JSON spellings Infinity, -Infinity and NaN too.
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn date_payload(payload: &JsonValue) -> Option<DateTime<Utc>> {
    match payload {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|at| at.with_timezone(&Utc)),
        JsonValue::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        JsonValue::Object(inner) if inner.len() == 1 => inner
            .get("$numberLong")
            .and_then(integer_payload)
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Normalizes a top-level wire document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Normalization`] if `wire` is not a JSON object.
pub fn normalize_document(wire: JsonValue) -> DocumentStoreResult<Document> {
    match wire {
        JsonValue::Object(map) => Ok(normalize_map(map)),
        other => Err(DocumentStoreError::Normalization(format!(
            "expected a document, found {}",
            json_kind(&other)
        ))),
    }
}

/// Normalizes every entry of a wire map. The map itself is never treated as a wrapper.
pub fn normalize_map(map: Map<String, JsonValue>) -> Document {
    map.into_iter()
        .map(|(key, value)| (key, normalize_value(value)))
        .collect()
}

/// Normalizes a single wire value, recursing depth-first.
pub fn normalize_value(wire: JsonValue) -> Value {
    match wire {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(v) => Value::Bool(v),
        JsonValue::Number(n) => match n.as_i64() {
            Some(v) => Value::Int64(v),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::String(s),
        JsonValue::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        JsonValue::Object(map) => {
            let wrapper = match map.keys().next() {
                Some(tag) if map.len() == 1 => Wrapper::from_tag(tag),
                _ => None,
            };

            match wrapper {
                Some(wrapper) => {
                    let payload = map.into_iter().next().map(|(_, v)| v).unwrap_or_default();
                    wrapper.decode(payload).unwrap_or_else(normalize_value)
                }
                None => Value::Document(normalize_map(map)),
            }
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn unwraps_number_int_to_32_bits() {
        assert_eq!(normalize_value(json!({ "$numberInt": "42" })), Value::Int32(42));
    }

    #[test]
    fn unwraps_longs_doubles_and_decimals() {
        assert_eq!(
            normalize_value(json!({ "$numberLong": "9000000000" })),
            Value::Int64(9_000_000_000)
        );
        assert_eq!(normalize_value(json!({ "$numberDouble": "1.5" })), Value::Double(1.5));
        assert_eq!(normalize_value(json!({ "$numberDecimal": "0.1" })), Value::Double(0.1));
        assert_eq!(
            normalize_value(json!({ "$numberDouble": "-Infinity" })),
            Value::Double(f64::NEG_INFINITY)
        );
    }

    #[test]
    fn unwraps_dates_from_iso_strings_and_epoch_millis() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            normalize_value(json!({ "$date": "2024-01-01T00:00:00Z" })),
            Value::DateTime(expected)
        );
        assert_eq!(
            normalize_value(json!({ "$date": { "$numberLong": "1704067200000" } })),
            Value::DateTime(expected)
        );
        assert_eq!(
            normalize_value(json!({ "$date": 1704067200000_i64 })),
            Value::DateTime(expected)
        );
    }

    #[test]
    fn unwraps_object_ids_to_hex_strings() {
        assert_eq!(
            normalize_value(json!({ "$oid": "65a1b2c3d4e5f60718293a4b" })),
            Value::String("65a1b2c3d4e5f60718293a4b".into())
        );
    }

    #[test]
    fn unwraps_the_remaining_wrappers() {
        assert_eq!(normalize_value(json!({ "$bool": true })), Value::Bool(true));
        assert_eq!(normalize_value(json!({ "$undefined": true })), Value::Null);
        assert_eq!(
            normalize_value(json!({ "$timestamp": { "t": 1700000000, "i": 3 } })),
            Value::Document(crate::document! { "t" => 1_700_000_000_i64, "i" => 3_i64 })
        );
        assert_eq!(
            normalize_value(json!({ "$regularExpression": { "pattern": "^a", "options": "i" } })),
            Value::String("regex(^a, i)".into())
        );
        assert_eq!(
            normalize_value(json!({ "$binary": { "base64": "aGVsbG8=", "subType": "00" } })),
            Value::Bytes(b"hello".to_vec())
        );
        assert_eq!(normalize_value(json!({ "$minKey": 1 })), Value::String(MIN_KEY.into()));
        assert_eq!(normalize_value(json!({ "$maxKey": 1 })), Value::String(MAX_KEY.into()));
    }

    #[test]
    fn preserves_unrecognized_single_key_maps() {
        assert_eq!(
            normalize_value(json!({ "$custom": { "$numberInt": "7" } })),
            Value::Document(crate::document! { "$custom" => 7 })
        );
    }

    #[test]
    fn multi_key_maps_are_never_wrappers() {
        let value = normalize_value(json!({ "$numberInt": "1", "other": "x" }));
        assert_eq!(
            value,
            Value::Document(crate::document! { "$numberInt" => "1", "other" => "x" })
        );
    }

    #[test]
    fn malformed_payloads_degrade_to_the_payload() {
        assert_eq!(normalize_value(json!({ "$numberInt": "abc" })), Value::String("abc".into()));
        assert_eq!(
            normalize_value(json!({ "$numberInt": "9000000000" })),
            Value::String("9000000000".into())
        );
        assert_eq!(
            normalize_value(json!({ "$date": "yesterday" })),
            Value::String("yesterday".into())
        );
        assert_eq!(normalize_value(json!({ "$bool": "yes" })), Value::String("yes".into()));
    }

    #[test]
    fn recurses_into_arrays_and_nested_documents() {
        let doc = normalize_document(json!({
            "tags": [{ "$numberInt": "1" }, "two"],
            "meta": { "created": { "$date": "2024-01-01T00:00:00Z" }, "plain": 3 },
        }))
        .unwrap();

        assert_eq!(
            doc.get("tags"),
            Some(&Value::Array(vec![Value::Int32(1), Value::String("two".into())]))
        );
        let meta = doc.get("meta").and_then(Value::as_document).unwrap();
        assert!(matches!(meta.get("created"), Some(Value::DateTime(_))));
        assert_eq!(meta.get("plain"), Some(&Value::Int64(3)));
    }

    #[test]
    fn top_level_must_be_a_document() {
        assert!(matches!(
            normalize_document(json!([1, 2])),
            Err(DocumentStoreError::Normalization(_))
        ));
    }
}
