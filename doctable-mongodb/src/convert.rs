//! Conversion between native values and BSON.
//!
//! Queries and writes are converted straight to BSON. Documents read from the server go
//! the other way into canonical Extended JSON, the wire form every backend hands back to
//! the adapter.

use bson::{Binary, Bson, spec::BinarySubtype};
use serde_json::{Map, Value as JsonValue, json};

use doctable_core::{
    value::{Document, Value},
    wire::encode_double,
};

/// Converts a native document to a BSON document.
pub fn to_bson_document(document: &Document) -> bson::Document {
    document
        .iter()
        .map(|(key, value)| (key.clone(), to_bson(value)))
        .collect()
}

/// Converts a native value to BSON.
pub fn to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(v) => Bson::Boolean(*v),
        Value::Int32(v) => Bson::Int32(*v),
        Value::Int64(v) => Bson::Int64(*v),
        Value::Double(v) => Bson::Double(*v),
        Value::String(v) => Bson::String(v.clone()),
        Value::Bytes(v) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: v.clone(),
        }),
        Value::DateTime(v) => Bson::DateTime(bson::DateTime::from_chrono(*v)),
        Value::ObjectId(v) => Bson::ObjectId(*v),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Document(doc) => Bson::Document(to_bson_document(doc)),
    }
}

/// Converts a BSON document read from the server to its wire form.
pub fn to_wire_document(document: &bson::Document) -> JsonValue {
    JsonValue::Object(
        document
            .iter()
            .map(|(key, value)| (key.clone(), to_wire(value)))
            .collect::<Map<_, _>>(),
    )
}

/// Converts a BSON value to canonical Extended JSON.
pub fn to_wire(value: &Bson) -> JsonValue {
    match value {
        Bson::Null => JsonValue::Null,
        Bson::Boolean(v) => JsonValue::Bool(*v),
        Bson::Int32(v) => json!({ "$numberInt": v.to_string() }),
        Bson::Int64(v) => json!({ "$numberLong": v.to_string() }),
        Bson::Double(v) => json!({ "$numberDouble": encode_double(*v) }),
        Bson::Decimal128(v) => json!({ "$numberDecimal": v.to_string() }),
        Bson::String(v) => JsonValue::String(v.clone()),
        Bson::ObjectId(v) => json!({ "$oid": v.to_hex() }),
        Bson::DateTime(v) => {
            json!({ "$date": { "$numberLong": v.timestamp_millis().to_string() } })
        }
        Bson::Array(items) => JsonValue::Array(items.iter().map(to_wire).collect()),
        Bson::Document(doc) => to_wire_document(doc),
        // Binary, timestamps, regular expressions and the remaining kinds serialize to
        // their Extended JSON wrappers.
        other => serde_json::to_value(other).unwrap_or(JsonValue::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use chrono::{TimeZone, Utc};
    use doctable_core::{document, normalize::normalize_document};

    #[test]
    fn native_documents_convert_to_bson() {
        let oid = ObjectId::new();
        let converted = to_bson_document(&document! {
            "_id" => oid,
            "name" => "Alice",
            "age" => 30,
            "visits" => 4_i64,
            "tags" => vec![Value::from("a")],
        });

        assert_eq!(
            converted,
            doc! { "_id": oid, "age": 30, "name": "Alice", "tags": ["a"], "visits": 4_i64 }
        );
    }

    #[test]
    fn read_documents_normalize_back() {
        let oid = ObjectId::new();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let stored = doc! {
            "_id": oid,
            "age": 30,
            "visits": 4_i64,
            "score": 2.5,
            "at": bson::DateTime::from_chrono(at),
            "nested": { "ok": true },
        };

        let normalized = normalize_document(to_wire_document(&stored)).unwrap();

        assert_eq!(
            normalized,
            document! {
                "_id" => oid.to_hex(),
                "age" => 30,
                "visits" => 4_i64,
                "score" => 2.5,
                "at" => at,
                "nested" => document! { "ok" => true },
            }
        );
    }
}
