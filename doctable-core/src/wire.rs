//! Encoding of native values into canonical Extended JSON.
//!
//! This is the inverse of [`normalize`](crate::normalize) for every kind a normalized
//! document can hold. Backends that keep documents in wire form (the in-memory backend
//! does) use it on the write path, so their reads go through the same normalization as a
//! real store.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value as JsonValue, json};

use crate::{
    normalize::Wrapper,
    value::{Document, Value},
};

/// Encodes a document as a canonical Extended JSON object.
pub fn encode_document(document: &Document) -> Map<String, JsonValue> {
    document
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Encodes a single value as canonical Extended JSON.
pub fn encode_value(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Int32(v) => wrap(Wrapper::Int, json!(v.to_string())),
        Value::Int64(v) => wrap(Wrapper::Long, json!(v.to_string())),
        Value::Double(v) => wrap(Wrapper::Double, json!(encode_double(*v))),
        Value::String(v) => JsonValue::String(v.clone()),
        Value::Bytes(v) => wrap(
            Wrapper::Binary,
            json!({ "base64": STANDARD.encode(v), "subType": "00" }),
        ),
        Value::DateTime(v) => wrap(
            Wrapper::Date,
            wrap(Wrapper::Long, json!(v.timestamp_millis().to_string())),
        ),
        Value::ObjectId(v) => wrap(Wrapper::ObjectId, json!(v.to_hex())),
        Value::Array(items) => JsonValue::Array(items.iter().map(encode_value).collect()),
        Value::Document(doc) => JsonValue::Object(encode_document(doc)),
    }
}

fn wrap(wrapper: Wrapper, payload: JsonValue) -> JsonValue {
    let mut object = Map::new();
    object.insert(wrapper.tag().to_string(), payload);
    JsonValue::Object(object)
}

/// Canonical string form of a double, including the non-finite spellings.
pub fn encode_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{v:?}")
    }
}
