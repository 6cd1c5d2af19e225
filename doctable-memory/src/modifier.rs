//! Update operators applied to stored documents.
//!
//! Only the operators the adapter issues are understood: `$set` replaces (possibly
//! dotted) fields and `$inc` adds to numeric fields, treating missing fields as zero.

use doctable_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::{Document, Value},
};

/// Applies `update` to `document` in place. Returns whether anything changed.
pub(crate) fn apply_update(
    document: &mut Document,
    update: &Document,
) -> DocumentStoreResult<bool> {
    if update.is_empty() || update.keys().any(|k| !k.starts_with('$')) {
        return Err(DocumentStoreError::InvalidArgument(
            "update documents must only contain update operators".to_string(),
        ));
    }

    let before = document.clone();

    for (op, fields) in update {
        let fields = fields.as_document().ok_or_else(|| {
            DocumentStoreError::invalid_argument(format!(
                "{op} expects a document, found {}",
                fields.kind()
            ))
        })?;

        for (path, operand) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(DocumentStoreError::invalid_argument("the _id field is immutable"));
            }

            match op.as_str() {
                "$set" => {
                    *slot(document, path)? = operand.clone();
                }
                "$inc" => {
                    let target = slot(document, path)?;
                    *target = increment(path, target, operand)?;
                }
                other => {
                    return Err(DocumentStoreError::invalid_argument(format!(
                        "unsupported update operator {other}"
                    )));
                }
            }
        }
    }

    Ok(*document != before)
}

/// Returns the slot for a dotted path, creating intermediate documents.
fn slot<'a>(document: &'a mut Document, path: &str) -> DocumentStoreResult<&'a mut Value> {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };

    let mut current = document;
    for segment in parent.into_iter().flat_map(|p| p.split('.')) {
        let next = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Document(Document::new()));

        current = match next {
            Value::Document(inner) => inner,
            other => {
                return Err(DocumentStoreError::invalid_argument(format!(
                    "cannot traverse {} at {segment} in {path}",
                    other.kind()
                )));
            }
        };
    }

    Ok(current.entry(last.to_string()).or_insert(Value::Null))
}

fn increment(path: &str, current: &Value, by: &Value) -> DocumentStoreResult<Value> {
    let invalid = || {
        DocumentStoreError::invalid_argument(format!("cannot increment {path} by {}", by.kind()))
    };

    Ok(match (current, by) {
        (Value::Null, by) if by.as_f64().is_some() => by.clone(),
        (Value::Int32(a), Value::Int32(b)) => a
            .checked_add(*b)
            .map(Value::Int32)
            .unwrap_or(Value::Int64(*a as i64 + *b as i64)),
        (Value::Double(_), _) | (_, Value::Double(_)) => {
            let (a, b) = current.as_f64().zip(by.as_f64()).ok_or_else(invalid)?;
            Value::Double(a + b)
        }
        _ => {
            let (a, b) = current.as_i64().zip(by.as_i64()).ok_or_else(invalid)?;
            Value::Int64(a.checked_add(b).ok_or_else(invalid)?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use doctable_core::document;

    #[test]
    fn set_replaces_and_creates_fields() {
        let mut doc = document! { "name" => "Alice", "profile" => document! { "city" => "Oslo" } };
        let changed = apply_update(
            &mut doc,
            &document! { "$set" => document! { "name" => "Bob", "profile.zip" => "0150" } },
        )
        .unwrap();

        assert!(changed);
        assert_eq!(doc["name"], Value::from("Bob"));
        assert_eq!(
            doc["profile"],
            Value::from(document! { "city" => "Oslo", "zip" => "0150" })
        );
    }

    #[test]
    fn inc_adds_and_defaults_missing_fields() {
        let mut doc = document! { "visits" => 2, "score" => 1.5 };
        apply_update(
            &mut doc,
            &document! { "$inc" => document! { "visits" => 3, "score" => 1, "fresh" => 7_i64 } },
        )
        .unwrap();

        assert_eq!(doc["visits"], Value::Int32(5));
        assert_eq!(doc["score"], Value::Double(2.5));
        assert_eq!(doc["fresh"], Value::Int64(7));
    }

    #[test]
    fn unchanged_documents_report_no_modification() {
        let mut doc = document! { "name" => "Alice" };
        let update = document! { "$set" => document! { "name" => "Alice" } };
        let changed = apply_update(&mut doc, &update).unwrap();
        assert!(!changed);
    }

    #[test]
    fn rejects_replacements_and_key_changes() {
        let mut doc = document! { "_id" => "a" };

        assert!(apply_update(&mut doc, &document! { "name" => "x" }).is_err());
        assert!(
            apply_update(&mut doc, &document! { "$set" => document! { "_id" => "b" } }).is_err()
        );
        assert!(apply_update(&mut doc, &document! { "$inc" => document! { "n" => "x" } }).is_err());
    }
}
