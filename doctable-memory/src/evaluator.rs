//! Query document evaluation for in-memory filtering.
//!
//! Filters are plain query documents as produced by the query builder: field entries
//! match literally (or through an operator document such as `{"$gte": 18}`) and combine
//! with AND, while `$or`, `$and` and `$nor` hold lists of nested query documents.
//!
//! Documents are evaluated in their normalized form, so object ids compare as their hex
//! strings on both sides.

use std::{borrow::Cow, cmp::Ordering, collections::BTreeMap};

use chrono::{DateTime, Utc};

use doctable_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{SortDirection, SortSpec},
    value::{Document, Value},
};

/// Comparable view of a [`Value`].
///
/// Numbers of every width compare as `f64`. Values of different kinds order by kind
/// first, the way document stores order mixed-type fields.
#[derive(Debug, Clone)]
pub(crate) enum Comparable<'a> {
    Null,
    Number(f64),
    String(Cow<'a, str>),
    Map(BTreeMap<&'a str, Comparable<'a>>),
    Array(Vec<Comparable<'a>>),
    Bytes(&'a [u8]),
    Bool(bool),
    DateTime(DateTime<Utc>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(v) => Comparable::Bool(*v),
            Value::Int32(v) => Comparable::Number(*v as f64),
            Value::Int64(v) => Comparable::Number(*v as f64),
            Value::Double(v) => Comparable::Number(*v),
            Value::String(v) => Comparable::String(Cow::Borrowed(v)),
            Value::ObjectId(v) => Comparable::String(Cow::Owned(v.to_hex())),
            Value::Bytes(v) => Comparable::Bytes(v),
            Value::DateTime(v) => Comparable::DateTime(*v),
            Value::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Value::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Bytes(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting.
    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Number(a), Comparable::Number(b)) => a.total_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a.cmp(b),
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a
                .iter()
                .zip(b)
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            (Comparable::Map(a), Comparable::Map(b)) => a
                .iter()
                .zip(b)
                .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| va.total_cmp(vb)))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.len().cmp(&b.len())),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Bytes(a), Comparable::Bytes(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    /// Range comparisons only hold between values of the same kind.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        (self.rank() == other.rank()).then(|| self.total_cmp(other))
    }
}

/// Looks up a possibly dotted field path.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Whether the document matches `filter`. An empty filter matches everything.
    pub fn evaluate(&self, filter: &Document) -> DocumentStoreResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => self.all(clauses(key, condition)?)?,
                "$or" => self.any(clauses(key, condition)?)?,
                "$nor" => !self.any(clauses(key, condition)?)?,
                op if op.starts_with('$') => {
                    return Err(DocumentStoreError::invalid_argument(format!(
                        "unsupported query operator {op}"
                    )));
                }
                field => self.field(lookup(self.document, field), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn all(&self, clauses: &[Value]) -> DocumentStoreResult<bool> {
        for clause in clauses {
            if !self.evaluate(clause_document(clause)?)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn any(&self, clauses: &[Value]) -> DocumentStoreResult<bool> {
        for clause in clauses {
            if self.evaluate(clause_document(clause)?)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn field(&self, value: Option<&Value>, condition: &Value) -> DocumentStoreResult<bool> {
        match condition {
            Value::Document(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
                for (op, operand) in ops {
                    if !field_op(value, op, operand)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            literal => Ok(equals(value, literal)),
        }
    }

    /// Keeps the documents matching `filter`.
    pub fn filter_documents<I>(
        documents: I,
        filter: &Document,
    ) -> DocumentStoreResult<Vec<(usize, Document)>>
    where
        I: IntoIterator<Item = (usize, Document)>,
    {
        let mut matched = Vec::new();
        for (index, document) in documents {
            if DocumentEvaluator::new(&document).evaluate(filter)? {
                matched.push((index, document));
            }
        }
        Ok(matched)
    }
}

fn clauses<'v>(op: &str, condition: &'v Value) -> DocumentStoreResult<&'v [Value]> {
    match condition {
        Value::Array(items) => Ok(items),
        other => Err(DocumentStoreError::invalid_argument(format!(
            "{op} expects an array, found {}",
            other.kind()
        ))),
    }
}

fn clause_document(clause: &Value) -> DocumentStoreResult<&Document> {
    clause
        .as_document()
        .ok_or_else(|| {
            DocumentStoreError::invalid_argument(format!(
                "expected a query document, found {}",
                clause.kind()
            ))
        })
}

/// Literal equality. Null matches a missing field; a scalar matches any element of an
/// array field.
fn equals(value: Option<&Value>, literal: &Value) -> bool {
    let target = Comparable::from(literal);

    match value {
        None => matches!(target, Comparable::Null),
        Some(value) => {
            let actual = Comparable::from(value);
            if actual == target {
                return true;
            }
            match (&actual, &target) {
                (Comparable::Array(items), t) if !matches!(t, Comparable::Array(_)) => {
                    items.iter().any(|item| item == t)
                }
                _ => false,
            }
        }
    }
}

fn ordered(value: Option<&Value>, operand: &Value, accept: fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };
    let target = Comparable::from(operand);

    match Comparable::from(value) {
        Comparable::Array(items) if !matches!(target, Comparable::Array(_)) => {
            items.iter().any(|item| item.partial_cmp(&target).is_some_and(accept))
        }
        actual => actual.partial_cmp(&target).is_some_and(accept),
    }
}

fn field_op(value: Option<&Value>, op: &str, operand: &Value) -> DocumentStoreResult<bool> {
    Ok(match op {
        "$eq" => equals(value, operand),
        "$ne" => !equals(value, operand),
        "$gt" => ordered(value, operand, Ordering::is_gt),
        "$gte" => ordered(value, operand, Ordering::is_ge),
        "$lt" => ordered(value, operand, Ordering::is_lt),
        "$lte" => ordered(value, operand, Ordering::is_le),
        "$in" => clauses(op, operand)?.iter().any(|candidate| equals(value, candidate)),
        "$nin" => !clauses(op, operand)?.iter().any(|candidate| equals(value, candidate)),
        "$exists" => {
            let expected = match operand {
                Value::Bool(b) => *b,
                other => other.as_i64().is_some_and(|n| n != 0),
            };
            value.is_some() == expected
        }
        other => {
            return Err(DocumentStoreError::invalid_argument(format!(
                "unsupported field operator {other}"
            )));
        }
    })
}

/// Orders documents by `sort`, keeping the original order between equal keys.
pub(crate) fn sort_documents(documents: &mut [(usize, Document)], sort: &SortSpec) {
    if sort.is_empty() {
        return;
    }

    documents.sort_by(|(_, a), (_, b)| {
        sort.iter()
            .map(|(field, direction)| {
                let left = lookup(a, field).map(Comparable::from).unwrap_or(Comparable::Null);
                let right = lookup(b, field).map(Comparable::from).unwrap_or(Comparable::Null);

                match direction {
                    SortDirection::Asc => left.total_cmp(&right),
                    SortDirection::Desc => right.total_cmp(&left),
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
}
