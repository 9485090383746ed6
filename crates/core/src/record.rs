//! Record helpers: identifier ordering, provenance tagging and the
//! record-set file encoding.
//!
//! Records are plain `bson::Document`s. Record-set files hold a JSON array
//! of documents in MongoDB relaxed Extended JSON, except that 64-bit integers
//! are written as `{"$numberLong": "..."}`. A bare JSON number reads back as
//! `Int32` when it fits, so without the wrapper a small `Int64` would change
//! type on the way through an export and a seed.

use std::cmp::Ordering;

use bson::{Bson, Document};
use serde_json::{Map, Value};

/// Field holding the database-assigned identifier.
pub const ID_FIELD: &str = "_id";

/// Field marking records written by the delta copier.
pub const PROVENANCE_FIELD: &str = "copied";

/// Mark a record as written by synchronization.
pub fn tag_copied(doc: &mut Document) {
    doc.insert(PROVENANCE_FIELD, true);
}

/// Whether a record carries the provenance tag.
pub fn is_copied(doc: &Document) -> bool {
    matches!(doc.get(PROVENANCE_FIELD), Some(Bson::Boolean(true)))
}

/// The identifier of a record, if present.
pub fn record_id(doc: &Document) -> Option<&Bson> {
    doc.get(ID_FIELD)
}

/// Rank of a BSON type in MongoDB's cross-type comparison order.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) | Bson::DbPointer(_) => 12,
        Bson::MaxKey => 13,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Compare two identifiers the way MongoDB sorts `_id`.
///
/// Types are ordered by their BSON comparison rank first. Integers compare
/// exactly, mixed numeric types compare numerically. Types without a natural
/// order inside their rank fall back to their extended JSON text.
pub fn cmp_ids(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => x.cmp(y),
        (Bson::Int64(x), Bson::Int64(y)) => x.cmp(y),
        (Bson::Int32(x), Bson::Int64(y)) => i64::from(*x).cmp(y),
        (Bson::Int64(x), Bson::Int32(y)) => x.cmp(&i64::from(*y)),
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a
                .clone()
                .into_relaxed_extjson()
                .to_string()
                .cmp(&b.clone().into_relaxed_extjson().to_string()),
        },
    }
}

/// Encode a record as relaxed Extended JSON with explicit 64-bit integers.
pub fn to_json(doc: Document) -> Value {
    encode(Bson::Document(doc))
}

fn encode(value: Bson) -> Value {
    match value {
        Bson::Int64(v) => {
            let mut wrapped = Map::new();
            wrapped.insert("$numberLong".to_string(), Value::String(v.to_string()));
            Value::Object(wrapped)
        }
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(key, value)| (key, encode(value)))
                .collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(encode).collect()),
        other => other.into_relaxed_extjson(),
    }
}

/// First `_id` held by more than one record, compared the way `cmp_ids` does.
pub fn duplicate_id(records: &[Document]) -> Option<Bson> {
    let mut ids: Vec<&Bson> = records.iter().filter_map(record_id).collect();
    ids.sort_by(|a, b| cmp_ids(a, b));
    ids.windows(2)
        .find(|pair| cmp_ids(pair[0], pair[1]) == Ordering::Equal)
        .map(|pair| pair[0].clone())
}

/// Decode one element of a record-set file into a record.
pub fn from_json(value: Value) -> Result<Document, String> {
    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(format!("expected a document, found {:?}", other.element_type())),
        Err(e) => Err(e.to_string()),
    }
}

/// Decode a whole record-set file body (a JSON array of documents).
pub fn parse_record_set(bytes: &[u8]) -> Result<Vec<Document>, String> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    let Value::Array(items) = value else {
        return Err("top-level value is not an array".to_string());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| from_json(item).map_err(|e| format!("element {i}: {e}")))
        .collect()
}
