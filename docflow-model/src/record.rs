use serde_json::{Map, Value};

/// Name of the identifier field every persisted document carries.
pub const ID_FIELD: &str = "_id";

/// A record as submitted by a caller: field name → JSON value.
///
/// All data flows through this type. Its structure is whatever the schema's
/// hooks and callers agree on; the engine only looks at [`ID_FIELD`].
pub type Record = Map<String, Value>;

/// A record that has been persisted and therefore carries an identifier.
pub type Document = Map<String, Value>;

/// Read helpers shared by records and documents.
pub trait RecordExt {
    /// The document identifier, if present and a string.
    fn id(&self) -> Option<&str>;

    /// Extract a value using a JSON pointer (e.g., "/payload/data/title").
    fn pointer(&self, pointer: &str) -> Option<&Value>;

    /// Extract a string value using a JSON pointer.
    fn get_str(&self, pointer: &str) -> Option<&str> {
        self.pointer(pointer).and_then(|v| v.as_str())
    }

    /// Extract a boolean value using a JSON pointer.
    fn get_bool(&self, pointer: &str) -> Option<bool> {
        self.pointer(pointer).and_then(|v| v.as_bool())
    }

    /// Extract a numeric value using a JSON pointer.
    fn get_number(&self, pointer: &str) -> Option<f64> {
        self.pointer(pointer).and_then(|v| v.as_f64())
    }
}

impl RecordExt for Map<String, Value> {
    fn id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(|v| v.as_str())
    }

    fn pointer(&self, pointer: &str) -> Option<&Value> {
        let rest = pointer.strip_prefix('/')?;
        let (head, tail) = match rest.split_once('/') {
            Some((head, tail)) => (head, Some(tail)),
            None => (rest, None),
        };
        let value = self.get(head)?;
        match tail {
            Some(tail) => value.pointer(&format!("/{tail}")),
            None => Some(value),
        }
    }
}

/// Shallow merge: fields of `incoming` override fields of `original`.
///
/// The identifier of `original` always survives so an update can never move
/// a document to another id.
pub fn merge_records(original: &Document, incoming: &Record) -> Document {
    let mut merged = original.clone();
    for (key, value) in incoming {
        merged.insert(key.clone(), value.clone());
    }
    if let Some(id) = original.get(ID_FIELD) {
        merged.insert(ID_FIELD.to_string(), id.clone());
    }
    merged
}

/// Convert a JSON value into a record, rejecting anything but an object.
pub fn into_record(value: Value) -> crate::ModelResult<Record> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(crate::ModelError::NotAnObject(type_name(&other))),
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
