//! Filter matching and ordering for stores that evaluate queries in process.
//!
//! Vocabulary: a plain value matches by equality (an array field matches if
//! any element is equal); an object whose keys all start with `$` is an
//! operator object using `$eq $ne $gt $gte $lt $lte $in $nin $exists
//! $contains`. Field names may be dotted paths (`payload.data.title`).

use crate::error::{StorageError, StorageResult};
use docflow_model::{Document, Filter, FindOptions, SortOrder};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Resolves a dotted path inside a document.
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether `document` satisfies every condition in `filter`.
pub fn matches(document: &Document, filter: &Filter) -> StorageResult<bool> {
    for (path, condition) in filter {
        let actual = lookup(document, path);
        let ok = match condition {
            Value::Object(ops) if is_operator_object(ops) => match_operators(actual, ops)?,
            expected => equals(actual, expected),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn match_operators(actual: Option<&Value>, ops: &Map<String, Value>) -> StorageResult<bool> {
    for (op, operand) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(actual, operand),
            "$ne" => !equals(actual, operand),
            "$gt" => ordered(actual, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(actual, operand, |o| o != Ordering::Less),
            "$lt" => ordered(actual, operand, |o| o == Ordering::Less),
            "$lte" => ordered(actual, operand, |o| o != Ordering::Greater),
            "$in" => list_operand(op, operand)?.iter().any(|v| equals(actual, v)),
            "$nin" => !list_operand(op, operand)?.iter().any(|v| equals(actual, v)),
            "$exists" => {
                let wanted = operand
                    .as_bool()
                    .ok_or_else(|| StorageError::InvalidFilter("$exists expects a boolean".into()))?;
                actual.is_some() == wanted
            }
            "$contains" => {
                let needle = operand
                    .as_str()
                    .ok_or_else(|| StorageError::InvalidFilter("$contains expects a string".into()))?
                    .to_lowercase();
                match actual {
                    Some(Value::String(s)) => s.to_lowercase().contains(&needle),
                    _ => false,
                }
            }
            other => return Err(StorageError::InvalidFilter(format!("unsupported operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list_operand<'a>(op: &str, operand: &'a Value) -> StorageResult<&'a Vec<Value>> {
    operand
        .as_array()
        .ok_or_else(|| StorageError::InvalidFilter(format!("{op} expects an array")))
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match (actual, expected) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Array(items)), expected) if !expected.is_array() => {
            items.iter().any(|item| scalar_eq(item, expected))
        }
        (Some(actual), expected) => scalar_eq(actual, expected),
    }
}

fn scalar_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Range comparisons only apply within the same type bracket.
fn ordered(actual: Option<&Value>, operand: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        Some(actual) if type_rank(actual) == type_rank(operand) => pred(compare_values(actual, operand)),
        _ => false,
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type bracket first, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_values(a, b),
    }
}

/// Filters, sorts (stable) and paginates `documents` according to `options`.
pub fn apply_options(documents: Vec<Document>, options: &FindOptions) -> StorageResult<Vec<Document>> {
    let mut selected = Vec::with_capacity(documents.len());
    for document in documents {
        if matches(&document, &options.filter)? {
            selected.push(document);
        }
    }

    if !options.sort.is_empty() {
        selected.sort_by(|a, b| {
            for key in &options.sort {
                let ord = compare_optional(lookup(a, &key.field), lookup(b, &key.field));
                let ord = match key.order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let limit = options.limit.unwrap_or(usize::MAX);
    Ok(selected.into_iter().skip(options.skip).take(limit).collect())
}
