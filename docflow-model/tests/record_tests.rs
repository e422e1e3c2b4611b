use docflow_model::{ID_FIELD, Record, RecordExt, into_record, merge_records};
use pretty_assertions::assert_eq;
use serde_json::json;

fn record(value: serde_json::Value) -> Record {
    into_record(value).unwrap()
}

// ── Identifier ───────────────────────────────────────────────────

#[test]
fn id_reads_string_identifier() {
    let r = record(json!({"_id": "book_123", "title": "X"}));
    assert_eq!(r.id(), Some("book_123"));
}

#[test]
fn id_is_none_when_missing_or_not_a_string() {
    assert_eq!(record(json!({"title": "X"})).id(), None);
    assert_eq!(record(json!({"_id": 42})).id(), None);
}

// ── JSON pointer helpers ─────────────────────────────────────────

#[test]
fn get_str_follows_nested_pointer() {
    let r = record(json!({"payload": {"data": {"title": "Dune"}}}));
    assert_eq!(r.get_str("/payload/data/title"), Some("Dune"));
}

#[test]
fn get_number_and_bool() {
    let r = record(json!({"year": 1965, "published": true}));
    assert_eq!(r.get_number("/year"), Some(1965.0));
    assert_eq!(r.get_bool("/published"), Some(true));
}

#[test]
fn pointer_without_leading_slash_is_none() {
    let r = record(json!({"title": "Dune"}));
    assert_eq!(r.get_str("title"), None);
}

#[test]
fn get_str_wrong_type_is_none() {
    let r = record(json!({"year": 1965}));
    assert_eq!(r.get_str("/year"), None);
}

// ── Merge ────────────────────────────────────────────────────────

#[test]
fn merge_overrides_and_keeps_untouched_fields() {
    let original = record(json!({"_id": "b1", "title": "Old", "year": 1965}));
    let incoming = record(json!({"title": "New", "author": "Herbert"}));

    let merged = merge_records(&original, &incoming);
    assert_eq!(
        serde_json::Value::Object(merged),
        json!({"_id": "b1", "title": "New", "year": 1965, "author": "Herbert"})
    );
}

#[test]
fn merge_never_moves_identifier() {
    let original = record(json!({"_id": "b1", "title": "Old"}));
    let incoming = record(json!({"_id": "b2"}));

    let merged = merge_records(&original, &incoming);
    assert_eq!(merged[ID_FIELD], json!("b1"));
}

#[test]
fn merge_does_not_touch_inputs() {
    let original = record(json!({"_id": "b1", "title": "Old"}));
    let incoming = record(json!({"title": "New"}));
    let _ = merge_records(&original, &incoming);
    assert_eq!(original["title"], json!("Old"));
}

// ── Conversion ───────────────────────────────────────────────────

#[test]
fn into_record_rejects_non_objects() {
    let err = into_record(json!([1, 2])).unwrap_err();
    assert_eq!(err.to_string(), "expected a JSON object, got array");
}
