use docflow_model::{FieldDef, FieldType, SchemaCatalog, SchemaDefinition};

fn books() -> SchemaDefinition {
    SchemaDefinition::new(
        "books",
        vec![FieldDef::text("title"), FieldDef::number("year"), FieldDef::json("tags")],
    )
}

// ── FieldDef constructors ────────────────────────────────────────

#[test]
fn field_constructors_set_type() {
    assert_eq!(FieldDef::text("t").field_type, FieldType::Text);
    assert_eq!(FieldDef::number("n").field_type, FieldType::Number);
    assert_eq!(FieldDef::bool("b").field_type, FieldType::Bool);
    assert_eq!(FieldDef::json("j").field_type, FieldType::Json);
}

// ── Recognized keys ──────────────────────────────────────────────

#[test]
fn recognizes_declared_fields_and_identifier() {
    let schema = books();
    assert!(schema.recognizes("title"));
    assert!(schema.recognizes("_id"));
    assert!(!schema.recognizes("isbn"));
}

#[test]
fn recognizes_dotted_paths_by_first_segment() {
    let schema = books();
    assert!(schema.recognizes("tags.0"));
    assert!(!schema.recognizes("meta.title"));
}

#[test]
fn operator_keys_are_not_fields() {
    assert!(!books().recognizes("$or"));
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn deserializes_with_type_rename_and_default() {
    let schema: SchemaDefinition = serde_json::from_str(
        r#"{"name": "books", "fields": [{"name": "title", "type": "text"}, {"name": "extra"}]}"#,
    )
    .unwrap();
    assert_eq!(schema.field("title").unwrap().field_type, FieldType::Text);
    assert_eq!(schema.field("extra").unwrap().field_type, FieldType::Json);
}

#[test]
fn field_type_serializes_snake_case() {
    let json = serde_json::to_string(&FieldType::Number).unwrap();
    assert_eq!(json, r#""number""#);
}

#[test]
fn unknown_field_type_is_rejected() {
    let result = serde_json::from_str::<FieldDef>(r#"{"name": "author", "type": "relation"}"#);
    assert!(result.is_err());
}

// ── Catalog ──────────────────────────────────────────────────────

#[test]
fn catalog_lookup_and_names() {
    let catalog: SchemaCatalog = vec![books(), SchemaDefinition::new("authors", vec![])]
        .into_iter()
        .collect();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.contains("books"));
    assert!(catalog.get("chapters").is_none());
    assert_eq!(catalog.names(), vec!["authors", "books"]);
}

#[test]
fn catalog_insert_replaces_definition() {
    let mut catalog = SchemaCatalog::new().with(books());
    catalog.insert(SchemaDefinition::new("books", vec![FieldDef::text("isbn")]));
    assert_eq!(catalog.len(), 1);
    assert!(catalog.get("books").unwrap().recognizes("isbn"));
    assert!(!catalog.get("books").unwrap().recognizes("title"));
}
