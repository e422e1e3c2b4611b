use docflow_engine::{EngineError, HookContext, HookError, HookPoint, HookRegistry, LifecycleEngine, SchemaConfig};
use docflow_model::{FieldDef, Record, SchemaCatalog, SchemaDefinition};
use docflow_plugins::{ContentReview, ReviewedOperation, VersionControl};
use docflow_storage::MemoryStore;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn engine_with(store: &MemoryStore, config: SchemaConfig) -> LifecycleEngine {
    let registry = HookRegistry::builder().schema("books", config).build().unwrap();
    let catalog = SchemaCatalog::new().with(SchemaDefinition::new("books", vec![FieldDef::text("title")]));
    LifecycleEngine::new(Arc::new(store.clone()), registry, catalog)
}

fn reviewed(store: &MemoryStore) -> LifecycleEngine {
    engine_with(store, SchemaConfig::new().with_plugin(Arc::new(ContentReview::new())))
}

async fn confirm(engine: &LifecycleEngine, review_id: &Value, status: &str) -> Result<Value, EngineError> {
    engine
        .dispatch(
            "books",
            "review",
            "confirm",
            HookContext::with_body(json!({"reviewId": review_id, "status": status})),
        )
        .await
}

fn is_bad_request(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::Hook { point: HookPoint::Operation, source, .. } if matches!(**source, HookError::BadRequest(_))
    )
}

// ── Create under review ──────────────────────────────────────────

#[tokio::test]
async fn create_is_parked_until_approved() {
    let store = MemoryStore::new();
    let engine = reviewed(&store);

    let pending = engine
        .create("books", record(json!({"title": "Y"})), HookContext::new())
        .await
        .unwrap();

    assert_eq!(pending["status"], json!("in review"));
    assert_eq!(pending["type"], json!("create"));
    assert_eq!(pending["payload"], json!({"data": {"title": "Y"}}));
    assert!(pending["reviewId"].as_str().unwrap().starts_with("review_books_"));
    assert_eq!(store.count("books").await, 0);
    assert_eq!(store.count("__books_review").await, 1);

    let approved = confirm(&engine, &pending["reviewId"], "approved").await.unwrap();
    assert_eq!(approved["title"], json!("Y"));
    assert!(approved["_id"].is_string());
    assert_eq!(store.count("books").await, 1);

    let entries = store.snapshot("__books_review").await;
    assert_eq!(entries[0]["status"], json!("approved"));
}

#[tokio::test]
async fn approving_twice_is_a_bad_request() {
    let store = MemoryStore::new();
    let engine = reviewed(&store);
    let pending = engine
        .create("books", record(json!({"title": "Y"})), HookContext::new())
        .await
        .unwrap();

    confirm(&engine, &pending["reviewId"], "approved").await.unwrap();
    let err = confirm(&engine, &pending["reviewId"], "approved").await.unwrap_err();
    assert!(is_bad_request(&err), "unexpected error: {err}");
    assert_eq!(store.count("books").await, 1);
}

#[tokio::test]
async fn rejection_marks_the_entry() {
    let store = MemoryStore::new();
    let engine = reviewed(&store);
    let pending = engine
        .create("books", record(json!({"title": "Y"})), HookContext::new())
        .await
        .unwrap();

    let rejected = confirm(&engine, &pending["reviewId"], "reject").await.unwrap();
    assert_eq!(rejected["status"], json!("reject"));
    assert_eq!(store.count("books").await, 0);
}

#[tokio::test]
async fn unknown_review_and_status_are_rejected() {
    let store = MemoryStore::new();
    let engine = reviewed(&store);

    let err = confirm(&engine, &json!("review_books_missing"), "approved").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Hook { ref source, .. } if matches!(**source, HookError::NotFound(_))
    ));

    let err = confirm(&engine, &json!("review_books_missing"), "maybe").await.unwrap_err();
    assert!(is_bad_request(&err));
}

// ── Update and delete under review ───────────────────────────────

#[tokio::test]
async fn update_and_delete_replay_through_the_lifecycle() {
    let store = MemoryStore::new();
    store
        .seed("books", vec![record(json!({"_id": "b1", "title": "Dune"}))])
        .await
        .unwrap();
    let plugin = ContentReview::new().with_operations(vec![ReviewedOperation::Update, ReviewedOperation::Delete]);
    let engine = engine_with(
        &store,
        SchemaConfig::new()
            .with_plugin(Arc::new(plugin))
            .with_plugin(Arc::new(VersionControl::new())),
    );

    let pending = engine
        .update_by_id("books", "b1", record(json!({"title": "Dune Messiah"})), HookContext::new())
        .await
        .unwrap();
    assert_eq!(pending["payload"], json!({"_id": "b1", "data": {"title": "Dune Messiah"}}));
    assert_eq!(store.snapshot("books").await[0]["title"], json!("Dune"));

    let updated = confirm(&engine, &pending["reviewId"], "approved").await.unwrap();
    assert_eq!(updated["title"], json!("Dune Messiah"));
    assert_eq!(store.count("__books_versions").await, 1);

    let pending = engine.delete_by_id("books", "b1", HookContext::new()).await.unwrap();
    assert_eq!(pending["payload"], json!({"_id": "b1"}));
    assert_eq!(store.count("books").await, 1);

    confirm(&engine, &pending["reviewId"], "approved").await.unwrap();
    assert_eq!(store.count("books").await, 0);
    assert_eq!(store.count("__books_versions").await, 2);
}

#[tokio::test]
async fn creates_pass_when_only_updates_are_reviewed() {
    let store = MemoryStore::new();
    let plugin = ContentReview::new().with_operations(vec![ReviewedOperation::Update]);
    let engine = engine_with(&store, SchemaConfig::new().with_plugin(Arc::new(plugin)));

    let created = engine
        .create("books", record(json!({"title": "Direct"})), HookContext::new())
        .await
        .unwrap();
    assert_eq!(created["title"], json!("Direct"));
    assert_eq!(store.count("__books_review").await, 0);
}

// ── Listing ──────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_by_status() {
    let store = MemoryStore::new();
    let engine = reviewed(&store);
    for title in ["A", "B"] {
        engine
            .create("books", record(json!({"title": title})), HookContext::new())
            .await
            .unwrap();
    }
    let first = store.snapshot("__books_review").await[0]["reviewId"].clone();
    confirm(&engine, &first, "reject").await.unwrap();

    let listed = engine
        .dispatch(
            "books",
            "review",
            "list",
            HookContext::with_body(json!({"filter": {"status": "in review"}})),
        )
        .await
        .unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["payload"]["data"]["title"], json!("B"));
}
