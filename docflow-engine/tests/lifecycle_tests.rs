mod common;

use common::{engine_with, entries, filter, log, record, seed_books};
use docflow_engine::{
    EngineError, HookContext, HookFlow, HookPoint, HookRegistry, HookUnit, PointHook, SchemaConfig,
};
use docflow_model::{FindOptions, PureSnapshot, Record, SortKey};
use docflow_storage::{DocumentStore, MemoryStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn tag_create(tag: &'static str, log: common::Log) -> PointHook {
    PointHook::before_create(move |args| {
        let log = log.clone();
        async move {
            log.lock().unwrap().push(tag.to_string());
            Ok(HookFlow::Proceed(args.data))
        }
    })
}

// ── Hook ordering ────────────────────────────────────────────────

#[tokio::test]
async fn config_hooks_run_before_declarative_hooks_in_order() {
    let calls = log();
    let registry = HookRegistry::builder()
        .schema(
            "books",
            SchemaConfig::new()
                .with_hook(tag_create("config-1", calls.clone()))
                .with_hook(tag_create("config-2", calls.clone())),
        )
        .register("books", tag_create("declared-1", calls.clone()))
        .register_unit(
            HookUnit::new("audit")
                .for_schema("books")
                .hook(tag_create("declared-2", calls.clone())),
        )
        .build()
        .unwrap();
    assert_eq!(registry.count("books", HookPoint::BeforeCreate), 4);

    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);
    engine
        .create("books", record(json!({"title": "X"})), HookContext::new())
        .await
        .unwrap();

    assert_eq!(entries(&calls), vec!["config-1", "config-2", "declared-1", "declared-2"]);
}

#[tokio::test]
async fn each_hook_receives_previous_output() {
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_create(|mut args| async move {
                args.data.insert("year".into(), json!(1999));
                Ok(HookFlow::Proceed(args.data))
            }),
        )
        .register(
            "books",
            PointHook::before_create(|mut args| async move {
                let year = args.data["year"].as_i64().unwrap_or_default();
                args.data.insert("year".into(), json!(year + 1));
                Ok(HookFlow::Proceed(args.data))
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let created = engine
        .create("books", record(json!({"title": "X"})), HookContext::new())
        .await
        .unwrap();
    assert_eq!(created["year"], json!(2000));
}

// ── Create ───────────────────────────────────────────────────────

#[tokio::test]
async fn before_create_can_assign_the_identifier() {
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_create(|mut args| async move {
                args.data.insert("_id".into(), json!("book_123"));
                Ok(HookFlow::Proceed(args.data))
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let created = engine
        .create("books", record(json!({"title": "X"})), HookContext::new())
        .await
        .unwrap();

    assert_eq!(created["_id"], json!("book_123"));
    let stored = store.find_by_id("books", "book_123").await.unwrap().unwrap();
    assert_eq!(stored["title"], json!("X"));
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn pure_snapshots_ignore_later_mutation() {
    let seen: Arc<Mutex<Vec<PureSnapshot<Record>>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_doc: Arc<Mutex<Option<PureSnapshot<Record>>>> = Arc::new(Mutex::new(None));
    let (a, b) = (seen.clone(), seen.clone());
    let d = seen_doc.clone();
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_create(move |mut args| {
                let a = a.clone();
                async move {
                    a.lock().unwrap().push(args.pure_data.clone());
                    args.data.insert("title".into(), json!("mutated"));
                    Ok(HookFlow::Proceed(args.data))
                }
            }),
        )
        .register(
            "books",
            PointHook::before_create(move |args| {
                let b = b.clone();
                async move {
                    b.lock().unwrap().push(args.pure_data.clone());
                    Ok(HookFlow::Proceed(args.data))
                }
            }),
        )
        .register(
            "books",
            PointHook::after_create(move |mut args| {
                let d = d.clone();
                async move {
                    *d.lock().unwrap() = Some(args.pure_document.clone());
                    args.document.insert("title".into(), json!("replaced"));
                    Ok(args.document)
                }
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let input = record(json!({"title": "original"}));
    let created = engine.create("books", input.clone(), HookContext::new()).await.unwrap();

    let snapshots = seen.lock().unwrap().clone();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots.iter().all(|s| *s == input));
    let pure_document = seen_doc.lock().unwrap().clone().unwrap();
    assert_eq!(pure_document["title"], json!("mutated"));
    assert_eq!(created["title"], json!("replaced"));
}

#[tokio::test]
async fn unknown_schema_is_rejected() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, HookRegistry::empty());
    let err = engine
        .create("ghosts", record(json!({})), HookContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownSchema(ref s) if s == "ghosts"));
}

#[tokio::test]
async fn create_many_runs_each_record_in_one_transaction() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, HookRegistry::empty());
    let created = engine
        .create_many(
            "books",
            vec![record(json!({"title": "A"})), record(json!({"title": "B"}))],
            HookContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(store.count("books").await, 2);
    assert_eq!(store.commit_count(), 1);
}

#[tokio::test]
async fn deferring_pre_hook_skips_persistence_but_completes() {
    let after_calls = log();
    let ac = after_calls.clone();
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_create(|args| async move {
                args.raw_db
                    .insert_one("__books_pending", args.data.clone())
                    .await?;
                Ok(HookFlow::Defer(json!({"status": "pending"})))
            }),
        )
        .register(
            "books",
            PointHook::after_create(move |args| {
                let ac = ac.clone();
                async move {
                    ac.lock().unwrap().push("after".into());
                    Ok(args.document)
                }
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let result = engine
        .create("books", record(json!({"title": "Held"})), HookContext::new())
        .await
        .unwrap();

    assert_eq!(result, json!({"status": "pending"}));
    assert_eq!(store.count("books").await, 0);
    assert_eq!(store.count("__books_pending").await, 1);
    assert!(entries(&after_calls).is_empty());
}

// ── Update ───────────────────────────────────────────────────────

#[tokio::test]
async fn update_merges_and_keeps_identifier() {
    let targets = Arc::new(Mutex::new(Vec::new()));
    let t = targets.clone();
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_update(move |mut args| {
                let t = t.clone();
                async move {
                    t.lock().unwrap().push(args.target_document.clone());
                    args.data.insert("_id".into(), json!("hijacked"));
                    Ok(HookFlow::Proceed(args.data))
                }
            }),
        )
        .register(
            "books",
            PointHook::after_update(|mut args| async move {
                assert_eq!(args.original_document["year"], json!(1965));
                args.current_document.insert("seen".into(), json!(true));
                Ok(args.current_document)
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, registry);

    let updated = engine
        .update_by_id("books", "b1", record(json!({"year": 1966})), HookContext::new())
        .await
        .unwrap();

    let target = targets.lock().unwrap()[0].clone();
    assert_eq!(target, record(json!({"_id": "b1", "title": "Dune", "year": 1966})));
    assert_eq!(updated["_id"], json!("b1"));
    assert_eq!(updated["seen"], json!(true));

    let stored = store.find_by_id("books", "b1").await.unwrap().unwrap();
    assert_eq!(stored["year"], json!(1966));
    assert_eq!(stored["title"], json!("Dune"));
    assert!(store.find_by_id("books", "hijacked").await.unwrap().is_none());
}

#[tokio::test]
async fn update_by_missing_id_is_not_found() {
    let store = MemoryStore::new();
    let engine = engine_with(&store, HookRegistry::empty());
    let err = engine
        .update_by_id("books", "nope", record(json!({"year": 1})), HookContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { ref id, .. } if id == "nope"));
}

#[tokio::test]
async fn bulk_update_applies_to_every_match() {
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, HookRegistry::empty());
    let updated = engine
        .update(
            "books",
            filter(json!({"year": {"$lt": 2000}})),
            record(json!({"archived": true})),
            HookContext::new(),
        )
        .await
        .unwrap();
    assert_eq!(updated.len(), 2);
    assert!(store.snapshot("books").await.iter().all(|d| d["archived"] == json!(true)));
}

// ── Delete ───────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_delete_with_empty_filter_is_rejected() {
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, HookRegistry::empty());
    let err = engine
        .delete("books", filter(json!({})), HookContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsafeFilter { .. }));
    assert_eq!(store.count("books").await, 2);
}

#[tokio::test]
async fn bulk_delete_with_only_unknown_keys_is_rejected() {
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, HookRegistry::empty());
    let err = engine
        .delete("books", filter(json!({"colour": "red"})), HookContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsafeFilter { .. }));
}

#[tokio::test]
async fn bulk_delete_with_a_recognized_key_runs_hooks() {
    let calls = log();
    let (before, after) = (calls.clone(), calls.clone());
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_delete(move |args| {
                let before = before.clone();
                async move {
                    before.lock().unwrap().push(format!("before:{}", args.document["_id"]));
                    Ok(HookFlow::Proceed(()))
                }
            }),
        )
        .register(
            "books",
            PointHook::after_delete(move |args| {
                let after = after.clone();
                async move {
                    after.lock().unwrap().push(format!("after:{}", args.pure_document["_id"]));
                    Ok(())
                }
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, registry);

    let deleted = engine
        .delete("books", filter(json!({"title": "Dune", "colour": "red"})), HookContext::new())
        .await
        .unwrap();

    assert_eq!(deleted.len(), 0, "colour does not exist on any record");
    let deleted = engine
        .delete("books", filter(json!({"title": "Dune"})), HookContext::new())
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(entries(&calls), vec![r#"before:"b1""#, r#"after:"b1""#]);
    assert_eq!(store.count("books").await, 1);
}

#[tokio::test]
async fn delete_by_id_returns_the_removed_document() {
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, HookRegistry::empty());
    let removed = engine.delete_by_id("books", "b2", HookContext::new()).await.unwrap();
    assert_eq!(removed["title"], json!("Emma"));
    assert!(store.find_by_id("books", "b2").await.unwrap().is_none());
}

// ── Query ────────────────────────────────────────────────────────

#[tokio::test]
async fn find_runs_after_query_per_document() {
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::after_query(|mut args| async move {
                args.document.insert("decorated".into(), json!(true));
                Ok(args.document)
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    seed_books(&store).await;
    let engine = engine_with(&store, registry);

    let found = engine
        .find("books", FindOptions::new().sort(SortKey::asc("year")), HookContext::new())
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["_id"], json!("b2"));
    assert!(found.iter().all(|d| d["decorated"] == json!(true)));
}

#[tokio::test]
async fn find_by_missing_id_returns_none_without_hooks() {
    let calls = log();
    let c = calls.clone();
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::after_query(move |args| {
                let c = c.clone();
                async move {
                    c.lock().unwrap().push("query".into());
                    Ok(args.document)
                }
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    assert!(engine.find_by_id("books", "nope", HookContext::new()).await.unwrap().is_none());
    assert!(entries(&calls).is_empty());
}

// ── Nested operations ────────────────────────────────────────────

#[tokio::test]
async fn nested_create_shares_context_and_transaction() {
    let contexts = Arc::new(Mutex::new(Vec::new()));
    let c = contexts.clone();
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::after_create(|args| async move {
                args.context.set("origin", json!("books"));
                let author = args
                    .db
                    .create("authors", record(json!({"name": args.document["author"].clone()})))
                    .await?;
                let mut document = args.document;
                document.insert("authorId".into(), author["_id"].clone());
                Ok(document)
            }),
        )
        .register(
            "authors",
            PointHook::before_create(move |args| {
                let c = c.clone();
                async move {
                    c.lock().unwrap().push(args.context.get("origin"));
                    Ok(HookFlow::Proceed(args.data))
                }
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let created = engine
        .create("books", record(json!({"title": "Dune", "author": "Herbert"})), HookContext::new())
        .await
        .unwrap();

    assert_eq!(*contexts.lock().unwrap(), vec![Some(json!("books"))]);
    assert!(created["authorId"].is_string());
    assert_eq!(store.count("authors").await, 1);
    assert_eq!(store.commit_count(), 1, "nested create must not commit on its own");
}

#[tokio::test]
async fn nested_writes_roll_back_with_the_parent() {
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::after_create(|args| async move {
                args.db.create("authors", record(json!({"name": "Ghost"}))).await?;
                Err(docflow_engine::HookError::bad_request("refused"))
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let err = engine
        .create("books", record(json!({"title": "X"})), HookContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Hook { point: HookPoint::AfterCreate, .. }));
    assert_eq!(store.count("books").await, 0);
    assert_eq!(store.count("authors").await, 0);
}

#[tokio::test]
async fn concurrent_operations_keep_separate_contexts() {
    let registry = HookRegistry::builder()
        .register(
            "books",
            PointHook::before_create(|mut args| async move {
                let who = args.context.get("user").unwrap_or_default();
                tokio::task::yield_now().await;
                args.data.insert("createdBy".into(), who);
                Ok(HookFlow::Proceed(args.data))
            }),
        )
        .build()
        .unwrap();
    let store = MemoryStore::new();
    let engine = engine_with(&store, registry);

    let ctx = |user: &str| {
        let context = HookContext::new();
        context.set("user", json!(user));
        context
    };
    let (a, b) = tokio::join!(
        engine.create("books", record(json!({"title": "A"})), ctx("ann")),
        engine.create("books", record(json!({"title": "B"})), ctx("bob")),
    );
    assert_eq!(a.unwrap()["createdBy"], json!("ann"));
    assert_eq!(b.unwrap()["createdBy"], json!("bob"));
}
