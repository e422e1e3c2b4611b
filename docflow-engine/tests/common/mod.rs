//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use docflow_engine::{HookRegistry, LifecycleEngine};
use docflow_model::{Document, FieldDef, Filter, FindOptions, Record, SchemaCatalog, SchemaDefinition};
use docflow_storage::{DocumentStore, MemoryStore, StorageResult, StoreTransaction};
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn filter(value: Value) -> Filter {
    record(value)
}

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::new()
        .with(SchemaDefinition::new(
            "books",
            vec![FieldDef::text("title"), FieldDef::number("year"), FieldDef::text("author")],
        ))
        .with(SchemaDefinition::new("authors", vec![FieldDef::text("name")]))
}

pub fn engine_with(store: &MemoryStore, registry: HookRegistry) -> LifecycleEngine {
    LifecycleEngine::new(Arc::new(store.clone()), registry, catalog())
}

pub async fn seed_books(store: &MemoryStore) {
    store
        .seed(
            "books",
            vec![
                record(serde_json::json!({"_id": "b1", "title": "Dune", "year": 1965})),
                record(serde_json::json!({"_id": "b2", "title": "Emma", "year": 1815})),
            ],
        )
        .await
        .unwrap();
}

/// A store whose transactions report every insert twice.
pub struct DoubleInsertStore {
    pub inner: MemoryStore,
}

struct DoubleInsertTxn {
    inner: Arc<dyn StoreTransaction>,
}

#[async_trait]
impl DocumentStore for DoubleInsertStore {
    async fn begin(&self) -> StorageResult<Arc<dyn StoreTransaction>> {
        Ok(Arc::new(DoubleInsertTxn {
            inner: self.inner.begin().await?,
        }))
    }

    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>> {
        self.inner.find(collection, options).await
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.inner.find_by_id(collection, id).await
    }
}

#[async_trait]
impl StoreTransaction for DoubleInsertTxn {
    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>> {
        self.inner.find(collection, options).await
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.inner.find_by_id(collection, id).await
    }

    async fn insert_many(&self, collection: &str, records: Vec<Record>) -> StorageResult<Vec<Document>> {
        let stored = self.inner.insert_many(collection, records).await?;
        Ok(stored.iter().chain(stored.iter()).cloned().collect())
    }

    async fn replace_by_id(&self, collection: &str, id: &str, document: Document) -> StorageResult<Option<Document>> {
        self.inner.replace_by_id(collection, id, document).await
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.inner.delete_by_id(collection, id).await
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        self.inner.delete_many(collection, filter).await
    }

    async fn commit(&self) -> StorageResult<()> {
        self.inner.commit().await
    }

    async fn abort(&self) -> StorageResult<()> {
        self.inner.abort().await
    }
}
