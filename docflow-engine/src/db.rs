//! The two persistence facades handed to hooks.
//!
//! [`Db`] re-enters the lifecycle engine, so records written through it run
//! the target schema's hooks. [`RawDb`] talks to the store directly inside the
//! current operation's transaction and runs no hooks at all.

use crate::context::HookContext;
use crate::engine::LifecycleEngine;
use crate::error::EngineResult;
use crate::state::{OperationState, Scope};
use docflow_model::{Document, Filter, FindOptions, Record, merge_records};
use docflow_storage::{StorageError, StorageResult};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// Schema-level CRUD with hooks, bound to the calling operation.
///
/// Nested operations share the caller's context and transaction, run their
/// own deferred calls when they finish and never commit.
#[derive(Clone)]
pub struct Db {
    engine: LifecycleEngine,
    scope: Arc<Scope>,
}

impl Db {
    pub(crate) fn new(engine: LifecycleEngine, scope: Arc<Scope>) -> Self {
        Self { engine, scope }
    }

    pub fn context(&self) -> HookContext {
        self.scope.context().clone()
    }

    pub fn find(&self, schema: &str, options: FindOptions) -> BoxFuture<'static, EngineResult<Vec<Value>>> {
        let (engine, state, schema) = self.nested(schema);
        Box::pin(async move {
            let result = engine.exec_find(&state, &schema, &options).await;
            engine.finish(&state, &schema, "find", result).await
        })
    }

    /// Looks a record up by identifier.
    pub fn find_one(&self, schema: &str, id: &str) -> BoxFuture<'static, EngineResult<Option<Value>>> {
        let (engine, state, schema) = self.nested(schema);
        let id = id.to_string();
        Box::pin(async move {
            let result = engine.exec_find_by_id(&state, &schema, &id).await;
            engine.finish(&state, &schema, "findOne", result).await
        })
    }

    pub fn create(&self, schema: &str, record: Record) -> BoxFuture<'static, EngineResult<Value>> {
        let (engine, state, schema) = self.nested(schema);
        Box::pin(async move {
            let result = engine.exec_create(&state, &schema, record).await;
            engine.finish(&state, &schema, "create", result).await
        })
    }

    pub fn create_many(&self, schema: &str, records: Vec<Record>) -> BoxFuture<'static, EngineResult<Vec<Value>>> {
        let (engine, state, schema) = self.nested(schema);
        Box::pin(async move {
            let result = engine.exec_create_many(&state, &schema, records).await;
            engine.finish(&state, &schema, "createMany", result).await
        })
    }

    pub fn update(&self, schema: &str, filter: Filter, data: Record) -> BoxFuture<'static, EngineResult<Vec<Value>>> {
        let (engine, state, schema) = self.nested(schema);
        Box::pin(async move {
            let result = engine.exec_update(&state, &schema, &filter, data).await;
            engine.finish(&state, &schema, "update", result).await
        })
    }

    pub fn update_by_id(&self, schema: &str, id: &str, data: Record) -> BoxFuture<'static, EngineResult<Value>> {
        let (engine, state, schema) = self.nested(schema);
        let id = id.to_string();
        Box::pin(async move {
            let result = engine.exec_update_by_id(&state, &schema, &id, data).await;
            engine.finish(&state, &schema, "updateById", result).await
        })
    }

    pub fn delete(&self, schema: &str, filter: Filter) -> BoxFuture<'static, EngineResult<Vec<Value>>> {
        let (engine, state, schema) = self.nested(schema);
        Box::pin(async move {
            let result = engine.exec_delete(&state, &schema, &filter).await;
            engine.finish(&state, &schema, "delete", result).await
        })
    }

    pub fn delete_by_id(&self, schema: &str, id: &str) -> BoxFuture<'static, EngineResult<Value>> {
        let (engine, state, schema) = self.nested(schema);
        let id = id.to_string();
        Box::pin(async move {
            let result = engine.exec_delete_by_id(&state, &schema, &id).await;
            engine.finish(&state, &schema, "deleteById", result).await
        })
    }

    fn nested(&self, schema: &str) -> (LifecycleEngine, OperationState, String) {
        (
            self.engine.clone(),
            OperationState::nested(Arc::clone(&self.scope)),
            schema.to_string(),
        )
    }
}

/// Collection-level access inside the current operation's transaction.
///
/// Writes open the transaction if needed. Reads see the transaction's own
/// writes once it is open, committed state before that.
#[derive(Clone)]
pub struct RawDb {
    scope: Arc<Scope>,
}

impl RawDb {
    pub(crate) fn new(scope: Arc<Scope>) -> Self {
        Self { scope }
    }

    pub async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>> {
        self.scope.find(collection, options).await
    }

    pub async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        self.scope.find_one(collection, filter).await
    }

    pub async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        self.scope.find_by_id(collection, id).await
    }

    pub async fn insert_one(&self, collection: &str, record: Record) -> StorageResult<Document> {
        let txn = self.scope.transaction().await?;
        txn.insert_many(collection, vec![record])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Backend(format!("insert into {collection} returned nothing")))
    }

    pub async fn replace_by_id(&self, collection: &str, id: &str, document: Document) -> StorageResult<Option<Document>> {
        let txn = self.scope.transaction().await?;
        txn.replace_by_id(collection, id, document).await
    }

    /// Merges `fields` into the stored document.
    pub async fn set_fields(&self, collection: &str, id: &str, fields: Record) -> StorageResult<Option<Document>> {
        let txn = self.scope.transaction().await?;
        let Some(current) = txn.find_by_id(collection, id).await? else {
            return Ok(None);
        };
        txn.replace_by_id(collection, id, merge_records(&current, &fields)).await
    }

    pub async fn delete_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let txn = self.scope.transaction().await?;
        txn.delete_by_id(collection, id).await
    }

    pub async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let txn = self.scope.transaction().await?;
        txn.delete_many(collection, filter).await
    }

    /// Commits the operation's transaction. Meant for catchException hooks
    /// that recovered the operation.
    pub async fn commit(&self) -> StorageResult<()> {
        self.scope.commit().await
    }

    pub async fn abort(&self) -> StorageResult<()> {
        self.scope.abort().await
    }
}
