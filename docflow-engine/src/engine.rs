//! The lifecycle engine.
//!
//! Each public call is a top-level operation with its own
//! [`OperationState`]. Records move through
//! `before* → persist → after*`, then deferred calls run and the transaction
//! commits. A [`HookException`] from either hook phase hands control to the
//! recovery protocol; any other failure aborts the transaction, runs the
//! schema's afterError hooks and propagates.

use crate::context::HookContext;
use crate::deferred::DeferredCalls;
use crate::error::{EngineError, EngineResult, ErrorReport, HookError, HookException};
use crate::hook::{
    AfterCreateArgs, AfterErrorArgs, AfterQueryArgs, AfterUpdateArgs, BeforeCreateArgs, BeforeUpdateArgs, DeleteArgs,
    HookFlow, HookPoint, OperationArgs,
};
use crate::recovery::{ExceptionData, RecoveryEnv, execute_exception_hooks};
use crate::registry::HookRegistry;
use crate::state::{OperationState, Scope};
use docflow_model::{
    Document, Filter, FindOptions, PureSnapshot, Record, RecordExt, SchemaCatalog, merge_records,
};
use docflow_storage::DocumentStore;
use futures::future::try_join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

struct EngineInner {
    store: Arc<dyn DocumentStore>,
    registry: HookRegistry,
    catalog: SchemaCatalog,
}

/// Runs CRUD operations and named operations through their hooks.
///
/// Cloning is cheap; all clones share the store, registry and catalog. No
/// per-call state lives here, so concurrent calls never interfere.
#[derive(Clone)]
pub struct LifecycleEngine {
    inner: Arc<EngineInner>,
}

impl LifecycleEngine {
    pub fn new(store: Arc<dyn DocumentStore>, registry: HookRegistry, catalog: SchemaCatalog) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                registry,
                catalog,
            }),
        }
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.inner.registry
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.inner.catalog
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.inner.store
    }

    fn root_state(&self, context: HookContext) -> OperationState {
        OperationState::root(Arc::clone(&self.inner.store), context)
    }

    // ── Public operations ────────────────────────────────────────

    pub async fn find(&self, schema: &str, options: FindOptions, context: HookContext) -> EngineResult<Vec<Value>> {
        let state = self.root_state(context);
        let result = self.exec_find(&state, schema, &options).await;
        self.finish(&state, schema, "find", result).await
    }

    pub async fn find_by_id(&self, schema: &str, id: &str, context: HookContext) -> EngineResult<Option<Value>> {
        let state = self.root_state(context);
        let result = self.exec_find_by_id(&state, schema, id).await;
        self.finish(&state, schema, "findById", result).await
    }

    pub async fn create(&self, schema: &str, record: Record, context: HookContext) -> EngineResult<Value> {
        let state = self.root_state(context);
        let result = self.exec_create(&state, schema, record).await;
        self.finish(&state, schema, "create", result).await
    }

    pub async fn create_many(
        &self,
        schema: &str,
        records: Vec<Record>,
        context: HookContext,
    ) -> EngineResult<Vec<Value>> {
        let state = self.root_state(context);
        let result = self.exec_create_many(&state, schema, records).await;
        self.finish(&state, schema, "createMany", result).await
    }

    pub async fn update(
        &self,
        schema: &str,
        filter: Filter,
        data: Record,
        context: HookContext,
    ) -> EngineResult<Vec<Value>> {
        let state = self.root_state(context);
        let result = self.exec_update(&state, schema, &filter, data).await;
        self.finish(&state, schema, "update", result).await
    }

    pub async fn update_by_id(&self, schema: &str, id: &str, data: Record, context: HookContext) -> EngineResult<Value> {
        let state = self.root_state(context);
        let result = self.exec_update_by_id(&state, schema, id, data).await;
        self.finish(&state, schema, "updateById", result).await
    }

    pub async fn delete(&self, schema: &str, filter: Filter, context: HookContext) -> EngineResult<Vec<Value>> {
        let state = self.root_state(context);
        let result = self.exec_delete(&state, schema, &filter).await;
        self.finish(&state, schema, "delete", result).await
    }

    pub async fn delete_by_id(&self, schema: &str, id: &str, context: HookContext) -> EngineResult<Value> {
        let state = self.root_state(context);
        let result = self.exec_delete_by_id(&state, schema, id).await;
        self.finish(&state, schema, "deleteById", result).await
    }

    /// Runs the named operation `(operation_type, action)` of `schema`.
    pub async fn dispatch(
        &self,
        schema: &str,
        operation_type: &str,
        action: &str,
        context: HookContext,
    ) -> EngineResult<Value> {
        let state = self.root_state(context);
        let result = self.exec_dispatch(&state, schema, operation_type, action).await;
        let path = format!("{operation_type}.{action}");
        self.finish(&state, schema, &path, result).await
    }

    // ── Operation bodies ─────────────────────────────────────────

    fn ensure_schema(&self, schema: &str) -> EngineResult<()> {
        if self.inner.catalog.contains(schema) {
            Ok(())
        } else {
            Err(EngineError::UnknownSchema(schema.to_string()))
        }
    }

    pub(crate) async fn exec_find(
        &self,
        state: &OperationState,
        schema: &str,
        options: &FindOptions,
    ) -> EngineResult<Vec<Value>> {
        self.ensure_schema(schema)?;
        let documents = state.scope.find(schema, options).await?;
        debug!(schema, count = documents.len(), "query resolved");
        let results = try_join_all(documents.into_iter().map(|doc| self.after_query(state, schema, doc))).await;
        state.clear_recovered();
        results
    }

    pub(crate) async fn exec_find_by_id(
        &self,
        state: &OperationState,
        schema: &str,
        id: &str,
    ) -> EngineResult<Option<Value>> {
        self.ensure_schema(schema)?;
        match state.scope.find_by_id(schema, id).await? {
            Some(document) => self.after_query(state, schema, document).await.map(Some),
            None => Ok(None),
        }
    }

    pub(crate) async fn exec_create(&self, state: &OperationState, schema: &str, record: Record) -> EngineResult<Value> {
        self.ensure_schema(schema)?;
        self.create_one(state, schema, record).await
    }

    pub(crate) async fn exec_create_many(
        &self,
        state: &OperationState,
        schema: &str,
        records: Vec<Record>,
    ) -> EngineResult<Vec<Value>> {
        self.ensure_schema(schema)?;
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.create_one(state, schema, record).await?);
        }
        state.clear_recovered();
        Ok(results)
    }

    pub(crate) async fn exec_update(
        &self,
        state: &OperationState,
        schema: &str,
        filter: &Filter,
        data: Record,
    ) -> EngineResult<Vec<Value>> {
        self.ensure_schema(schema)?;
        let originals = state
            .scope
            .find(schema, &FindOptions::new().filter(filter.clone()))
            .await?;
        let mut results = Vec::with_capacity(originals.len());
        for original in originals {
            results.push(self.update_one(state, schema, original, data.clone()).await?);
        }
        state.clear_recovered();
        Ok(results)
    }

    pub(crate) async fn exec_update_by_id(
        &self,
        state: &OperationState,
        schema: &str,
        id: &str,
        data: Record,
    ) -> EngineResult<Value> {
        self.ensure_schema(schema)?;
        let original = self.require(state, schema, id).await?;
        self.update_one(state, schema, original, data).await
    }

    pub(crate) async fn exec_delete(
        &self,
        state: &OperationState,
        schema: &str,
        filter: &Filter,
    ) -> EngineResult<Vec<Value>> {
        self.ensure_schema(schema)?;
        self.validate_delete_filter(schema, filter)?;
        let documents = state
            .scope
            .find(schema, &FindOptions::new().filter(filter.clone()))
            .await?;
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            results.push(self.delete_one(state, schema, document).await?);
        }
        state.clear_recovered();
        Ok(results)
    }

    pub(crate) async fn exec_delete_by_id(&self, state: &OperationState, schema: &str, id: &str) -> EngineResult<Value> {
        self.ensure_schema(schema)?;
        let document = self.require(state, schema, id).await?;
        self.delete_one(state, schema, document).await
    }

    async fn exec_dispatch(
        &self,
        state: &OperationState,
        schema: &str,
        operation_type: &str,
        action: &str,
    ) -> EngineResult<Value> {
        let operation = self
            .inner
            .registry
            .dispatcher()
            .resolve(schema, operation_type, action)
            .ok_or_else(|| EngineError::OperationNotFound {
                schema: schema.to_string(),
                operation_type: operation_type.to_string(),
                action: action.to_string(),
            })?;
        debug!(schema, operation_type, action, "dispatching operation");
        let args = OperationArgs {
            schema: schema.to_string(),
            operation_type: operation_type.to_string(),
            action: action.to_string(),
            db: state.db(self),
            raw_db: state.raw_db(),
            context: state.context(),
        };
        (operation.handler)(args)
            .await
            .map_err(|e| EngineError::from_hook(schema, HookPoint::Operation, e))
    }

    async fn require(&self, state: &OperationState, schema: &str, id: &str) -> EngineResult<Document> {
        state
            .scope
            .find_by_id(schema, id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                schema: schema.to_string(),
                id: id.to_string(),
            })
    }

    /// Rejects bulk delete filters that could match more than intended.
    fn validate_delete_filter(&self, schema: &str, filter: &Filter) -> EngineResult<()> {
        let unsafe_filter = |reason: &str| EngineError::UnsafeFilter {
            schema: schema.to_string(),
            reason: reason.to_string(),
        };
        if filter.is_empty() {
            return Err(unsafe_filter("filter is empty"));
        }
        let definition = self
            .inner
            .catalog
            .get(schema)
            .ok_or_else(|| EngineError::UnknownSchema(schema.to_string()))?;
        if !filter.keys().any(|key| definition.recognizes(key)) {
            return Err(unsafe_filter("filter names no field of the schema"));
        }
        Ok(())
    }

    // ── Per-record pipelines ─────────────────────────────────────

    async fn create_one(&self, state: &OperationState, schema: &str, data: Record) -> EngineResult<Value> {
        let hooks = self.inner.registry.hooks(schema);
        let pure_data = PureSnapshot::of(&data);
        let mut data = data;

        for hook in &hooks.before_create {
            let args = BeforeCreateArgs {
                schema: schema.to_string(),
                data: data.clone(),
                pure_data: pure_data.clone(),
                db: state.db(self),
                raw_db: state.raw_db(),
                context: state.context(),
                defer: state.deferred.clone(),
            };
            match hook(args).await {
                Ok(HookFlow::Proceed(next)) => data = next,
                Ok(HookFlow::Defer(value)) => {
                    debug!(schema, "create deferred by hook");
                    return Ok(value);
                }
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::BeforeCreate { data };
                    return self
                        .recover(state, schema, HookPoint::BeforeCreate, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::BeforeCreate, e)),
            }
        }

        let txn = state.scope.transaction().await?;
        let inserted = txn.insert_many(schema, vec![data.clone()]).await?;
        let [mut document]: [Document; 1] = inserted.try_into().map_err(|docs: Vec<Document>| {
            EngineError::InsertCount {
                schema: schema.to_string(),
                count: docs.len(),
            }
        })?;
        debug!(schema, id = document.id().unwrap_or_default(), "record inserted");

        let pure_document = PureSnapshot::of(&document);
        for hook in &hooks.after_create {
            let args = AfterCreateArgs {
                schema: schema.to_string(),
                data: data.clone(),
                pure_data: pure_data.clone(),
                document: document.clone(),
                pure_document: pure_document.clone(),
                db: state.db(self),
                raw_db: state.raw_db(),
                context: state.context(),
                defer: state.deferred.clone(),
            };
            match hook(args).await {
                Ok(next) => document = next,
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::AfterCreate { data, document };
                    return self
                        .recover(state, schema, HookPoint::AfterCreate, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::AfterCreate, e)),
            }
        }

        Ok(Value::Object(document))
    }

    async fn update_one(
        &self,
        state: &OperationState,
        schema: &str,
        original: Document,
        data: Record,
    ) -> EngineResult<Value> {
        let hooks = self.inner.registry.hooks(schema);
        let id = original
            .id()
            .ok_or_else(|| EngineError::NotFound {
                schema: schema.to_string(),
                id: String::new(),
            })?
            .to_string();
        let pure_data = PureSnapshot::of(&data);
        let mut data = data;

        for hook in &hooks.before_update {
            let target = merge_records(&original, &data);
            let args = BeforeUpdateArgs {
                schema: schema.to_string(),
                data: data.clone(),
                pure_data: pure_data.clone(),
                original_document: original.clone(),
                target_document: target.clone(),
                db: state.db(self),
                raw_db: state.raw_db(),
                context: state.context(),
                defer: state.deferred.clone(),
            };
            match hook(args).await {
                Ok(HookFlow::Proceed(next)) => data = next,
                Ok(HookFlow::Defer(value)) => {
                    debug!(schema, id = %id, "update deferred by hook");
                    return Ok(value);
                }
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::BeforeUpdate {
                        data,
                        original_document: original,
                        target_document: target,
                    };
                    return self
                        .recover(state, schema, HookPoint::BeforeUpdate, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::BeforeUpdate, e)),
            }
        }

        let txn = state.scope.transaction().await?;
        let mut current = txn
            .replace_by_id(schema, &id, merge_records(&original, &data))
            .await?
            .ok_or_else(|| EngineError::NotFound {
                schema: schema.to_string(),
                id: id.clone(),
            })?;
        debug!(schema, id = %id, "record replaced");

        let pure_current = PureSnapshot::of(&current);
        for hook in &hooks.after_update {
            let args = AfterUpdateArgs {
                schema: schema.to_string(),
                data: data.clone(),
                pure_data: pure_data.clone(),
                original_document: original.clone(),
                current_document: current.clone(),
                pure_current_document: pure_current.clone(),
                db: state.db(self),
                raw_db: state.raw_db(),
                context: state.context(),
                defer: state.deferred.clone(),
            };
            match hook(args).await {
                Ok(next) => current = next,
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::AfterUpdate {
                        data,
                        original_document: original,
                        current_document: current,
                    };
                    return self
                        .recover(state, schema, HookPoint::AfterUpdate, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::AfterUpdate, e)),
            }
        }

        Ok(Value::Object(current))
    }

    async fn delete_one(&self, state: &OperationState, schema: &str, document: Document) -> EngineResult<Value> {
        let hooks = self.inner.registry.hooks(schema);
        let id = document
            .id()
            .ok_or_else(|| EngineError::NotFound {
                schema: schema.to_string(),
                id: String::new(),
            })?
            .to_string();
        let pure_document = PureSnapshot::of(&document);

        for hook in &hooks.before_delete {
            match hook(self.delete_args(state, schema, &document, &pure_document)).await {
                Ok(HookFlow::Proceed(())) => {}
                Ok(HookFlow::Defer(value)) => {
                    debug!(schema, id = %id, "delete deferred by hook");
                    return Ok(value);
                }
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::BeforeDelete { document };
                    return self
                        .recover(state, schema, HookPoint::BeforeDelete, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::BeforeDelete, e)),
            }
        }

        let txn = state.scope.transaction().await?;
        txn.delete_by_id(schema, &id).await?.ok_or_else(|| EngineError::NotFound {
            schema: schema.to_string(),
            id: id.clone(),
        })?;
        debug!(schema, id = %id, "record deleted");

        for hook in &hooks.after_delete {
            match hook(self.delete_args(state, schema, &document, &pure_document)).await {
                Ok(()) => {}
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::AfterDelete { document };
                    return self
                        .recover(state, schema, HookPoint::AfterDelete, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::AfterDelete, e)),
            }
        }

        Ok(Value::Object(document))
    }

    fn delete_args(
        &self,
        state: &OperationState,
        schema: &str,
        document: &Document,
        pure_document: &PureSnapshot<Document>,
    ) -> DeleteArgs {
        DeleteArgs {
            schema: schema.to_string(),
            document: document.clone(),
            pure_document: pure_document.clone(),
            db: state.db(self),
            raw_db: state.raw_db(),
            context: state.context(),
            defer: state.deferred.clone(),
        }
    }

    async fn after_query(&self, state: &OperationState, schema: &str, document: Document) -> EngineResult<Value> {
        let hooks = self.inner.registry.hooks(schema);
        let pure_document = PureSnapshot::of(&document);
        let mut document = document;

        for hook in &hooks.after_query {
            let args = AfterQueryArgs {
                schema: schema.to_string(),
                document: document.clone(),
                pure_document: pure_document.clone(),
                db: state.db(self),
                raw_db: state.raw_db(),
                context: state.context(),
                defer: state.deferred.clone(),
            };
            match hook(args).await {
                Ok(next) => document = next,
                Err(HookError::Interrupt(exception)) => {
                    let point_data = ExceptionData::AfterQuery { document };
                    return self
                        .recover(state, schema, HookPoint::AfterQuery, point_data, exception)
                        .await;
                }
                Err(e) => return Err(EngineError::from_hook(schema, HookPoint::AfterQuery, e)),
            }
        }

        Ok(Value::Object(document))
    }

    // ── Recovery and completion ──────────────────────────────────

    async fn recover(
        &self,
        state: &OperationState,
        schema: &str,
        point: HookPoint,
        data: ExceptionData,
        exception: HookException,
    ) -> EngineResult<Value> {
        debug!(schema, point = %point, exception = %exception, "hook interrupted operation");
        let env = RecoveryEnv {
            schema: schema.to_string(),
            db: state.db(self),
            raw_db: state.raw_db(),
            context: state.context(),
        };
        let hooks = &self.inner.registry.hooks(schema).catch_exception;
        let value = execute_exception_hooks(hooks, env, point, data, exception).await?;
        state.mark_recovered();
        Ok(value)
    }

    /// Completes an operation: deferred calls and commit on success, abort
    /// and afterError hooks on failure. Nested operations run their deferred
    /// calls and, on failure, the afterError hooks of their own schema.
    pub(crate) async fn finish<T>(
        &self,
        state: &OperationState,
        schema: &str,
        operation: &str,
        result: EngineResult<T>,
    ) -> EngineResult<T> {
        let result = match result {
            Ok(value) if state.is_recovered() => {
                debug!(schema, operation, "recovered, transaction left to exception hooks");
                Ok(value)
            }
            Ok(value) => self.complete(state).await.map(|()| value),
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => Ok(value),
            // The parent owns the transaction of a nested operation.
            Err(error) if state.is_nested() => Err(self.report_error(state, schema, operation, error).await),
            Err(error) => {
                state.scope.abort_if_pending().await;
                Err(self.report_error(state, schema, operation, error).await)
            }
        }
    }

    async fn complete(&self, state: &OperationState) -> EngineResult<()> {
        state
            .deferred
            .run()
            .await
            .map_err(|e| EngineError::Deferred(Box::new(e)))?;
        if !state.is_nested() {
            state.scope.commit_if_pending().await?;
        }
        Ok(())
    }

    /// Runs afterError hooks for a failed operation. They get a fresh
    /// transaction of their own; their failures are only logged.
    async fn report_error(
        &self,
        state: &OperationState,
        schema: &str,
        operation: &str,
        error: EngineError,
    ) -> EngineError {
        if matches!(error, EngineError::Interrupted(_)) {
            return error;
        }
        let hooks = &self.inner.registry.hooks(schema).after_error;
        if hooks.is_empty() {
            return error;
        }

        let path = format!("{schema}.{operation}");
        debug!(path = %path, error = %error, "running afterError hooks");
        let observer = OperationState::nested(Scope::new(Arc::clone(&self.inner.store), state.context()));
        let defer = DeferredCalls::new();
        let report = ErrorReport::from(&error);

        for (index, hook) in hooks.iter().enumerate() {
            let args = AfterErrorArgs {
                schema: schema.to_string(),
                path: path.clone(),
                error: report.clone(),
                db: observer.db(self),
                raw_db: observer.raw_db(),
                context: observer.context(),
                defer: defer.clone(),
            };
            if let Err(e) = hook(args).await {
                warn!(path = %path, hook = index, error = %e, "afterError hook failed");
            }
        }
        let settled = match defer.run().await {
            Ok(()) => observer.scope.commit_if_pending().await.map_err(HookError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = settled {
            warn!(path = %path, error = %e, "afterError side effects discarded");
            observer.scope.abort_if_pending().await;
        }

        error
    }
}
