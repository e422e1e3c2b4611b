//! Per-call operation state.
//!
//! A top-level call owns a [`Scope`]: its context and a transaction slot that
//! opens on the first write. Operations nested through the `db` facade share
//! the scope but get their own deferred list and never commit.

use crate::context::HookContext;
use crate::db::{Db, RawDb};
use crate::deferred::DeferredCalls;
use crate::engine::LifecycleEngine;
use docflow_model::{Document, Filter, FindOptions};
use docflow_storage::{DocumentStore, StorageError, StorageResult, StoreTransaction};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

enum TxnSlot {
    Idle,
    Open(Arc<dyn StoreTransaction>),
    Finished,
}

pub(crate) struct Scope {
    store: Arc<dyn DocumentStore>,
    context: HookContext,
    txn: Mutex<TxnSlot>,
}

impl Scope {
    pub(crate) fn new(store: Arc<dyn DocumentStore>, context: HookContext) -> Arc<Self> {
        Arc::new(Self {
            store,
            context,
            txn: Mutex::new(TxnSlot::Idle),
        })
    }

    pub(crate) fn context(&self) -> &HookContext {
        &self.context
    }

    /// The operation's transaction, opened on first use.
    pub(crate) async fn transaction(&self) -> StorageResult<Arc<dyn StoreTransaction>> {
        let mut slot = self.txn.lock().await;
        match &*slot {
            TxnSlot::Open(txn) => return Ok(Arc::clone(txn)),
            TxnSlot::Finished => return Err(StorageError::TransactionClosed("finished")),
            TxnSlot::Idle => {}
        }
        let txn = self.store.begin().await?;
        debug!("transaction opened");
        *slot = TxnSlot::Open(Arc::clone(&txn));
        Ok(txn)
    }

    async fn open_transaction(&self) -> Option<Arc<dyn StoreTransaction>> {
        match &*self.txn.lock().await {
            TxnSlot::Open(txn) => Some(Arc::clone(txn)),
            _ => None,
        }
    }

    /// Reads through the open transaction if there is one, else committed state.
    pub(crate) async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>> {
        match self.open_transaction().await {
            Some(txn) => txn.find(collection, options).await,
            None => self.store.find(collection, options).await,
        }
    }

    pub(crate) async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        match self.open_transaction().await {
            Some(txn) => txn.find_one(collection, filter).await,
            None => self.store.find_one(collection, filter).await,
        }
    }

    pub(crate) async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        match self.open_transaction().await {
            Some(txn) => txn.find_by_id(collection, id).await,
            None => self.store.find_by_id(collection, id).await,
        }
    }

    /// Commits an open transaction. Fails if the scope was already finished.
    pub(crate) async fn commit(&self) -> StorageResult<()> {
        let mut slot = self.txn.lock().await;
        match std::mem::replace(&mut *slot, TxnSlot::Finished) {
            TxnSlot::Open(txn) => txn.commit().await,
            TxnSlot::Idle => Ok(()),
            TxnSlot::Finished => Err(StorageError::TransactionClosed("finished")),
        }
    }

    /// Aborts an open transaction. Fails if the scope was already finished.
    pub(crate) async fn abort(&self) -> StorageResult<()> {
        let mut slot = self.txn.lock().await;
        match std::mem::replace(&mut *slot, TxnSlot::Finished) {
            TxnSlot::Open(txn) => txn.abort().await,
            TxnSlot::Idle => Ok(()),
            TxnSlot::Finished => Err(StorageError::TransactionClosed("finished")),
        }
    }

    /// Commit at the end of a successful top-level call. A hook may already
    /// have finalized the transaction through `RawDb`.
    pub(crate) async fn commit_if_pending(&self) -> StorageResult<()> {
        let mut slot = self.txn.lock().await;
        match std::mem::replace(&mut *slot, TxnSlot::Finished) {
            TxnSlot::Open(txn) => {
                txn.commit().await?;
                debug!("transaction committed");
                Ok(())
            }
            TxnSlot::Idle => Ok(()),
            TxnSlot::Finished => {
                debug!("transaction already finalized by a hook");
                Ok(())
            }
        }
    }

    /// Rollback at the end of a failed top-level call.
    pub(crate) async fn abort_if_pending(&self) {
        let mut slot = self.txn.lock().await;
        if let TxnSlot::Open(txn) = std::mem::replace(&mut *slot, TxnSlot::Finished) {
            match txn.abort().await {
                Ok(()) => debug!("transaction aborted"),
                Err(e) => warn!(error = %e, "transaction rollback failed"),
            }
        }
    }
}

/// Mutable state of one operation call.
pub(crate) struct OperationState {
    pub(crate) scope: Arc<Scope>,
    pub(crate) deferred: DeferredCalls,
    nested: bool,
    recovered: AtomicBool,
}

impl OperationState {
    pub(crate) fn root(store: Arc<dyn DocumentStore>, context: HookContext) -> Self {
        Self {
            scope: Scope::new(store, context),
            deferred: DeferredCalls::new(),
            nested: false,
            recovered: AtomicBool::new(false),
        }
    }

    pub(crate) fn nested(scope: Arc<Scope>) -> Self {
        Self {
            scope,
            deferred: DeferredCalls::new(),
            nested: true,
            recovered: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_nested(&self) -> bool {
        self.nested
    }

    /// Marks that a catchException hook supplied the result. For a
    /// single-record operation the transaction is then left to the
    /// exception hooks.
    pub(crate) fn mark_recovered(&self) {
        self.recovered.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_recovered(&self) -> bool {
        self.recovered.load(Ordering::SeqCst)
    }

    /// Bulk operations complete normally even when some of their records
    /// were recovered.
    pub(crate) fn clear_recovered(&self) {
        self.recovered.store(false, Ordering::SeqCst);
    }

    pub(crate) fn context(&self) -> HookContext {
        self.scope.context().clone()
    }

    pub(crate) fn db(&self, engine: &LifecycleEngine) -> Db {
        Db::new(engine.clone(), Arc::clone(&self.scope))
    }

    pub(crate) fn raw_db(&self) -> RawDb {
        RawDb::new(Arc::clone(&self.scope))
    }
}
