//! In-process [`DocumentStore`] with snapshot-style transactions.
//!
//! Committed state lives in a map of collections. A transaction records its
//! writes in an ordered log; reads through the transaction replay the log on
//! top of the committed collection. Commit replays the log once more against
//! the current committed state and swaps the result in atomically.

use crate::error::{StorageError, StorageResult};
use crate::filter::{apply_options, matches};
use crate::store::{DocumentStore, StoreTransaction};
use async_trait::async_trait;
use docflow_model::{Document, Filter, FindOptions, ID_FIELD, Record, RecordExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

type Collections = HashMap<String, Vec<Document>>;

#[derive(Default)]
struct Shared {
    collections: RwLock<Collections>,
    commits: AtomicU64,
    aborts: AtomicU64,
}

/// An in-memory document store. Cloning yields another handle to the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed documents of a collection, in insertion order.
    pub async fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.shared
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of committed documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.shared
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Number of transactions committed so far.
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::SeqCst)
    }

    /// Number of transactions explicitly aborted so far.
    pub fn abort_count(&self) -> u64 {
        self.shared.aborts.load(Ordering::SeqCst)
    }

    /// Inserts documents outside of any transaction. Intended for seeding.
    pub async fn seed(&self, collection: &str, records: Vec<Record>) -> StorageResult<Vec<Document>> {
        let mut collections = self.shared.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            let op = WriteOp::insert(collection, record)?;
            apply(docs, &op)?;
            if let WriteOp::Insert { document, .. } = op {
                stored.push(document);
            }
        }
        Ok(stored)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn begin(&self) -> StorageResult<Arc<dyn StoreTransaction>> {
        Ok(Arc::new(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            state: Mutex::new(TxnState::Open(Vec::new())),
        }))
    }

    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>> {
        apply_options(self.snapshot(collection).await, options)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let collections = self.shared.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id() == Some(id)))
            .cloned())
    }
}

#[derive(Debug, Clone)]
enum WriteOp {
    Insert { collection: String, document: Document },
    Replace { collection: String, id: String, document: Document },
    Delete { collection: String, id: String },
}

impl WriteOp {
    fn insert(collection: &str, mut record: Record) -> StorageResult<Self> {
        match record.get(ID_FIELD) {
            None | Some(Value::Null) => {
                record.insert(ID_FIELD.to_string(), Value::String(Uuid::now_v7().to_string()));
            }
            Some(Value::String(_)) => {}
            Some(other) => {
                return Err(StorageError::InvalidData(format!("{ID_FIELD} must be a string, got {other}")));
            }
        }
        Ok(WriteOp::Insert {
            collection: collection.to_string(),
            document: record,
        })
    }

    fn collection(&self) -> &str {
        match self {
            WriteOp::Insert { collection, .. }
            | WriteOp::Replace { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }
}

fn apply(docs: &mut Vec<Document>, op: &WriteOp) -> StorageResult<()> {
    match op {
        WriteOp::Insert { collection, document } => {
            let id = document.id().unwrap_or_default();
            if docs.iter().any(|d| d.id() == Some(id)) {
                return Err(StorageError::DuplicateKey {
                    collection: collection.clone(),
                    id: id.to_string(),
                });
            }
            docs.push(document.clone());
        }
        WriteOp::Replace { id, document, .. } => {
            if let Some(slot) = docs.iter_mut().find(|d| d.id() == Some(id.as_str())) {
                *slot = document.clone();
            }
        }
        WriteOp::Delete { id, .. } => docs.retain(|d| d.id() != Some(id.as_str())),
    }
    Ok(())
}

enum TxnState {
    Open(Vec<WriteOp>),
    Committed,
    Aborted,
}

impl TxnState {
    fn log(&mut self) -> StorageResult<&mut Vec<WriteOp>> {
        match self {
            TxnState::Open(log) => Ok(log),
            TxnState::Committed => Err(StorageError::TransactionClosed("committed")),
            TxnState::Aborted => Err(StorageError::TransactionClosed("aborted")),
        }
    }
}

/// A transaction over a [`MemoryStore`].
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    state: Mutex<TxnState>,
}

impl MemoryTransaction {
    /// The collection as this transaction sees it.
    async fn view(&self, collection: &str, log: &[WriteOp]) -> StorageResult<Vec<Document>> {
        let mut docs = self
            .shared
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();
        for op in log.iter().filter(|op| op.collection() == collection) {
            apply(&mut docs, op)?;
        }
        Ok(docs)
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>> {
        let mut state = self.state.lock().await;
        let docs = self.view(collection, state.log()?).await?;
        apply_options(docs, options)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let mut state = self.state.lock().await;
        let docs = self.view(collection, state.log()?).await?;
        Ok(docs.into_iter().find(|d| d.id() == Some(id)))
    }

    async fn insert_many(&self, collection: &str, records: Vec<Record>) -> StorageResult<Vec<Document>> {
        let mut state = self.state.lock().await;
        let log = state.log()?;
        let mut docs = self.view(collection, log).await?;

        // Validate the whole batch before logging any of it.
        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            let op = WriteOp::insert(collection, record)?;
            apply(&mut docs, &op)?;
            pending.push(op);
        }

        let stored = pending
            .iter()
            .filter_map(|op| match op {
                WriteOp::Insert { document, .. } => Some(document.clone()),
                _ => None,
            })
            .collect();
        log.extend(pending);
        Ok(stored)
    }

    async fn replace_by_id(
        &self,
        collection: &str,
        id: &str,
        mut document: Document,
    ) -> StorageResult<Option<Document>> {
        let mut state = self.state.lock().await;
        let log = state.log()?;
        let docs = self.view(collection, log).await?;
        if !docs.iter().any(|d| d.id() == Some(id)) {
            return Ok(None);
        }
        document.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        log.push(WriteOp::Replace {
            collection: collection.to_string(),
            id: id.to_string(),
            document: document.clone(),
        });
        Ok(Some(document))
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>> {
        let mut state = self.state.lock().await;
        let log = state.log()?;
        let docs = self.view(collection, log).await?;
        let Some(existing) = docs.into_iter().find(|d| d.id() == Some(id)) else {
            return Ok(None);
        };
        log.push(WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        Ok(Some(existing))
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64> {
        let mut state = self.state.lock().await;
        let log = state.log()?;
        let docs = self.view(collection, log).await?;
        let mut deleted = 0;
        for doc in &docs {
            if matches(doc, filter)? {
                if let Some(id) = doc.id() {
                    log.push(WriteOp::Delete {
                        collection: collection.to_string(),
                        id: id.to_string(),
                    });
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn commit(&self) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        let log = std::mem::take(state.log()?);

        let mut collections = self.shared.collections.write().await;
        let mut staged: Collections = HashMap::new();
        for op in &log {
            let name = op.collection();
            if !staged.contains_key(name) {
                let current = collections.get(name).cloned().unwrap_or_default();
                staged.insert(name.to_string(), current);
            }
            let docs = staged.entry(name.to_string()).or_default();
            if let Err(e) = apply(docs, op) {
                warn!(collection = name, error = %e, "commit rejected, discarding transaction");
                *state = TxnState::Aborted;
                self.shared.aborts.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        }
        collections.extend(staged);

        *state = TxnState::Committed;
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        debug!(writes = log.len(), "transaction committed");
        Ok(())
    }

    async fn abort(&self) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        let discarded = state.log()?.len();
        *state = TxnState::Aborted;
        self.shared.aborts.fetch_add(1, Ordering::SeqCst);
        debug!(writes = discarded, "transaction aborted");
        Ok(())
    }
}
