//! The persistence adapter contract.
//!
//! The lifecycle engine never talks to a database directly. It reads through a
//! [`DocumentStore`] and performs every write inside a [`StoreTransaction`]
//! opened for the operation at hand.

use crate::error::StorageResult;
use async_trait::async_trait;
use docflow_model::{Document, Filter, FindOptions, Record};
use std::sync::Arc;

/// A document store holding named collections of JSON documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Opens a new transaction. Nothing written through it is visible to
    /// other readers until [`StoreTransaction::commit`] succeeds.
    async fn begin(&self) -> StorageResult<Arc<dyn StoreTransaction>>;

    /// Returns committed documents matching `options`.
    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>>;

    /// Returns the committed document with the given identifier.
    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Returns the first committed document matching `filter`.
    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        let options = FindOptions::new().filter(filter.clone()).limit(1);
        Ok(self.find(collection, &options).await?.into_iter().next())
    }
}

/// A unit of work against a [`DocumentStore`].
///
/// Reads through a transaction observe its own uncommitted writes. After
/// `commit` or `abort` every call fails with
/// [`StorageError::TransactionClosed`](crate::StorageError::TransactionClosed).
/// A transaction dropped without `commit` is discarded.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    async fn find(&self, collection: &str, options: &FindOptions) -> StorageResult<Vec<Document>>;

    async fn find_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> StorageResult<Option<Document>> {
        let options = FindOptions::new().filter(filter.clone()).limit(1);
        Ok(self.find(collection, &options).await?.into_iter().next())
    }

    /// Inserts records, assigning identifiers where missing. Returns the
    /// stored documents in input order.
    async fn insert_many(&self, collection: &str, records: Vec<Record>) -> StorageResult<Vec<Document>>;

    /// Replaces the document with the given identifier. Returns `None` if no
    /// such document exists.
    async fn replace_by_id(
        &self,
        collection: &str,
        id: &str,
        document: Document,
    ) -> StorageResult<Option<Document>>;

    /// Deletes the document with the given identifier, returning it.
    async fn delete_by_id(&self, collection: &str, id: &str) -> StorageResult<Option<Document>>;

    /// Deletes every document matching `filter`, returning the count.
    async fn delete_many(&self, collection: &str, filter: &Filter) -> StorageResult<u64>;

    async fn commit(&self) -> StorageResult<()>;

    async fn abort(&self) -> StorageResult<()>;
}
