//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A document with the same identifier already exists in the collection.
    #[error("duplicate key in {collection}: {id}")]
    DuplicateKey { collection: String, id: String },

    /// Document not found.
    #[error("document not found in {collection}: {id}")]
    NotFound { collection: String, id: String },

    /// The transaction was already committed or aborted.
    #[error("transaction already {0}")]
    TransactionClosed(&'static str),

    /// The filter uses an operator the store does not understand.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Backend-specific failure.
    #[error("backend error: {0}")]
    Backend(String),
}
