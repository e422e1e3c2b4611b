//! Storage layer for docflow.
//!
//! Defines the persistence adapter the lifecycle engine writes through and
//! ships an in-memory implementation used by the CLI and the test suites.
//!
//! # Architecture
//!
//! - [`DocumentStore`] reads committed state and opens transactions
//! - [`StoreTransaction`] stages writes; reads through it see its own writes
//! - [`MemoryStore`] keeps collections in process and applies a transaction's
//!   write log atomically on commit
//! - [`filter`] evaluates the query vocabulary shared by every adapter

mod error;
pub mod filter;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStore, MemoryTransaction};
pub use store::{DocumentStore, StoreTransaction};
