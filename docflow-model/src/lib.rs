//! Core record model for docflow.
//!
//! Defines the universal types every docflow subsystem depends on:
//! - [`Record`] / [`Document`]: JSON objects flowing through the lifecycle engine
//! - [`SchemaDefinition`] / [`SchemaCatalog`]: declared schemas and their fields
//! - [`PureSnapshot`]: immutable deep copy handed to hooks
//! - [`FindOptions`]: pagination, sort and filter for queries
//!
//! These types are consumed by storage, the engine and the plugins. They form
//! the contract between hooks and the core engine.

mod query;
mod record;
mod schema;
mod snapshot;

pub use query::{DEFAULT_PAGE_SIZE, Filter, FindOptions, SortKey, SortOrder};
pub use record::{Document, ID_FIELD, Record, RecordExt, into_record, merge_records};
pub use schema::{FieldDef, FieldType, SchemaCatalog, SchemaDefinition};
pub use snapshot::PureSnapshot;

/// Result type alias using the crate's error type.
pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Errors raised while interpreting caller-supplied model data.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("invalid sort order: {0}")]
    InvalidSort(String),

    #[error("invalid {field}: {value} is not a non-negative integer")]
    InvalidCount { field: String, value: String },
}
