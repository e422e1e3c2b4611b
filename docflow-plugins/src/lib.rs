//! Reference plugins for docflow.
//!
//! - [`VersionControl`]: snapshots every write of a schema into
//!   `__<schema>_versions` and serves them through `(versions, list)`
//! - [`ContentReview`]: parks writes in `__<schema>_review` until they are
//!   confirmed through `(review, confirm)`
//!
//! [`settings`] turns the `[schemas.plugins]` tables of an
//! [`EngineConfig`](docflow_engine::EngineConfig) into plugin lists.

pub mod filter;
pub mod review;
pub mod settings;
pub mod versions;

pub use filter::{build_filter, list_options};
pub use review::{ContentReview, REPLAY_MARKER, ReviewedOperation};
pub use settings::{plugins_for, registry_builder, schema_config};
pub use versions::{DEFAULT_MAX_VERSIONS, VersionControl};
