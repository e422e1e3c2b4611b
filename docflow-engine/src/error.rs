//! Error types for the lifecycle engine.

use crate::hook::HookPoint;
use docflow_model::ModelError;
use docflow_storage::StorageError;
use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type returned by hooks and operation handlers.
pub type HookResult<T> = Result<T, HookError>;

/// An error a hook raises to interrupt persistence and ask the schema's
/// catchException hooks for a recovery.
///
/// Any error type can be carried. Exception hooks identify the kinds they
/// handle with [`HookException::is`] and [`HookException::downcast_ref`].
#[derive(Clone)]
pub struct HookException {
    inner: Arc<dyn StdError + Send + Sync + 'static>,
}

/// The payload of [`HookException::msg`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InterruptMessage(pub String);

impl HookException {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(error),
        }
    }

    /// An exception carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(InterruptMessage(message.into()))
    }

    /// Whether the carried error is of type `E`.
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }
}

impl fmt::Debug for HookException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HookException").field(&self.inner).finish()
    }
}

impl fmt::Display for HookException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl StdError for HookException {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}

/// Errors returned by hooks and operation handlers.
#[derive(Debug, Error)]
pub enum HookError {
    /// Interrupts the operation and triggers the recovery protocol.
    #[error("interrupted: {0}")]
    Interrupt(HookException),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A nested operation issued through the `db` facade failed.
    #[error(transparent)]
    Engine(Box<EngineError>),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl HookError {
    /// Interrupt with an arbitrary error type.
    pub fn interrupt<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        HookError::Interrupt(HookException::new(error))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HookError::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HookError::NotFound(message.into())
    }
}

impl From<HookException> for HookError {
    fn from(exception: HookException) -> Self {
        HookError::Interrupt(exception)
    }
}

impl From<EngineError> for HookError {
    fn from(error: EngineError) -> Self {
        match error {
            // A nested interrupt that nobody recovered keeps interrupting.
            EngineError::Interrupted(exception) => HookError::Interrupt(exception),
            other => HookError::Engine(Box::new(other)),
        }
    }
}

impl From<ModelError> for HookError {
    fn from(error: ModelError) -> Self {
        HookError::BadRequest(error.to_string())
    }
}

/// Errors returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    /// Bulk delete filter rejected by validation.
    #[error("unsafe filter for {schema}: {reason}")]
    UnsafeFilter { schema: String, reason: String },

    #[error("insert into {schema} returned {count} documents, expected exactly 1")]
    InsertCount { schema: String, count: usize },

    #[error("{schema} has no document with id {id}")]
    NotFound { schema: String, id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A [`HookException`] no catchException hook cleared.
    #[error("operation interrupted: {0}")]
    Interrupted(HookException),

    #[error("exception raised at {schema}.{point} was cleared without a replacement result")]
    UnresolvedRecovery { schema: String, point: HookPoint },

    #[error("{point} hook on {schema} failed: {source}")]
    Hook {
        schema: String,
        point: HookPoint,
        #[source]
        source: Box<HookError>,
    },

    #[error("deferred call failed: {0}")]
    Deferred(Box<HookError>),

    #[error("no operation {operation_type}/{action} registered for {schema}")]
    OperationNotFound {
        schema: String,
        operation_type: String,
        action: String,
    },
}

impl EngineError {
    /// Stable name of the variant, as reported to afterError hooks.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnknownSchema(_) => "unknownSchema",
            EngineError::UnsafeFilter { .. } => "unsafeFilter",
            EngineError::InsertCount { .. } => "insertCount",
            EngineError::NotFound { .. } => "notFound",
            EngineError::Storage(_) => "storage",
            EngineError::Interrupted(_) => "interrupted",
            EngineError::UnresolvedRecovery { .. } => "unresolvedRecovery",
            EngineError::Hook { .. } => "hook",
            EngineError::Deferred(_) => "deferred",
            EngineError::OperationNotFound { .. } => "operationNotFound",
        }
    }

    /// Converts a hook failure at `point` into an operation error.
    ///
    /// Nested engine and storage errors pass through unchanged.
    pub(crate) fn from_hook(schema: &str, point: HookPoint, error: HookError) -> Self {
        match error {
            HookError::Engine(inner) => *inner,
            HookError::Storage(e) => EngineError::Storage(e),
            HookError::Interrupt(exception) => EngineError::Interrupted(exception),
            other => EngineError::Hook {
                schema: schema.to_string(),
                point,
                source: Box::new(other),
            },
        }
    }
}

/// What afterError hooks see of a failed operation. The operation error
/// itself goes back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}

impl From<&EngineError> for ErrorReport {
    fn from(error: &EngineError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors raised while building the hook registry at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("hook unit '{unit}' registers a {point} hook for its default schema but declares none")]
    MissingSchema { unit: String, point: HookPoint },

    #[error("hook unit '{unit}' registers operation {operation_type}/{action} for its default schema but declares none")]
    MissingOperationSchema {
        unit: String,
        operation_type: String,
        action: String,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Errors raised while composing plugins into a schema configuration.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{plugin}' on schema '{schema}' depends on '{dependency}', which was not applied before it")]
    MissingDependency {
        plugin: String,
        schema: String,
        dependency: String,
    },

    #[error("invalid settings for plugin '{plugin}': {reason}")]
    Config { plugin: String, reason: String },

    #[error("unknown plugin '{0}'")]
    Unknown(String),
}

/// Errors raised while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
