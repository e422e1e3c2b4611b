//! Hook-orchestrated record lifecycle engine for docflow.
//!
//! Runs schema-parameterized CRUD operations in front of a
//! [`DocumentStore`](docflow_storage::DocumentStore) and lets independently
//! written hooks intercept every stage.
//!
//! # Architecture
//!
//! - [`HookRegistry`]: built once at startup from each schema's
//!   [`SchemaConfig`] (after [`Plugin`] composition) and declarative
//!   registrations; one ordered hook list per (schema, point)
//! - [`LifecycleEngine`]: runs one operation through its hook points inside a
//!   lazily opened transaction; deferred calls run before commit
//! - Recovery: a [`HookException`] raised by a hook is offered to the schema's
//!   catchException hooks, which may clear it and supply a result
//! - [`OperationDispatcher`]: routes named operations to their handlers
//! - [`Db`] / [`RawDb`]: the facades hooks use to issue nested operations or
//!   raw writes inside the current transaction

mod config;
mod context;
mod db;
mod deferred;
mod dispatcher;
mod engine;
mod error;
mod hook;
mod plugin;
mod recovery;
mod registry;
mod state;

pub use config::{EngineConfig, LoggingConfig, SchemaSection};
pub use context::{ContextData, HookContext};
pub use db::{Db, RawDb};
pub use deferred::DeferredCalls;
pub use dispatcher::{OperationDispatcher, RouteKey};
pub use engine::LifecycleEngine;
pub use error::{
    ConfigError, EngineError, EngineResult, ErrorReport, HookError, HookException, HookResult, InterruptMessage, PluginError,
    RegistryError,
};
pub use hook::{
    AfterCreateArgs, AfterErrorArgs, AfterQueryArgs, AfterUpdateArgs, BeforeCreateArgs, BeforeUpdateArgs,
    CatchExceptionArgs, DeleteArgs, HookFlow, HookFn, HookFuture, HookPoint, OperationArgs, OperationDef, OperationFn,
    PointHook, SchemaHooks,
};
pub use plugin::{Plugin, SchemaConfig, compose};
pub use recovery::{ExceptionActions, ExceptionData, ReturnActions};
pub use registry::{HookRegistry, HookRegistryBuilder, HookUnit, SchemaTarget};
