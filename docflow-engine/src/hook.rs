//! Hook points, hook argument bundles and per-schema hook lists.
//!
//! Every hook is an async function from an owned argument bundle to a
//! [`HookResult`]. Hooks are stored as `Arc<dyn Fn>` so the registry can be
//! shared across concurrent operations without locking.

use crate::context::HookContext;
use crate::db::{Db, RawDb};
use crate::deferred::DeferredCalls;
use crate::error::{ErrorReport, HookException, HookResult};
use crate::recovery::{ExceptionActions, ExceptionData, ReturnActions};
use docflow_model::{Document, PureSnapshot, Record};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The future every hook returns.
pub type HookFuture<T> = BoxFuture<'static, HookResult<T>>;

/// A type-erased hook taking `A` and producing `R`.
pub type HookFn<A, R> = Arc<dyn Fn(A) -> HookFuture<R> + Send + Sync>;

/// A stage of the record lifecycle at which hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
    AfterQuery,
    AfterError,
    CatchException,
    Operation,
}

impl HookPoint {
    pub const ALL: [HookPoint; 10] = [
        HookPoint::BeforeCreate,
        HookPoint::AfterCreate,
        HookPoint::BeforeUpdate,
        HookPoint::AfterUpdate,
        HookPoint::BeforeDelete,
        HookPoint::AfterDelete,
        HookPoint::AfterQuery,
        HookPoint::AfterError,
        HookPoint::CatchException,
        HookPoint::Operation,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            HookPoint::BeforeCreate => "beforeCreate",
            HookPoint::AfterCreate => "afterCreate",
            HookPoint::BeforeUpdate => "beforeUpdate",
            HookPoint::AfterUpdate => "afterUpdate",
            HookPoint::BeforeDelete => "beforeDelete",
            HookPoint::AfterDelete => "afterDelete",
            HookPoint::AfterQuery => "afterQuery",
            HookPoint::AfterError => "afterError",
            HookPoint::CatchException => "catchException",
            HookPoint::Operation => "operation",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a pre-hook (beforeCreate, beforeUpdate, beforeDelete).
#[derive(Debug, Clone, PartialEq)]
pub enum HookFlow<T> {
    /// Continue the chain with this input.
    Proceed(T),
    /// Stop here: skip persistence and post-hooks for this record and return
    /// the value as its result. The operation itself still completes.
    Defer(Value),
}

// ── Argument bundles ─────────────────────────────────────────────

#[derive(Clone)]
pub struct BeforeCreateArgs {
    pub schema: String,
    pub data: Record,
    pub pure_data: PureSnapshot<Record>,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

#[derive(Clone)]
pub struct AfterCreateArgs {
    pub schema: String,
    pub data: Record,
    pub pure_data: PureSnapshot<Record>,
    pub document: Document,
    pub pure_document: PureSnapshot<Document>,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

#[derive(Clone)]
pub struct BeforeUpdateArgs {
    pub schema: String,
    pub data: Record,
    pub pure_data: PureSnapshot<Record>,
    pub original_document: Document,
    /// The original document merged with the current `data`.
    pub target_document: Document,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

#[derive(Clone)]
pub struct AfterUpdateArgs {
    pub schema: String,
    pub data: Record,
    pub pure_data: PureSnapshot<Record>,
    pub original_document: Document,
    pub current_document: Document,
    pub pure_current_document: PureSnapshot<Document>,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

/// Arguments for beforeDelete and afterDelete.
#[derive(Clone)]
pub struct DeleteArgs {
    pub schema: String,
    pub document: Document,
    pub pure_document: PureSnapshot<Document>,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

#[derive(Clone)]
pub struct AfterQueryArgs {
    pub schema: String,
    pub document: Document,
    pub pure_document: PureSnapshot<Document>,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

#[derive(Clone)]
pub struct AfterErrorArgs {
    pub schema: String,
    /// `<schema>.<operation>`
    pub path: String,
    pub error: ErrorReport,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
    pub defer: DeferredCalls,
}

#[derive(Clone)]
pub struct CatchExceptionArgs {
    pub schema: String,
    /// The point whose hook raised the exception.
    pub name: HookPoint,
    pub data: ExceptionData,
    pub exception: HookException,
    pub exception_actions: ExceptionActions,
    pub return_actions: ReturnActions,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
}

/// Arguments for a named operation handler. Handlers get no `defer`.
#[derive(Clone)]
pub struct OperationArgs {
    pub schema: String,
    pub operation_type: String,
    pub action: String,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
}

// ── Hooks ────────────────────────────────────────────────────────

/// A hook bound to one point.
#[derive(Clone)]
pub enum PointHook {
    BeforeCreate(HookFn<BeforeCreateArgs, HookFlow<Record>>),
    AfterCreate(HookFn<AfterCreateArgs, Document>),
    BeforeUpdate(HookFn<BeforeUpdateArgs, HookFlow<Record>>),
    AfterUpdate(HookFn<AfterUpdateArgs, Document>),
    BeforeDelete(HookFn<DeleteArgs, HookFlow<()>>),
    AfterDelete(HookFn<DeleteArgs, ()>),
    AfterQuery(HookFn<AfterQueryArgs, Document>),
    AfterError(HookFn<AfterErrorArgs, ()>),
    CatchException(HookFn<CatchExceptionArgs, ()>),
}

macro_rules! point_hook_constructor {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $args:ty, $ret:ty) => {
        $(#[$meta])*
        pub fn $name<F, Fut>(hook: F) -> Self
        where
            F: Fn($args) -> Fut + Send + Sync + 'static,
            Fut: Future<Output = HookResult<$ret>> + Send + 'static,
        {
            let hook: HookFn<$args, $ret> = Arc::new(move |args: $args| -> HookFuture<$ret> {
                Box::pin(hook(args))
            });
            PointHook::$variant(hook)
        }
    };
}

impl PointHook {
    point_hook_constructor!(
        /// Receives the data about to be inserted; may replace it or defer.
        before_create, BeforeCreate, BeforeCreateArgs, HookFlow<Record>
    );
    point_hook_constructor!(after_create, AfterCreate, AfterCreateArgs, Document);
    point_hook_constructor!(before_update, BeforeUpdate, BeforeUpdateArgs, HookFlow<Record>);
    point_hook_constructor!(after_update, AfterUpdate, AfterUpdateArgs, Document);
    point_hook_constructor!(before_delete, BeforeDelete, DeleteArgs, HookFlow<()>);
    point_hook_constructor!(after_delete, AfterDelete, DeleteArgs, ());
    point_hook_constructor!(after_query, AfterQuery, AfterQueryArgs, Document);
    point_hook_constructor!(
        /// Observes a failed top-level operation. Failures are logged only.
        after_error, AfterError, AfterErrorArgs, ()
    );
    point_hook_constructor!(
        /// Runs for every [`HookException`] raised on the schema, whatever
        /// the point. Check `args.name` to filter.
        catch_exception, CatchException, CatchExceptionArgs, ()
    );

    pub fn point(&self) -> HookPoint {
        match self {
            PointHook::BeforeCreate(_) => HookPoint::BeforeCreate,
            PointHook::AfterCreate(_) => HookPoint::AfterCreate,
            PointHook::BeforeUpdate(_) => HookPoint::BeforeUpdate,
            PointHook::AfterUpdate(_) => HookPoint::AfterUpdate,
            PointHook::BeforeDelete(_) => HookPoint::BeforeDelete,
            PointHook::AfterDelete(_) => HookPoint::AfterDelete,
            PointHook::AfterQuery(_) => HookPoint::AfterQuery,
            PointHook::AfterError(_) => HookPoint::AfterError,
            PointHook::CatchException(_) => HookPoint::CatchException,
        }
    }
}

impl fmt::Debug for PointHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PointHook({})", self.point())
    }
}

/// The ordered hook lists of one schema, one list per point.
#[derive(Clone, Default)]
pub struct SchemaHooks {
    pub before_create: Vec<HookFn<BeforeCreateArgs, HookFlow<Record>>>,
    pub after_create: Vec<HookFn<AfterCreateArgs, Document>>,
    pub before_update: Vec<HookFn<BeforeUpdateArgs, HookFlow<Record>>>,
    pub after_update: Vec<HookFn<AfterUpdateArgs, Document>>,
    pub before_delete: Vec<HookFn<DeleteArgs, HookFlow<()>>>,
    pub after_delete: Vec<HookFn<DeleteArgs, ()>>,
    pub after_query: Vec<HookFn<AfterQueryArgs, Document>>,
    pub after_error: Vec<HookFn<AfterErrorArgs, ()>>,
    pub catch_exception: Vec<HookFn<CatchExceptionArgs, ()>>,
}

macro_rules! route_hook {
    ($self:ident, $hook:expr, |$list:ident, $h:ident| $body:expr) => {
        match $hook {
            PointHook::BeforeCreate($h) => { let $list = &mut $self.before_create; $body }
            PointHook::AfterCreate($h) => { let $list = &mut $self.after_create; $body }
            PointHook::BeforeUpdate($h) => { let $list = &mut $self.before_update; $body }
            PointHook::AfterUpdate($h) => { let $list = &mut $self.after_update; $body }
            PointHook::BeforeDelete($h) => { let $list = &mut $self.before_delete; $body }
            PointHook::AfterDelete($h) => { let $list = &mut $self.after_delete; $body }
            PointHook::AfterQuery($h) => { let $list = &mut $self.after_query; $body }
            PointHook::AfterError($h) => { let $list = &mut $self.after_error; $body }
            PointHook::CatchException($h) => { let $list = &mut $self.catch_exception; $body }
        }
    };
}

impl SchemaHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook to the end of its point's list.
    pub fn push(&mut self, hook: PointHook) {
        route_hook!(self, hook, |list, h| list.push(h))
    }

    /// Inserts a hook at the front of its point's list.
    pub fn prepend(&mut self, hook: PointHook) {
        route_hook!(self, hook, |list, h| list.insert(0, h))
    }

    /// Number of hooks registered at `point`.
    pub fn len(&self, point: HookPoint) -> usize {
        match point {
            HookPoint::BeforeCreate => self.before_create.len(),
            HookPoint::AfterCreate => self.after_create.len(),
            HookPoint::BeforeUpdate => self.before_update.len(),
            HookPoint::AfterUpdate => self.after_update.len(),
            HookPoint::BeforeDelete => self.before_delete.len(),
            HookPoint::AfterDelete => self.after_delete.len(),
            HookPoint::AfterQuery => self.after_query.len(),
            HookPoint::AfterError => self.after_error.len(),
            HookPoint::CatchException => self.catch_exception.len(),
            HookPoint::Operation => 0,
        }
    }

    pub fn total(&self) -> usize {
        HookPoint::ALL.iter().map(|p| self.len(*p)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Handler type of a named operation.
pub type OperationFn = HookFn<OperationArgs, Value>;

/// A named non-CRUD operation `(operation_type, action)` on a schema.
#[derive(Clone)]
pub struct OperationDef {
    pub operation_type: String,
    pub action: String,
    pub handler: OperationFn,
}

impl OperationDef {
    pub fn new<F, Fut>(operation_type: impl Into<String>, action: impl Into<String>, handler: F) -> Self
    where
        F: Fn(OperationArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<Value>> + Send + 'static,
    {
        let handler: OperationFn =
            Arc::new(move |args: OperationArgs| -> HookFuture<Value> { Box::pin(handler(args)) });
        Self {
            operation_type: operation_type.into(),
            action: action.into(),
            handler,
        }
    }
}

impl fmt::Debug for OperationDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDef")
            .field("operation_type", &self.operation_type)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}
