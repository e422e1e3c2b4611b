//! Exception recovery protocol.
//!
//! When a hook raises a [`HookException`] every catchException hook of the
//! schema runs concurrently. They share two slots: the exception slot, seeded
//! with the exception, and the return slot, seeded empty. Once all of them
//! settled, a non-empty exception slot is rethrown; otherwise the return slot
//! becomes the result.

use crate::context::HookContext;
use crate::db::{Db, RawDb};
use crate::error::{EngineError, EngineResult, HookException};
use crate::hook::{CatchExceptionArgs, HookFn, HookPoint};
use docflow_model::{Document, Record};
use futures::future::join_all;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Point-specific data handed to catchException hooks.
#[derive(Debug, Clone, PartialEq)]
pub enum ExceptionData {
    BeforeCreate {
        data: Record,
    },
    AfterCreate {
        data: Record,
        document: Document,
    },
    BeforeUpdate {
        data: Record,
        original_document: Document,
        target_document: Document,
    },
    AfterUpdate {
        data: Record,
        original_document: Document,
        current_document: Document,
    },
    BeforeDelete {
        document: Document,
    },
    AfterDelete {
        document: Document,
    },
    AfterQuery {
        document: Document,
    },
}

impl ExceptionData {
    /// The input record, for create and update points.
    pub fn data(&self) -> Option<&Record> {
        match self {
            ExceptionData::BeforeCreate { data }
            | ExceptionData::AfterCreate { data, .. }
            | ExceptionData::BeforeUpdate { data, .. }
            | ExceptionData::AfterUpdate { data, .. } => Some(data),
            _ => None,
        }
    }

    /// The stored document the point operated on, if any.
    pub fn document(&self) -> Option<&Document> {
        match self {
            ExceptionData::BeforeCreate { .. } => None,
            ExceptionData::AfterCreate { document, .. }
            | ExceptionData::BeforeDelete { document }
            | ExceptionData::AfterDelete { document }
            | ExceptionData::AfterQuery { document } => Some(document),
            ExceptionData::BeforeUpdate { original_document, .. } => Some(original_document),
            ExceptionData::AfterUpdate { current_document, .. } => Some(current_document),
        }
    }
}

/// Shared handle to the pending exception.
#[derive(Clone)]
pub struct ExceptionActions {
    slot: Arc<Mutex<Option<HookException>>>,
}

impl ExceptionActions {
    fn new(exception: HookException) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(exception))),
        }
    }

    pub fn get(&self) -> Option<HookException> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Marks the exception as handled.
    pub fn clear(&self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Substitutes the exception that will be rethrown.
    pub fn replace(&self, exception: HookException) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(exception);
    }
}

/// Shared handle to the replacement result.
#[derive(Clone, Default)]
pub struct ReturnActions {
    slot: Arc<Mutex<Option<Value>>>,
}

impl ReturnActions {
    pub fn get(&self) -> Option<Value> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, value: Value) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }
}

/// Facades and context the exception hooks receive.
pub(crate) struct RecoveryEnv {
    pub schema: String,
    pub db: Db,
    pub raw_db: RawDb,
    pub context: HookContext,
}

pub(crate) async fn execute_exception_hooks(
    hooks: &[HookFn<CatchExceptionArgs, ()>],
    env: RecoveryEnv,
    name: HookPoint,
    data: ExceptionData,
    exception: HookException,
) -> EngineResult<Value> {
    if hooks.is_empty() {
        debug!(schema = %env.schema, point = %name, "no exception hooks, rethrowing");
        return Err(EngineError::Interrupted(exception));
    }

    let exception_actions = ExceptionActions::new(exception.clone());
    let return_actions = ReturnActions::default();
    let args = CatchExceptionArgs {
        schema: env.schema.clone(),
        name,
        data,
        exception,
        exception_actions: exception_actions.clone(),
        return_actions: return_actions.clone(),
        db: env.db,
        raw_db: env.raw_db,
        context: env.context,
    };

    let outcomes = join_all(hooks.iter().map(|hook| hook(args.clone()))).await;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        if let Err(e) = outcome {
            warn!(schema = %env.schema, point = %name, hook = index, error = %e, "exception hook failed");
        }
    }

    if let Some(exception) = exception_actions.get() {
        debug!(schema = %env.schema, point = %name, "exception not cleared, rethrowing");
        return Err(EngineError::Interrupted(exception));
    }
    match return_actions.get() {
        Some(value) => {
            debug!(schema = %env.schema, point = %name, "operation recovered");
            Ok(value)
        }
        None => Err(EngineError::UnresolvedRecovery {
            schema: env.schema,
            point: name,
        }),
    }
}
