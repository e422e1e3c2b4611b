//! Routing of named operations.

use crate::hook::OperationDef;
use std::collections::HashMap;
use tracing::debug;

/// Identifies a named operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub schema: String,
    pub operation_type: String,
    pub action: String,
}

impl RouteKey {
    pub fn new(schema: impl Into<String>, operation_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            operation_type: operation_type.into(),
            action: action.into(),
        }
    }
}

/// Maps `(schema, operation_type, action)` to exactly one handler.
#[derive(Clone, Default)]
pub struct OperationDispatcher {
    routes: HashMap<RouteKey, OperationDef>,
}

impl OperationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. A later registration for the same key replaces
    /// the earlier one.
    pub fn insert(&mut self, schema: &str, operation: OperationDef) {
        let key = RouteKey::new(schema, &operation.operation_type, &operation.action);
        if self.routes.contains_key(&key) {
            debug!(
                schema,
                operation_type = %key.operation_type,
                action = %key.action,
                "operation overridden"
            );
        }
        self.routes.insert(key, operation);
    }

    pub fn resolve(&self, schema: &str, operation_type: &str, action: &str) -> Option<&OperationDef> {
        self.routes.get(&RouteKey::new(schema, operation_type, action))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered keys, sorted.
    pub fn routes(&self) -> Vec<&RouteKey> {
        let mut keys: Vec<_> = self.routes.keys().collect();
        keys.sort_by(|a, b| {
            (&a.schema, &a.operation_type, &a.action).cmp(&(&b.schema, &b.operation_type, &b.action))
        });
        keys
    }
}
