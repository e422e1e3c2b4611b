//! Per-request hook context.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};

/// Request metadata carried by a [`HookContext`].
///
/// The engine does not interpret any of it. `fields` holds ad hoc values hooks
/// and plugins attach while an operation runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextData {
    pub body: Value,
    pub query: Value,
    pub params: Value,
    pub session: Value,
    pub fields: Map<String, Value>,
}

/// A mutable bag shared by every hook of one top-level operation and by the
/// operations nested inside it. Cloning yields another handle to the same bag.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    inner: Arc<RwLock<ContextData>>,
}

impl HookContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: ContextData) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// A context whose request body is `body`.
    pub fn with_body(body: Value) -> Self {
        Self::from_data(ContextData {
            body,
            ..ContextData::default()
        })
    }

    fn read<T>(&self, f: impl FnOnce(&ContextData) -> T) -> T {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut ContextData) -> T) -> T {
        f(&mut self.inner.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn body(&self) -> Value {
        self.read(|d| d.body.clone())
    }

    pub fn set_body(&self, body: Value) {
        self.write(|d| d.body = body)
    }

    pub fn query(&self) -> Value {
        self.read(|d| d.query.clone())
    }

    pub fn params(&self) -> Value {
        self.read(|d| d.params.clone())
    }

    pub fn session(&self) -> Value {
        self.read(|d| d.session.clone())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read(|d| d.fields.get(key).cloned())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.write(|d| {
            d.fields.insert(key.into(), value);
        })
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write(|d| d.fields.remove(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read(|d| d.fields.contains_key(key))
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> ContextData {
        self.read(ContextData::clone)
    }

    /// Whether both handles refer to the same bag.
    pub fn same_as(&self, other: &HookContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
