//! The hook registry, built once at startup.
//!
//! Hooks come from two sources: each schema's [`SchemaConfig`] (after plugin
//! composition) and declarative registrations made on the builder. The
//! registry keeps one ordered list per (schema, point) with configuration
//! hooks first, then declarative hooks in registration order.

use crate::dispatcher::OperationDispatcher;
use crate::error::RegistryError;
use crate::hook::{HookPoint, OperationDef, PointHook, SchemaHooks};
use crate::plugin::{SchemaConfig, compose};
use std::collections::HashMap;
use tracing::info;

/// Which schema a hook unit entry applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaTarget {
    /// The unit's own schema.
    Default,
    Named(String),
}

/// A named group of declarative hooks and operations, optionally bound to a
/// default schema.
#[derive(Debug, Clone)]
pub struct HookUnit {
    name: String,
    schema: Option<String>,
    hooks: Vec<(SchemaTarget, PointHook)>,
    operations: Vec<(SchemaTarget, OperationDef)>,
}

impl HookUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            hooks: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Sets the schema entries with [`SchemaTarget::Default`] apply to.
    pub fn for_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn hook(mut self, hook: PointHook) -> Self {
        self.hooks.push((SchemaTarget::Default, hook));
        self
    }

    pub fn hook_for(mut self, schema: impl Into<String>, hook: PointHook) -> Self {
        self.hooks.push((SchemaTarget::Named(schema.into()), hook));
        self
    }

    pub fn operation(mut self, operation: OperationDef) -> Self {
        self.operations.push((SchemaTarget::Default, operation));
        self
    }

    pub fn operation_for(mut self, schema: impl Into<String>, operation: OperationDef) -> Self {
        self.operations.push((SchemaTarget::Named(schema.into()), operation));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

enum Declaration {
    Hook(String, PointHook),
    Operation(String, OperationDef),
    Unit(HookUnit),
}

/// Collects configuration and declarative registrations.
#[derive(Default)]
pub struct HookRegistryBuilder {
    configs: Vec<(String, SchemaConfig)>,
    declarations: Vec<Declaration>,
}

impl HookRegistryBuilder {
    /// Adds a schema's static configuration. Its plugins are composed at build.
    pub fn schema(mut self, schema: impl Into<String>, config: SchemaConfig) -> Self {
        self.configs.push((schema.into(), config));
        self
    }

    pub fn register(mut self, schema: impl Into<String>, hook: PointHook) -> Self {
        self.declarations.push(Declaration::Hook(schema.into(), hook));
        self
    }

    pub fn register_operation(mut self, schema: impl Into<String>, operation: OperationDef) -> Self {
        self.declarations
            .push(Declaration::Operation(schema.into(), operation));
        self
    }

    pub fn register_unit(mut self, unit: HookUnit) -> Self {
        self.declarations.push(Declaration::Unit(unit));
        self
    }

    pub fn build(self) -> Result<HookRegistry, RegistryError> {
        let mut schemas: HashMap<String, SchemaHooks> = HashMap::new();
        let mut dispatcher = OperationDispatcher::new();
        let mut declared_operations = Vec::new();

        for (schema, config) in self.configs {
            let config = compose(&schema, config)?;
            for operation in config.operations {
                dispatcher.insert(&schema, operation);
            }
            let hooks = schemas.entry(schema).or_default();
            append(hooks, config.hooks);
        }

        for declaration in self.declarations {
            match declaration {
                Declaration::Hook(schema, hook) => schemas.entry(schema).or_default().push(hook),
                Declaration::Operation(schema, operation) => declared_operations.push((schema, operation)),
                Declaration::Unit(unit) => {
                    for (target, hook) in unit.hooks {
                        let schema = match target {
                            SchemaTarget::Named(schema) => schema,
                            SchemaTarget::Default => unit.schema.clone().ok_or_else(|| {
                                RegistryError::MissingSchema {
                                    unit: unit.name.clone(),
                                    point: hook.point(),
                                }
                            })?,
                        };
                        schemas.entry(schema).or_default().push(hook);
                    }
                    for (target, operation) in unit.operations {
                        let schema = match target {
                            SchemaTarget::Named(schema) => schema,
                            SchemaTarget::Default => unit.schema.clone().ok_or_else(|| {
                                RegistryError::MissingOperationSchema {
                                    unit: unit.name.clone(),
                                    operation_type: operation.operation_type.clone(),
                                    action: operation.action.clone(),
                                }
                            })?,
                        };
                        declared_operations.push((schema, operation));
                    }
                }
            }
        }

        // Declarative operations resolve after configuration ones and win.
        for (schema, operation) in declared_operations {
            dispatcher.insert(&schema, operation);
        }

        let registry = HookRegistry {
            schemas,
            dispatcher,
            empty: SchemaHooks::default(),
        };
        info!(
            schemas = registry.schemas.len(),
            hooks = registry.schemas.values().map(SchemaHooks::total).sum::<usize>(),
            operations = registry.dispatcher.len(),
            "hook registry built"
        );
        Ok(registry)
    }
}

/// Appends every list of `from` to the matching list of `into`.
fn append(into: &mut SchemaHooks, from: SchemaHooks) {
    into.before_create.extend(from.before_create);
    into.after_create.extend(from.after_create);
    into.before_update.extend(from.before_update);
    into.after_update.extend(from.after_update);
    into.before_delete.extend(from.before_delete);
    into.after_delete.extend(from.after_delete);
    into.after_query.extend(from.after_query);
    into.after_error.extend(from.after_error);
    into.catch_exception.extend(from.catch_exception);
}

/// Read-only hook lists and operation routes for every schema.
pub struct HookRegistry {
    schemas: HashMap<String, SchemaHooks>,
    dispatcher: OperationDispatcher,
    empty: SchemaHooks,
}

impl HookRegistry {
    pub fn builder() -> HookRegistryBuilder {
        HookRegistryBuilder::default()
    }

    /// A registry without hooks or operations.
    pub fn empty() -> Self {
        Self {
            schemas: HashMap::new(),
            dispatcher: OperationDispatcher::new(),
            empty: SchemaHooks::default(),
        }
    }

    /// The hooks of `schema`; empty lists if none were registered.
    pub fn hooks(&self, schema: &str) -> &SchemaHooks {
        self.schemas.get(schema).unwrap_or(&self.empty)
    }

    pub fn count(&self, schema: &str, point: HookPoint) -> usize {
        self.hooks(schema).len(point)
    }

    pub fn dispatcher(&self) -> &OperationDispatcher {
        &self.dispatcher
    }

    /// Schemas with at least one registration, sorted.
    pub fn schemas(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
