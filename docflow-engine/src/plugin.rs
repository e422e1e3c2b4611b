//! Plugins and the plugin composer.
//!
//! A plugin rewrites a schema's configuration: it appends or prepends hooks
//! and registers named operations. The composer folds a schema's plugin list
//! over its configuration before the registry is built.

use crate::error::PluginError;
use crate::hook::{OperationDef, PointHook, SchemaHooks};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A reusable bundle of hooks and operations.
pub trait Plugin: Send + Sync {
    /// Unique name, used for dependency checks and idempotence.
    fn name(&self) -> &str;

    /// Lower runs first. Plugins with equal priority keep list order.
    fn priority(&self) -> i32 {
        0
    }

    /// Names of plugins that must already be applied to the schema.
    fn depends(&self) -> Vec<String> {
        Vec::new()
    }

    fn inject(&self, schema: &str, config: SchemaConfig) -> Result<SchemaConfig, PluginError>;
}

/// Static configuration of one schema: its hooks, operations and plugins.
#[derive(Clone, Default)]
pub struct SchemaConfig {
    pub hooks: SchemaHooks,
    pub operations: Vec<OperationDef>,
    pub plugins: Vec<Arc<dyn Plugin>>,
    applied: Vec<String>,
}

impl SchemaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: PointHook) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_operation(mut self, operation: OperationDef) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Whether a plugin with this name was already applied.
    pub fn is_applied(&self, plugin: &str) -> bool {
        self.applied.iter().any(|p| p == plugin)
    }

    /// Plugin names in the order they were applied.
    pub fn applied_plugins(&self) -> &[String] {
        &self.applied
    }
}

impl fmt::Debug for SchemaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaConfig")
            .field("hooks", &self.hooks.total())
            .field("operations", &self.operations)
            .field("plugins", &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>())
            .field("applied", &self.applied)
            .finish()
    }
}

/// Applies `config.plugins` to `config`, ordered by ascending priority.
///
/// A plugin already applied to this configuration is skipped, so composing
/// twice yields the same configuration.
pub fn compose(schema: &str, mut config: SchemaConfig) -> Result<SchemaConfig, PluginError> {
    let mut plugins = std::mem::take(&mut config.plugins);
    plugins.sort_by_key(|p| p.priority());

    for plugin in &plugins {
        let name = plugin.name();
        if config.is_applied(name) {
            debug!(schema, plugin = name, "plugin already applied, skipping");
            continue;
        }
        if let Some(missing) = plugin.depends().into_iter().find(|dep| !config.is_applied(dep)) {
            return Err(PluginError::MissingDependency {
                plugin: name.to_string(),
                schema: schema.to_string(),
                dependency: missing,
            });
        }
        config = plugin.inject(schema, config)?;
        config.applied.push(name.to_string());
        info!(schema, plugin = name, "plugin applied");
    }

    config.plugins = plugins;
    Ok(config)
}
