//! Builds plugin lists from the `[schemas.plugins]` tables of the engine
//! configuration.

use crate::review::{self, ContentReview};
use crate::versions::{self, VersionControl};
use docflow_engine::{EngineConfig, HookRegistryBuilder, Plugin, PluginError, SchemaConfig, SchemaSection};
use std::sync::Arc;
use tracing::debug;

/// Instantiates the plugins a schema section enables, ordered by plugin name.
pub fn plugins_for(section: &SchemaSection) -> Result<Vec<Arc<dyn Plugin>>, PluginError> {
    let mut plugins: Vec<Arc<dyn Plugin>> = Vec::new();
    for (name, settings) in &section.plugins {
        let plugin: Option<Arc<dyn Plugin>> = match name.as_str() {
            versions::PLUGIN_NAME => VersionControl::from_settings(settings)?.map(|p| Arc::new(p) as Arc<dyn Plugin>),
            review::PLUGIN_NAME => ContentReview::from_settings(settings)?.map(|p| Arc::new(p) as Arc<dyn Plugin>),
            other => return Err(PluginError::Unknown(other.to_string())),
        };
        match plugin {
            Some(plugin) => plugins.push(plugin),
            None => debug!(schema = %section.name, plugin = %name, "plugin disabled"),
        }
    }
    Ok(plugins)
}

/// The static configuration of a schema section: its configured plugins.
pub fn schema_config(section: &SchemaSection) -> Result<SchemaConfig, PluginError> {
    Ok(plugins_for(section)?
        .into_iter()
        .fold(SchemaConfig::new(), SchemaConfig::with_plugin))
}

/// A registry builder preloaded with every configured schema.
pub fn registry_builder(config: &EngineConfig) -> Result<HookRegistryBuilder, PluginError> {
    let mut builder = HookRegistryBuilder::default();
    for section in &config.schemas {
        builder = builder.schema(&section.name, schema_config(section)?);
    }
    Ok(builder)
}
