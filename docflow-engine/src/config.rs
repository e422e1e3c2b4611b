//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [[schemas]]
//! name = "books"
//! fields = [{ name = "title", type = "text" }]
//!
//! [schemas.plugins.versions]
//! max = 2
//! ```
//!
//! Plugin settings are kept as raw TOML tables; the crate that provides the
//! plugins interprets them.

use crate::error::ConfigError;
use docflow_model::{FieldDef, SchemaCatalog, SchemaDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One `[[schemas]]` entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSection {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    /// Plugin name → settings.
    #[serde(default)]
    pub plugins: toml::Table,
}

impl SchemaSection {
    pub fn definition(&self) -> SchemaDefinition {
        SchemaDefinition::new(&self.name, self.fields.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub schemas: Vec<SchemaSection>,
}

impl EngineConfig {
    /// Loads configuration from an explicit path.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        info!(path = %path.display(), schemas = config.schemas.len(), "loaded engine config");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for schema in &self.schemas {
            if schema.name.trim().is_empty() {
                return Err(ConfigError::Invalid("schema name must not be empty".into()));
            }
            if !seen.insert(schema.name.as_str()) {
                return Err(ConfigError::Invalid(format!("schema '{}' declared twice", schema.name)));
            }
        }
        Ok(())
    }

    /// The schema catalog described by this configuration.
    pub fn catalog(&self) -> SchemaCatalog {
        self.schemas.iter().map(SchemaSection::definition).collect()
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaSection> {
        self.schemas.iter().find(|s| s.name == name)
    }
}
