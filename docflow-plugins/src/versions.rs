//! Version snapshots.
//!
//! Every create, update and delete of the schema writes a snapshot
//! `{pid, operationAt, operationType, data}` into a side collection inside
//! the operation's transaction. Update snapshots of one record are capped at
//! `max`; the oldest go first.

use crate::filter::list_options;
use chrono::{SecondsFormat, Utc};
use docflow_engine::{HookResult, OperationDef, Plugin, PluginError, PointHook, RawDb, SchemaConfig};
use docflow_model::{Document, FindOptions, Record, RecordExt, SortKey};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Update snapshots kept per record when no limit is configured.
pub const DEFAULT_MAX_VERSIONS: usize = 50;

pub const PLUGIN_NAME: &str = "versions";

/// Snapshots records of a schema into `__<schema>_versions`.
#[derive(Debug, Clone)]
pub struct VersionControl {
    max: usize,
    collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Settings {
    max: Option<i64>,
    collection: Option<String>,
}

impl Default for VersionControl {
    fn default() -> Self {
        Self {
            max: DEFAULT_MAX_VERSIONS,
            collection: None,
        }
    }
}

impl VersionControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps update snapshots per record. Zero falls back to the default.
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = if max == 0 { DEFAULT_MAX_VERSIONS } else { max };
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into()).filter(|c: &String| !c.is_empty());
        self
    }

    /// Interprets `true | false | { max, collection }`. `false` disables the
    /// plugin.
    pub fn from_settings(settings: &toml::Value) -> Result<Option<Self>, PluginError> {
        match settings {
            toml::Value::Boolean(true) => Ok(Some(Self::new())),
            toml::Value::Boolean(false) => Ok(None),
            toml::Value::Table(_) => {
                let parsed: Settings = settings.clone().try_into().map_err(|e: toml::de::Error| PluginError::Config {
                    plugin: PLUGIN_NAME.to_string(),
                    reason: e.to_string(),
                })?;
                let mut plugin = Self::new();
                if let Some(max) = parsed.max.filter(|m| *m > 0) {
                    plugin = plugin.with_max(usize::try_from(max).unwrap_or(DEFAULT_MAX_VERSIONS));
                }
                if let Some(collection) = parsed.collection {
                    plugin = plugin.with_collection(collection);
                }
                Ok(Some(plugin))
            }
            other => Err(PluginError::Config {
                plugin: PLUGIN_NAME.to_string(),
                reason: format!("expected a boolean or a table, got {}", other.type_str()),
            }),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn collection_for(&self, schema: &str) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| format!("__{schema}_versions"))
    }
}

fn snapshot(document: &Document, operation_type: &str) -> Record {
    let mut entry = Record::new();
    entry.insert("pid".into(), document.get("_id").cloned().unwrap_or(Value::Null));
    entry.insert(
        "operationAt".into(),
        json!(Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)),
    );
    entry.insert("operationType".into(), json!(operation_type));
    entry.insert("data".into(), Value::Object(document.clone()));
    entry
}

/// Deletes update snapshots of `pid` beyond the newest `keep`.
async fn prune(raw_db: &RawDb, collection: &str, pid: &Value, keep: usize) -> HookResult<()> {
    let mut filter = Record::new();
    filter.insert("pid".into(), pid.clone());
    filter.insert("operationType".into(), json!("update"));
    let options = FindOptions::new()
        .filter(filter)
        .sort(SortKey::desc("operationAt"))
        .sort(SortKey::desc("_id"))
        .skip(keep);
    let obsolete = raw_db.find(collection, &options).await?;
    for version in &obsolete {
        if let Some(id) = version.id() {
            raw_db.delete_by_id(collection, id).await?;
        }
    }
    if !obsolete.is_empty() {
        debug!(collection, pruned = obsolete.len(), "obsolete versions removed");
    }
    Ok(())
}

impl Plugin for VersionControl {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn inject(&self, schema: &str, mut config: SchemaConfig) -> Result<SchemaConfig, PluginError> {
        let collection = self.collection_for(schema);
        let max = self.max;

        let on_create = collection.clone();
        config.hooks.prepend(PointHook::after_create(move |args| {
            let collection = on_create.clone();
            async move {
                let entry = snapshot(&args.document, "create");
                let raw_db = args.raw_db.clone();
                args.defer.defer(move || async move {
                    raw_db.insert_one(&collection, entry).await?;
                    Ok(())
                });
                Ok(args.document)
            }
        }));

        let on_update = collection.clone();
        config.hooks.prepend(PointHook::after_update(move |args| {
            let collection = on_update.clone();
            async move {
                let entry = snapshot(&args.current_document, "update");
                let pid = entry.get("pid").cloned().unwrap_or(Value::Null);
                let raw_db = args.raw_db.clone();
                args.defer.defer(move || async move {
                    raw_db.insert_one(&collection, entry).await?;
                    prune(&raw_db, &collection, &pid, max).await
                });
                Ok(args.current_document)
            }
        }));

        let on_delete = collection.clone();
        config.hooks.prepend(PointHook::after_delete(move |args| {
            let collection = on_delete.clone();
            async move {
                let entry = snapshot(&args.document, "delete");
                let raw_db = args.raw_db.clone();
                args.defer.defer(move || async move {
                    raw_db.insert_one(&collection, entry).await?;
                    Ok(())
                });
                Ok(())
            }
        }));

        config.operations.insert(
            0,
            OperationDef::new("versions", "list", move |args| {
                let collection = collection.clone();
                async move {
                    let options = list_options(&args.context.body())?;
                    let versions = args.raw_db.find(&collection, &options).await?;
                    Ok(Value::Array(versions.into_iter().map(Value::Object).collect()))
                }
            }),
        );

        Ok(config)
    }
}
