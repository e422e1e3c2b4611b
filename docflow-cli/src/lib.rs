//! Script runner behind the `docflow` binary.
//!
//! A script is JSON lines, one operation per line:
//!
//! ```text
//! {"op": "create", "schema": "books", "data": {"title": "Dune"}}
//! {"op": "find", "schema": "books", "query": {"filter": {"title": "Dune"}}}
//! {"op": "dispatch", "schema": "books", "operation_type": "versions", "action": "list"}
//! ```
//!
//! Every operation may carry a `context` object (`body`, `query`, `params`,
//! `session`, `fields`). Blank lines and lines starting with `#` are skipped.
//! Each executed line yields one JSON result line.

use anyhow::{Context, Result};
use docflow_engine::{ContextData, EngineConfig, HookContext, LifecycleEngine};
use docflow_model::{Filter, FindOptions, Record};
use docflow_storage::MemoryStore;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// One script line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptOp {
    Create {
        schema: String,
        data: Record,
        #[serde(default)]
        context: ContextData,
    },
    CreateMany {
        schema: String,
        data: Vec<Record>,
        #[serde(default)]
        context: ContextData,
    },
    Find {
        schema: String,
        /// `{filter, sort, skip, limit}`.
        #[serde(default)]
        query: Value,
        #[serde(default)]
        context: ContextData,
    },
    FindById {
        schema: String,
        id: String,
        #[serde(default)]
        context: ContextData,
    },
    Update {
        schema: String,
        filter: Filter,
        data: Record,
        #[serde(default)]
        context: ContextData,
    },
    UpdateById {
        schema: String,
        id: String,
        data: Record,
        #[serde(default)]
        context: ContextData,
    },
    Delete {
        schema: String,
        filter: Filter,
        #[serde(default)]
        context: ContextData,
    },
    DeleteById {
        schema: String,
        id: String,
        #[serde(default)]
        context: ContextData,
    },
    Dispatch {
        schema: String,
        operation_type: String,
        action: String,
        #[serde(default)]
        context: ContextData,
    },
}

impl ScriptOp {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptOp::Create { .. } => "create",
            ScriptOp::CreateMany { .. } => "create_many",
            ScriptOp::Find { .. } => "find",
            ScriptOp::FindById { .. } => "find_by_id",
            ScriptOp::Update { .. } => "update",
            ScriptOp::UpdateById { .. } => "update_by_id",
            ScriptOp::Delete { .. } => "delete",
            ScriptOp::DeleteById { .. } => "delete_by_id",
            ScriptOp::Dispatch { .. } => "dispatch",
        }
    }
}

/// Counts of a finished script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Executes script operations against one engine.
pub struct ScriptRunner {
    engine: LifecycleEngine,
    store: MemoryStore,
}

impl ScriptRunner {
    /// Builds the registry from the configured schemas and their plugins on
    /// top of a fresh in-memory store.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let registry = docflow_plugins::registry_builder(config)
            .context("invalid plugin settings")?
            .build()
            .context("failed to build hook registry")?;
        let store = MemoryStore::new();
        let engine = LifecycleEngine::new(Arc::new(store.clone()), registry, config.catalog());
        Ok(Self { engine, store })
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Runs a single operation.
    pub async fn execute(&self, op: ScriptOp) -> Result<Value> {
        let engine = &self.engine;
        let value = match op {
            ScriptOp::Create { schema, data, context } => {
                engine.create(&schema, data, HookContext::from_data(context)).await?
            }
            ScriptOp::CreateMany { schema, data, context } => {
                Value::Array(engine.create_many(&schema, data, HookContext::from_data(context)).await?)
            }
            ScriptOp::Find { schema, query, context } => {
                let options = FindOptions::from_body(&query).context("invalid query")?;
                Value::Array(engine.find(&schema, options, HookContext::from_data(context)).await?)
            }
            ScriptOp::FindById { schema, id, context } => engine
                .find_by_id(&schema, &id, HookContext::from_data(context))
                .await?
                .unwrap_or_default(),
            ScriptOp::Update {
                schema,
                filter,
                data,
                context,
            } => Value::Array(
                engine
                    .update(&schema, filter, data, HookContext::from_data(context))
                    .await?,
            ),
            ScriptOp::UpdateById {
                schema,
                id,
                data,
                context,
            } => {
                engine
                    .update_by_id(&schema, &id, data, HookContext::from_data(context))
                    .await?
            }
            ScriptOp::Delete { schema, filter, context } => {
                Value::Array(engine.delete(&schema, filter, HookContext::from_data(context)).await?)
            }
            ScriptOp::DeleteById { schema, id, context } => {
                engine.delete_by_id(&schema, &id, HookContext::from_data(context)).await?
            }
            ScriptOp::Dispatch {
                schema,
                operation_type,
                action,
                context,
            } => {
                engine
                    .dispatch(&schema, &operation_type, &action, HookContext::from_data(context))
                    .await?
            }
        };
        Ok(value)
    }

    /// Reads operations from `input` and writes one result line per
    /// operation to `output`. Failed lines do not stop the run.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> Result<ScriptSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut summary = ScriptSummary::default();
        let mut number = 0usize;

        while let Some(line) = lines.next_line().await.context("failed to read script")? {
            number += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let outcome = match serde_json::from_str::<ScriptOp>(line) {
                Ok(op) => {
                    let name = op.name();
                    debug!(line = number, op = name, "executing script line");
                    match self.execute(op).await {
                        Ok(result) => {
                            summary.succeeded += 1;
                            json!({"line": number, "op": name, "result": result})
                        }
                        Err(e) => {
                            summary.failed += 1;
                            warn!(line = number, op = name, error = %e, "operation failed");
                            json!({"line": number, "op": name, "error": format!("{e:#}")})
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(line = number, error = %e, "malformed script line");
                    json!({"line": number, "error": format!("malformed line: {e}")})
                }
            };

            let mut rendered = serde_json::to_vec(&outcome).context("failed to render result")?;
            rendered.push(b'\n');
            output.write_all(&rendered).await.context("failed to write result")?;
        }

        output.flush().await.context("failed to flush output")?;
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "script finished"
        );
        Ok(summary)
    }
}
