//! Content review.
//!
//! Writes to a reviewed schema are parked in `__<schema>_review` as pending
//! entries instead of being persisted. The `(review, confirm)` operation
//! approves an entry, which replays the original write with the replay marker
//! set on the context, or rejects it.

use crate::filter::list_options;
use chrono::{SecondsFormat, Utc};
use docflow_engine::{
    HookContext, HookError, HookFlow, HookResult, OperationArgs, OperationDef, Plugin, PluginError, PointHook, RawDb,
    SchemaConfig,
};
use docflow_model::{Document, Record, RecordExt, into_record};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

pub const PLUGIN_NAME: &str = "review";

/// Context field that lets a replayed write through the review hooks.
pub const REPLAY_MARKER: &str = "reviewReplay";

pub const STATUS_IN_REVIEW: &str = "in review";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "reject";

/// Write kinds that can be put under review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewedOperation {
    Create,
    Update,
    Delete,
}

impl ReviewedOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewedOperation::Create => "create",
            ReviewedOperation::Update => "update",
            ReviewedOperation::Delete => "delete",
        }
    }
}

/// Parks writes of a schema for review.
#[derive(Debug, Clone)]
pub struct ContentReview {
    collection: Option<String>,
    operations: Vec<ReviewedOperation>,
}

#[derive(Debug, Deserialize)]
struct Settings {
    collection: Option<String>,
    operations: Option<Vec<ReviewedOperation>>,
}

impl Default for ContentReview {
    fn default() -> Self {
        Self {
            collection: None,
            operations: vec![ReviewedOperation::Create],
        }
    }
}

impl ContentReview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_operations(mut self, operations: Vec<ReviewedOperation>) -> Self {
        self.operations = operations;
        self
    }

    /// Interprets `true | false | { collection, operations }`.
    pub fn from_settings(settings: &toml::Value) -> Result<Option<Self>, PluginError> {
        let config_error = |reason: String| PluginError::Config {
            plugin: PLUGIN_NAME.to_string(),
            reason,
        };
        match settings {
            toml::Value::Boolean(true) => Ok(Some(Self::new())),
            toml::Value::Boolean(false) => Ok(None),
            toml::Value::Table(_) => {
                let parsed: Settings = settings
                    .clone()
                    .try_into()
                    .map_err(|e: toml::de::Error| config_error(e.to_string()))?;
                let mut plugin = Self::new();
                if let Some(collection) = parsed.collection.filter(|c| !c.is_empty()) {
                    plugin = plugin.with_collection(collection);
                }
                if let Some(operations) = parsed.operations {
                    plugin = plugin.with_operations(operations);
                }
                Ok(Some(plugin))
            }
            other => Err(config_error(format!(
                "expected a boolean or a table, got {}",
                other.type_str()
            ))),
        }
    }

    pub fn collection_for(&self, schema: &str) -> String {
        self.collection
            .clone()
            .unwrap_or_else(|| format!("__{schema}_review"))
    }

    fn reviews(&self, operation: ReviewedOperation) -> bool {
        self.operations.contains(&operation)
    }
}

fn is_replay(context: &HookContext) -> bool {
    context
        .get(REPLAY_MARKER)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Inserts a pending entry and returns it as stored.
async fn open_review(
    raw_db: &RawDb,
    collection: &str,
    schema: &str,
    operation: ReviewedOperation,
    payload: Value,
) -> HookResult<Document> {
    let review_id = format!("review_{schema}_{}", Uuid::new_v4().simple());
    let entry = json!({
        "reviewId": review_id,
        "type": operation.as_str(),
        "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "payload": payload,
        "status": STATUS_IN_REVIEW,
    });
    let stored = raw_db.insert_one(collection, into_record(entry)?).await?;
    info!(schema, review_id = %review_id, operation = operation.as_str(), "write parked for review");
    Ok(stored)
}

async fn find_entry(raw_db: &RawDb, collection: &str, review_id: &str) -> HookResult<Document> {
    let mut filter = Record::new();
    filter.insert("reviewId".into(), json!(review_id));
    raw_db
        .find_one(collection, &filter)
        .await?
        .ok_or_else(|| HookError::not_found(format!("review entry {review_id}")))
}

async fn set_status(raw_db: &RawDb, collection: &str, entry: &Document, status: &str) -> HookResult<Document> {
    let id = entry
        .id()
        .ok_or_else(|| HookError::bad_request("review entry has no _id"))?;
    let mut fields = Record::new();
    fields.insert("status".into(), json!(status));
    raw_db
        .set_fields(collection, id, fields)
        .await?
        .ok_or_else(|| HookError::not_found(format!("review entry {id}")))
}

/// Replays an approved entry through the schema's own lifecycle.
async fn replay(args: &OperationArgs, entry: &Document) -> HookResult<Value> {
    let payload_id = || {
        entry
            .get_str("/payload/_id")
            .map(str::to_string)
            .ok_or_else(|| HookError::bad_request("review payload has no _id"))
    };
    let payload_data = || {
        entry
            .pointer("/payload/data")
            .cloned()
            .ok_or_else(|| HookError::bad_request("review payload has no data"))
            .and_then(|data| into_record(data).map_err(HookError::from))
    };

    args.context.set(REPLAY_MARKER, json!(true));
    match entry.get_str("/type") {
        Some("create") => Ok(args.db.create(&args.schema, payload_data()?).await?),
        Some("update") => Ok(args.db.update_by_id(&args.schema, &payload_id()?, payload_data()?).await?),
        Some("delete") => Ok(args.db.delete_by_id(&args.schema, &payload_id()?).await?),
        other => Err(HookError::bad_request(format!(
            "review entry has unexpected type {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

async fn confirm(args: OperationArgs, collection: String) -> HookResult<Value> {
    let body = args.context.body();
    let review_id = body
        .get("reviewId")
        .and_then(Value::as_str)
        .ok_or_else(|| HookError::bad_request("reviewId is required"))?
        .to_string();
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();

    match status {
        STATUS_APPROVED => {
            let entry = find_entry(&args.raw_db, &collection, &review_id).await?;
            if entry.get_str("/status") == Some(STATUS_APPROVED) {
                return Err(HookError::bad_request(format!("review {review_id} is already approved")));
            }
            let entry = set_status(&args.raw_db, &collection, &entry, STATUS_APPROVED).await?;
            debug!(schema = %args.schema, review_id = %review_id, "replaying approved write");
            replay(&args, &entry).await
        }
        STATUS_REJECTED => {
            let entry = find_entry(&args.raw_db, &collection, &review_id).await?;
            let entry = set_status(&args.raw_db, &collection, &entry, STATUS_REJECTED).await?;
            Ok(Value::Object(entry))
        }
        other => Err(HookError::bad_request(format!("unsupported review status '{other}'"))),
    }
}

impl Plugin for ContentReview {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn inject(&self, schema: &str, mut config: SchemaConfig) -> Result<SchemaConfig, PluginError> {
        let collection = self.collection_for(schema);

        if self.reviews(ReviewedOperation::Create) {
            let collection = collection.clone();
            config.hooks.push(PointHook::before_create(move |args| {
                let collection = collection.clone();
                async move {
                    if is_replay(&args.context) {
                        return Ok(HookFlow::Proceed(args.data));
                    }
                    let payload = json!({ "data": args.pure_data.to_owned_value() });
                    let entry =
                        open_review(&args.raw_db, &collection, &args.schema, ReviewedOperation::Create, payload)
                            .await?;
                    Ok(HookFlow::Defer(Value::Object(entry)))
                }
            }));
        }

        if self.reviews(ReviewedOperation::Update) {
            let collection = collection.clone();
            config.hooks.push(PointHook::before_update(move |args| {
                let collection = collection.clone();
                async move {
                    if is_replay(&args.context) {
                        return Ok(HookFlow::Proceed(args.data));
                    }
                    let payload = json!({
                        "_id": args.original_document.get("_id").cloned().unwrap_or(Value::Null),
                        "data": args.pure_data.to_owned_value(),
                    });
                    let entry =
                        open_review(&args.raw_db, &collection, &args.schema, ReviewedOperation::Update, payload)
                            .await?;
                    Ok(HookFlow::Defer(Value::Object(entry)))
                }
            }));
        }

        if self.reviews(ReviewedOperation::Delete) {
            let collection = collection.clone();
            config.hooks.push(PointHook::before_delete(move |args| {
                let collection = collection.clone();
                async move {
                    if is_replay(&args.context) {
                        return Ok(HookFlow::Proceed(()));
                    }
                    let payload = json!({ "_id": args.document.get("_id").cloned().unwrap_or(Value::Null) });
                    let entry =
                        open_review(&args.raw_db, &collection, &args.schema, ReviewedOperation::Delete, payload)
                            .await?;
                    Ok(HookFlow::Defer(Value::Object(entry)))
                }
            }));
        }

        let confirm_collection = collection.clone();
        config.operations.insert(
            0,
            OperationDef::new("review", "confirm", move |args| {
                confirm(args, confirm_collection.clone())
            }),
        );
        config.operations.insert(
            0,
            OperationDef::new("review", "list", move |args| {
                let collection = collection.clone();
                async move {
                    let options = list_options(&args.context.body())?;
                    let entries = args.raw_db.find(&collection, &options).await?;
                    Ok(Value::Array(entries.into_iter().map(Value::Object).collect()))
                }
            }),
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_select_operations() {
        let table: toml::Table =
            toml::from_str("review = { operations = [\"create\", \"delete\"], collection = \"queue\" }").unwrap();
        let plugin = ContentReview::from_settings(&table["review"]).unwrap().unwrap();
        assert!(plugin.reviews(ReviewedOperation::Create));
        assert!(!plugin.reviews(ReviewedOperation::Update));
        assert!(plugin.reviews(ReviewedOperation::Delete));
        assert_eq!(plugin.collection_for("books"), "queue");
    }

    #[test]
    fn defaults_review_creates_only() {
        let plugin = ContentReview::from_settings(&toml::Value::Boolean(true)).unwrap().unwrap();
        assert_eq!(plugin.operations, vec![ReviewedOperation::Create]);
        assert_eq!(plugin.collection_for("books"), "__books_review");
    }

    #[test]
    fn unknown_operation_is_a_config_error() {
        let table: toml::Table = toml::from_str("review = { operations = [\"archive\"] }").unwrap();
        assert!(matches!(
            ContentReview::from_settings(&table["review"]),
            Err(PluginError::Config { .. })
        ));
    }
}
