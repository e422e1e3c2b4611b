//! Friendly filter form used by the list operations.
//!
//! `{field: value}` matches by equality; `{field: {contains, eq, lt, lte, gt,
//! gte, exists}}` maps each key to the store's `$`-operator. Null values are
//! dropped so clients can send sparse forms.

use docflow_model::{Filter, FindOptions, ModelResult};
use serde_json::{Map, Value};

const FRIENDLY_OPERATORS: [(&str, &str); 7] = [
    ("contains", "$contains"),
    ("eq", "$eq"),
    ("lt", "$lt"),
    ("lte", "$lte"),
    ("gt", "$gt"),
    ("gte", "$gte"),
    ("exists", "$exists"),
];

fn store_operator(key: &str) -> Option<&'static str> {
    if let Some((_, op)) = FRIENDLY_OPERATORS.iter().find(|(friendly, _)| *friendly == key) {
        return Some(*op);
    }
    FRIENDLY_OPERATORS.iter().map(|(_, op)| *op).find(|op| *op == key)
}

/// Converts a friendly filter into the store filter vocabulary.
pub fn build_filter(friendly: &Filter) -> Filter {
    let mut filter = Filter::new();
    for (field, value) in friendly {
        match value {
            Value::Null => {}
            Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| store_operator(k).is_some()) => {
                let converted: Map<String, Value> = ops
                    .iter()
                    .filter(|(_, operand)| !operand.is_null())
                    .filter_map(|(key, operand)| store_operator(key).map(|op| (op.to_string(), operand.clone())))
                    .collect();
                if !converted.is_empty() {
                    filter.insert(field.clone(), Value::Object(converted));
                }
            }
            other => {
                filter.insert(field.clone(), other.clone());
            }
        }
    }
    filter
}

/// Reads `{filter, sort, skip, limit}` from a list request body, converting
/// the filter with [`build_filter`].
pub fn list_options(body: &Value) -> ModelResult<FindOptions> {
    let mut options = FindOptions::from_body(body)?;
    options.filter = build_filter(&options.filter);
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Filter {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn converts_operators_and_drops_nulls() {
        let filter = build_filter(&obj(json!({
            "title": {"contains": "dun"},
            "year": {"gte": 1900, "lt": 2000, "eq": null},
            "author": null,
            "status": "in review",
        })));
        assert_eq!(
            Value::Object(filter),
            json!({
                "title": {"$contains": "dun"},
                "year": {"$gte": 1900, "$lt": 2000},
                "status": "in review",
            })
        );
    }

    #[test]
    fn plain_objects_stay_equality() {
        let filter = build_filter(&obj(json!({"payload": {"title": "X"}})));
        assert_eq!(Value::Object(filter), json!({"payload": {"title": "X"}}));
    }

    #[test]
    fn store_operators_pass_through() {
        let filter = build_filter(&obj(json!({"year": {"$gt": 1, "exists": true}})));
        assert_eq!(Value::Object(filter), json!({"year": {"$gt": 1, "$exists": true}}));
    }

    #[test]
    fn list_options_default_page() {
        let options = list_options(&json!({"filter": {"pid": "b1"}})).unwrap();
        assert_eq!(options.skip, 0);
        assert_eq!(options.limit, Some(docflow_model::DEFAULT_PAGE_SIZE));
        assert_eq!(Value::Object(options.filter), json!({"pid": "b1"}));
    }
}
