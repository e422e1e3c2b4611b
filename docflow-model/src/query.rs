use crate::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document filter in the store's vocabulary.
///
/// Plain values match by equality; operator objects (`{"$gt": 3}`) are
/// interpreted by the persistence adapter.
pub type Filter = Map<String, Value>;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Accepts `asc`/`ascending`/`1` and `desc`/`descending`/`-1`.
    pub fn parse(value: &Value) -> ModelResult<Self> {
        match value {
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Ok(SortOrder::Asc),
                "desc" | "descending" => Ok(SortOrder::Desc),
                _ => Err(ModelError::InvalidSort(s.clone())),
            },
            Value::Number(n) if n.as_i64() == Some(1) => Ok(SortOrder::Asc),
            Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortOrder::Desc),
            other => Err(ModelError::InvalidSort(other.to_string())),
        }
    }
}

/// One sort key; earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Pagination, ordering and filtering for a find call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub skip: usize,
    /// `None` means no limit.
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub filter: Filter,
}

/// Page size used when a request body does not name one.
pub const DEFAULT_PAGE_SIZE: usize = 10;

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reads `{filter, sort, skip, limit}` from a request body.
    ///
    /// `skip` defaults to 0 and `limit` to [`DEFAULT_PAGE_SIZE`]. `sort` is an
    /// object of `field → order`; a missing or null body yields the defaults.
    pub fn from_body(body: &Value) -> ModelResult<Self> {
        let empty = Map::new();
        let body = match body {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(ModelError::NotAnObject(crate::record::type_name(other))),
        };

        let filter = match body.get("filter") {
            None | Some(Value::Null) => Filter::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => return Err(ModelError::NotAnObject(crate::record::type_name(other))),
        };

        let mut sort = Vec::new();
        match body.get("sort") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (field, order) in map {
                    sort.push(SortKey {
                        field: field.clone(),
                        order: SortOrder::parse(order)?,
                    });
                }
            }
            Some(other) => return Err(ModelError::InvalidSort(other.to_string())),
        }

        Ok(Self {
            skip: read_count(body, "skip")?.unwrap_or(0),
            limit: Some(read_count(body, "limit")?.unwrap_or(DEFAULT_PAGE_SIZE)),
            sort,
            filter,
        })
    }
}

fn read_count(body: &Map<String, Value>, key: &str) -> ModelResult<Option<usize>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| ModelError::InvalidCount {
                field: key.to_string(),
                value: value.to_string(),
            }),
    }
}
