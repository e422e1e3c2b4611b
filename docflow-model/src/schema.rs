use crate::record::ID_FIELD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Describes a schema's declared fields.
///
/// The engine does not validate records against the field list; it only uses
/// it to decide which filter keys are recognized (see
/// [`SchemaDefinition::recognizes`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// A declared field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: FieldType,
}

fn default_field_type() -> FieldType {
    FieldType::Json
}

impl FieldDef {
    fn simple(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }

    /// Shorthand for a text field.
    pub fn text(name: &str) -> Self {
        Self::simple(name, FieldType::Text)
    }

    /// Shorthand for a numeric field.
    pub fn number(name: &str) -> Self {
        Self::simple(name, FieldType::Number)
    }

    /// Shorthand for a boolean field.
    pub fn bool(name: &str) -> Self {
        Self::simple(name, FieldType::Bool)
    }

    /// Shorthand for an arbitrary JSON field.
    pub fn json(name: &str) -> Self {
        Self::simple(name, FieldType::Json)
    }
}

/// The data type of a declared field. Informational; records are not
/// validated against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Bool,
    Json,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Whether `key` names a field of this schema. The identifier field is
    /// always recognized; dotted paths are recognized by their first segment.
    pub fn recognizes(&self, key: &str) -> bool {
        let head = key.split('.').next().unwrap_or(key);
        head == ID_FIELD || self.fields.iter().any(|f| f.name == head)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// The set of schemas known to a deployment.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    schemas: HashMap<String, SchemaDefinition>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a schema, replacing any previous definition with the same name.
    pub fn insert(&mut self, definition: SchemaDefinition) {
        self.schemas.insert(definition.name.clone(), definition);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, definition: SchemaDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&SchemaDefinition> {
        self.schemas.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Schema names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl FromIterator<SchemaDefinition> for SchemaCatalog {
    fn from_iter<I: IntoIterator<Item = SchemaDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for definition in iter {
            catalog.insert(definition);
        }
        catalog
    }
}
