//! Ordered column schema
//!
//! A [`Schema`] fixes the column order of every encoded row and of the SQL
//! column lists. It is valid by construction: every way of building one
//! (`new`, `from_names`, `from_json_schema`, deserialization) rejects empty
//! and duplicate column names.

use super::types::{JsonSchema, JsonType, SchemaProperty};
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

/// Separator between path segments of a flattened column name
pub const COLUMN_SEPARATOR: &str = "__";

/// Flattened names at or above this length get their segments shortened
const MAX_COLUMN_NAME_LEN: usize = 255;

static LOWERCASE: LazyLock<Regex> = LazyLock::new(|| Regex::new("[a-z]").unwrap());

/// Warehouse column type derived from a JSON Schema property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Variant,
    TimestampNtz,
    Time,
    Binary,
    Float,
    Number,
    Boolean,
    #[default]
    Text,
}

impl ColumnType {
    /// Map a JSON Schema property onto a warehouse type
    pub fn from_property(property: &SchemaProperty) -> Self {
        let types = property.resolved_types();
        let has = |t: JsonType| types.contains(&t);

        if has(JsonType::Object) || has(JsonType::Array) {
            return ColumnType::Variant;
        }
        match property.resolved_format() {
            Some("date-time") => return ColumnType::TimestampNtz,
            Some("time") => return ColumnType::Time,
            Some("binary") => return ColumnType::Binary,
            _ => {}
        }
        if has(JsonType::Number) {
            ColumnType::Float
        } else if has(JsonType::Integer) && has(JsonType::String) {
            ColumnType::Text
        } else if has(JsonType::Integer) {
            ColumnType::Number
        } else if has(JsonType::Boolean) {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    /// SQL type name
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Variant => "VARIANT",
            ColumnType::TimestampNtz => "TIMESTAMP_NTZ",
            ColumnType::Time => "TIME",
            ColumnType::Binary => "BINARY",
            ColumnType::Float => "FLOAT",
            ColumnType::Number => "NUMBER",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Text => "TEXT",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A single column of a [`Schema`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Flattened source name (path segments joined by `__`)
    pub name: String,

    /// Warehouse type
    #[serde(default)]
    pub column_type: ColumnType,

    /// SQL function applied to the staged field when merging
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,

    /// Scalars in this column are written as JSON text
    #[serde(default)]
    pub json_text: bool,
}

impl Column {
    /// Create a text column with no transform
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Text,
            transform: None,
            json_text: false,
        }
    }

    /// Build a column from a JSON Schema property
    pub fn from_property(name: impl Into<String>, property: &SchemaProperty) -> Self {
        let column_type = ColumnType::from_property(property);
        let types = property.resolved_types();
        Self {
            name: name.into(),
            column_type,
            transform: (column_type == ColumnType::Variant).then(|| "parse_json".to_string()),
            json_text: types == [JsonType::Object, JsonType::Array, JsonType::Null],
        }
    }

    /// Set the warehouse type
    #[must_use]
    pub fn with_type(mut self, column_type: ColumnType) -> Self {
        self.column_type = column_type;
        self
    }

    /// Set the merge transform expression
    #[must_use]
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    /// Write every value of this column as JSON text
    #[must_use]
    pub fn as_json_text(mut self) -> Self {
        self.json_text = true;
        self
    }

    /// Quoted, upper-cased SQL identifier
    pub fn sql_name(&self) -> String {
        safe_column_name(&self.name)
    }
}

/// Quote and upper-case a column name for use in SQL
pub fn safe_column_name(name: &str) -> String {
    format!("\"{}\"", name.to_uppercase())
}

/// Join path segments into a flattened column name.
///
/// While the joined name is too long, segments are shortened left to right:
/// a segment becomes the upper-case initials of its camel-cased form (when
/// there are at least two) or else its first three characters, lower-cased.
pub fn flatten_key(segments: &[&str]) -> String {
    let mut parts: Vec<String> = segments.iter().map(|s| (*s).to_string()).collect();
    let mut reducer_index = 0;

    while parts.join(COLUMN_SEPARATOR).len() >= MAX_COLUMN_NAME_LEN && reducer_index < parts.len()
    {
        let segment = &parts[reducer_index];
        let initials = LOWERCASE.replace_all(&camelize(segment), "").into_owned();
        let reduced = if initials.chars().count() > 1 {
            initials
        } else {
            segment.chars().take(3).collect()
        };
        parts[reducer_index] = reduced.to_lowercase();
        reducer_index += 1;
    }

    parts.join(COLUMN_SEPARATOR)
}

/// `snake_case` → `SnakeCase`
fn camelize(segment: &str) -> String {
    segment
        .split('_')
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let mut chars = piece.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Ordered set of columns shared by every row of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Column>", into = "Vec<Column>")]
pub struct Schema {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Schema {
    /// Create a schema from columns in the given order
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(Error::schema(format!(
                    "Column at position {position} has an empty name"
                )));
            }
            if index.insert(column.name.clone(), position).is_some() {
                return Err(Error::schema(format!(
                    "Duplicate column name produced in schema: {}",
                    column.name
                )));
            }
        }
        Ok(Self { columns, index })
    }

    /// Create a schema of plain text columns
    pub fn from_names(names: &[&str]) -> Result<Self> {
        Self::new(names.iter().map(|name| Column::new(*name)).collect())
    }

    /// Derive the flattened column set of a JSON Schema document.
    ///
    /// Objects with declared properties are descended into while the nesting
    /// level is below `max_level`; everything else becomes one column.
    /// Columns are sorted by flattened name.
    pub fn from_json_schema(schema: &JsonSchema, max_level: usize) -> Result<Self> {
        if let Some(json_type) = &schema.json_type {
            if !json_type.contains(JsonType::Object) {
                return Err(Error::schema(format!(
                    "Stream schema must describe an object, got {:?}",
                    json_type.types()
                )));
            }
        }

        let mut columns = Vec::new();
        collect_columns(&schema.properties, &[], 0, max_level, &mut columns);
        columns.sort_by(|a, b| a.name.cmp(&b.name));
        Self::new(columns)
    }

    /// Parse a JSON Schema value and derive its columns
    pub fn from_json_value(value: &serde_json::Value, max_level: usize) -> Result<Self> {
        let schema: JsonSchema = serde_json::from_value(value.clone())
            .map_err(|e| Error::schema(format!("Malformed JSON schema: {e}")))?;
        Self::from_json_schema(&schema, max_level)
    }

    /// Columns in order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Look up a column by flattened name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    /// Check if a column exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if the schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl TryFrom<Vec<Column>> for Schema {
    type Error = Error;

    fn try_from(columns: Vec<Column>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<Schema> for Vec<Column> {
    fn from(schema: Schema) -> Self {
        schema.columns
    }
}

fn collect_columns(
    properties: &BTreeMap<String, SchemaProperty>,
    parent: &[&str],
    level: usize,
    max_level: usize,
    out: &mut Vec<Column>,
) {
    for (key, property) in properties {
        let mut path = parent.to_vec();
        path.push(key.as_str());

        if property.has_nested_properties() && level < max_level {
            if let Some(nested) = &property.properties {
                collect_columns(nested, &path, level + 1, max_level, out);
            }
        } else if property.resolved_types().is_empty() {
            tracing::debug!(column = %flatten_key(&path), "Skipping property without a declared type");
        } else {
            out.push(Column::from_property(flatten_key(&path), property));
        }
    }
}
