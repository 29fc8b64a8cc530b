//! Record flattening
//!
//! Projects a nested JSON record onto the flat column set of a [`Schema`].
//! Objects nested less than `max_level` deep are merged into `parent__child`
//! columns; deeper objects and all arrays are kept whole as JSON text.
//!
//! The `max_level` passed here must match the one the schema was derived
//! with, otherwise nested values land under names the schema doesn't know.

use crate::schema::{flatten_key, Column, Schema};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Resolved content of one column in a flattened record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    /// The record has no value for the column
    Absent,
    /// The record has an explicit null
    Null,
    /// A scalar value (structured values are already JSON text)
    Value(&'a Value),
}

impl Field<'_> {
    /// Check if the field has representable content
    pub fn is_present(&self) -> bool {
        matches!(self, Field::Value(_))
    }
}

/// Column name → scalar value for a single record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedRecord {
    values: BTreeMap<String, Value>,
}

impl FlattenedRecord {
    /// Resolve a column to absent, null or a value
    pub fn resolve(&self, column: &str) -> Field<'_> {
        match self.values.get(column) {
            None => Field::Absent,
            Some(Value::Null) => Field::Null,
            Some(value) => Field::Value(value),
        }
    }

    /// Raw value of a column, including explicit nulls
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Number of columns with a value or explicit null
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if every column is absent
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over present columns in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Flatten a record against a schema.
///
/// Keys that don't map to a schema column are dropped. A record that isn't a
/// JSON object can't be projected onto columns; it degrades to a record with
/// every column absent.
pub fn flatten_record(record: &Value, schema: &Schema, max_level: usize) -> FlattenedRecord {
    let mut flattened = FlattenedRecord::default();
    match record {
        Value::Object(object) => {
            flatten_into(object, &[], 0, max_level, schema, &mut flattened.values);
        }
        other => {
            warn!(
                kind = value_kind(other),
                "Record is not an object, all columns will be empty"
            );
        }
    }
    flattened
}

fn flatten_into(
    object: &Map<String, Value>,
    parent: &[&str],
    level: usize,
    max_level: usize,
    schema: &Schema,
    out: &mut BTreeMap<String, Value>,
) {
    for (key, value) in object {
        let mut path = parent.to_vec();
        path.push(key.as_str());
        let name = flatten_key(&path);
        let column = schema.column(&name);

        // A column for the whole object takes precedence over its children
        if let (Value::Object(nested), None) = (value, column) {
            if level < max_level {
                flatten_into(nested, &path, level + 1, max_level, schema, out);
            }
            continue;
        }

        if let Some(column) = column {
            out.insert(name, scalar_value(value, column));
        }
    }
}

/// Objects, arrays, and anything in a JSON-text column become JSON text
fn scalar_value(value: &Value, column: &Column) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        _ if column.json_text => Value::String(value.to_string()),
        _ => value.clone(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
