//! Record batches

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Records sharing one schema, keyed by a per-record identifier.
///
/// Iteration follows identifier order, so a retried batch produces the same
/// file. Inserting an existing identifier replaces the earlier record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    records: BTreeMap<String, Value>,
}

impl Batch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, returning the one it replaced
    pub fn insert(&mut self, id: impl Into<String>, record: Value) -> Option<Value> {
        self.records.insert(id.into(), record)
    }

    /// Get a record by identifier
    pub fn get(&self, id: &str) -> Option<&Value> {
        self.records.get(id)
    }

    /// Records in identifier order
    pub fn records(&self) -> impl Iterator<Item = &Value> {
        self.records.values()
    }

    /// Identifier/record pairs in identifier order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the batch is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Parse newline-delimited JSON records.
    ///
    /// Without key columns a record is identified by its line number, so file
    /// order is kept. With key columns the identifier comes from [`record_id`]
    /// and a later record replaces an earlier one with the same key.
    /// Blank lines are skipped.
    pub fn from_ndjson<S: AsRef<str>>(content: &str, key_columns: &[S]) -> Result<Self> {
        let mut batch = Batch::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line).map_err(|e| {
                Error::encoding(format!("Invalid JSON on line {}: {e}", index + 1)).at_record(index)
            })?;

            let id = if key_columns.is_empty() {
                format!("{:012}", index + 1)
            } else {
                record_id(&record, key_columns).map_err(|e| e.at_record(index))?
            };
            batch.insert(id, record);
        }
        Ok(batch)
    }
}

/// Identifier of a record from its key column values.
///
/// A single key column gives its value as text. Several key columns give the
/// JSON array of their values, so `("a-b", "c")` and `("a", "b-c")` stay
/// distinct.
pub fn record_id<S: AsRef<str>>(record: &Value, key_columns: &[S]) -> Result<String> {
    let values = key_columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            match record.get(column) {
                Some(Value::Null) | None => Err(Error::encoding(format!(
                    "Record has no value for key column '{column}'"
                ))),
                Some(value) => Ok(value),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    match values.as_slice() {
        [Value::String(s)] => Ok(s.clone()),
        [value] => Ok(value.to_string()),
        _ => Ok(Value::Array(values.into_iter().cloned().collect()).to_string()),
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Batch {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut batch = Batch::new();
        for (id, record) in iter {
            batch.insert(id, record);
        }
        batch
    }
}
