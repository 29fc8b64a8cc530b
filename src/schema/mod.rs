//! Schema module
//!
//! Turns a stream's JSON Schema document into the ordered column set every
//! staged row is encoded against.
//!
//! # Features
//!
//! - **Flattened Columns**: Nested object properties become `parent__child` columns up to a maximum depth
//! - **Column Types**: Each column carries its warehouse type and merge transform
//! - **Stable Order**: Columns are sorted by flattened name; order never changes within a batch
//! - **Validation**: Empty and duplicate column names are rejected at construction

mod columns;
mod types;

pub use columns::{flatten_key, safe_column_name, Column, ColumnType, Schema, COLUMN_SEPARATOR};
pub use types::{JsonSchema, JsonType, JsonTypeOrArray, SchemaProperty};

#[cfg(test)]
mod tests;
