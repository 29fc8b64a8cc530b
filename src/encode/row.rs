//! Flat-file row encoding
//!
//! Every present value is wrapped in double quotes with backslashes and
//! quotes backslash-escaped. Absent columns and nulls are empty fields.
//! Control characters inside a quoted field are written as-is; the file
//! format's quoting is what protects them.

use crate::error::{Error, Result};
use crate::flatten::{flatten_record, Field, FlattenedRecord};
use crate::schema::Schema;
use serde_json::Value;
use std::iter::Peekable;
use std::str::Chars;

/// Field delimiter
pub const DELIMITER: char = ',';

/// Field quote character
pub const QUOTE: char = '"';

/// Escape character for quotes and itself
pub const ESCAPE: char = '\\';

/// Row terminator
pub const TERMINATOR: char = '\n';

/// Encode a single field
///
/// An empty string is a present value and encodes as `""`, so the warehouse
/// loads it as an empty string rather than NULL. Writers that treat `""` as
/// missing would emit an empty field here.
pub fn encode_field(field: Field<'_>) -> String {
    match field {
        Field::Absent | Field::Null => String::new(),
        Field::Value(value) => quote(&value_text(value)),
    }
}

/// Encode a flattened record as one row (without terminator).
///
/// The row always has exactly one field per schema column.
pub fn encode_row(flattened: &FlattenedRecord, schema: &Schema) -> String {
    let fields: Vec<String> = schema
        .names()
        .map(|name| encode_field(flattened.resolve(name)))
        .collect();
    fields.join(&DELIMITER.to_string())
}

/// Flatten and encode a record in one step
pub fn record_to_csv_line(record: &Value, schema: &Schema, max_level: usize) -> String {
    encode_row(&flatten_record(record, schema, max_level), schema)
}

/// Text form of a present value
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(QUOTE);
    for c in text.chars() {
        if c == ESCAPE || c == QUOTE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
    out.push(QUOTE);
    out
}

/// Decode one encoded row back into its fields.
///
/// Empty fields decode to `None`, quoted fields to their unescaped text. A
/// trailing terminator is accepted.
pub fn decode_row(line: &str, columns: usize) -> Result<Vec<Option<String>>> {
    let mut chars = line.chars().peekable();
    let fields = parse_row(&mut chars, columns)?;
    if let Some(c) = chars.next() {
        return Err(Error::encoding(format!(
            "Unexpected '{}' after end of row",
            c.escape_default()
        )));
    }
    Ok(fields)
}

/// Decode a whole file body; errors carry the index of the offending row
pub fn decode_rows(content: &str, columns: usize) -> Result<Vec<Vec<Option<String>>>> {
    let mut chars = content.chars().peekable();
    let mut rows = Vec::new();
    while chars.peek().is_some() {
        let row = parse_row(&mut chars, columns).map_err(|e| e.at_record(rows.len()))?;
        rows.push(row);
    }
    Ok(rows)
}

fn parse_row(chars: &mut Peekable<Chars<'_>>, columns: usize) -> Result<Vec<Option<String>>> {
    let mut fields = Vec::with_capacity(columns);
    loop {
        let field = match chars.peek() {
            Some(&QUOTE) => {
                chars.next();
                Some(parse_quoted(chars)?)
            }
            Some(&DELIMITER | &TERMINATOR) | None => None,
            Some(&other) => {
                return Err(Error::encoding(format!(
                    "Unquoted content '{}' in field {}",
                    other.escape_default(),
                    fields.len() + 1
                )));
            }
        };
        fields.push(field);

        match chars.next() {
            None | Some(TERMINATOR) => break,
            Some(DELIMITER) => {}
            Some(other) => {
                return Err(Error::encoding(format!(
                    "Expected delimiter after field {}, found '{}'",
                    fields.len(),
                    other.escape_default()
                )));
            }
        }
    }

    // A zero-column row is an empty line
    if columns == 0 && fields == [None] {
        fields.clear();
    }
    if fields.len() != columns {
        return Err(Error::encoding(format!(
            "Expected {columns} fields, found {}",
            fields.len()
        )));
    }
    Ok(fields)
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    let mut text = String::new();
    loop {
        match chars.next() {
            Some(QUOTE) => return Ok(text),
            Some(ESCAPE) => match chars.next() {
                Some(c @ (ESCAPE | QUOTE)) => text.push(c),
                Some(c) => {
                    return Err(Error::encoding(format!(
                        "Invalid escape sequence '\\{}'",
                        c.escape_default()
                    )));
                }
                None => return Err(Error::encoding("Dangling escape at end of input")),
            },
            Some(c) => text.push(c),
            None => return Err(Error::encoding("Unterminated quoted field")),
        }
    }
}
