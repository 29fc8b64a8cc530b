//! Row encoding module
//!
//! Converts flattened records into lines of the warehouse's flat-file
//! dialect, and parses such lines back.
//!
//! # Dialect
//!
//! - Comma-delimited, one `\n`-terminated row per record, UTF-8
//! - Present values double-quoted; `\` and `"` escaped with a backslash
//! - Absent columns and nulls are empty fields
//! - `0`, `false` and `""` are present values and always quoted

mod row;

pub use row::{
    decode_row, decode_rows, encode_field, encode_row, record_to_csv_line, DELIMITER, ESCAPE,
    QUOTE, TERMINATOR,
};
