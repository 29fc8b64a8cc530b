//! Output module
//!
//! Materializes record batches as flat files on local storage.
//!
//! # Overview
//!
//! This module provides:
//! - `Batch` - records keyed by identifier, in stable order
//! - `Batch::from_ndjson` - parse newline-delimited JSON records
//! - `CsvFileWriter` - scoped row writer (plain or gzip)
//! - `write_batch` - flatten, encode and write a whole batch
//! - `read_staged_rows` - decode a staged file back into fields

mod batch;
mod writer;

pub use batch::{record_id, Batch};
pub use writer::{
    read_staged_rows, write_batch, CsvFileWriter, StagedFile, WriteOptions, DEFAULT_FILE_FORMAT,
};

#[cfg(test)]
mod tests;
