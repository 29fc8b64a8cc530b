//! CLI module
//!
//! Command-line interface for staging record batches.
//!
//! # Commands
//!
//! - `write` - Write NDJSON records to a local staged file
//! - `stage` - Write, upload and print the load statement
//! - `archive` - Archive a loaded object and delete it from staging
//! - `sql` - Print load statements
//! - `validate` - Validate the configuration file

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::{load_batch, load_schema, load_statement, Runner};
