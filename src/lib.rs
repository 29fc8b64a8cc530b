// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Solidafy Stage
//!
//! Stages batches of JSON records as flat files in object storage and builds
//! the warehouse `COPY INTO` / `MERGE INTO` statements that load them.
//!
//! ## Features
//!
//! - **Flattening**: Nested objects become `parent__child` columns up to a configurable depth
//! - **SQL-safe Rows**: Quoted, backslash-escaped CSV rows with a fixed field count
//! - **Staged Files**: Plain or gzip files that only survive a successful write
//! - **Pluggable Storage**: S3 (and R2/MinIO), Azure Blob, GCS and local directories
//! - **Archiving**: Copy loaded files to an archive bucket with descriptive metadata
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use solidafy_stage::{output, schema::Schema, sql, storage, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let schema = Schema::from_json_value(&stream_schema, 0)?;
//!     let batch = output::Batch::from_ndjson(&records, &["id"])?;
//!
//!     // Write the batch to a local staged file
//!     let staged = output::write_batch(&batch, &schema, &output::WriteOptions::new()).await?;
//!
//!     // Upload it and build the load statement
//!     let client = storage::from_url("s3://my-stage/loads/")?;
//!     let key = client.upload(&staged.path, "public-users").await?;
//!     let copy = sql::build_copy_statement("USERS", "MY_STAGE", key.as_str(), "CSV", schema.columns());
//!
//!     staged.remove().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! records ──► flatten ──► encode ──► output (staged file)
//!                                        │
//!                                        ▼
//!                      storage.upload ──► key ──► sql (COPY / MERGE)
//!                                        │
//!                                        ▼
//!                      archive: storage.copy ──► storage.delete
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Stream schemas and column sets
pub mod schema;

/// Record flattening
pub mod flatten;

/// Flat-file row encoding
pub mod encode;

/// Batches and staged file writing
pub mod output;

/// Remote staging storage backends
pub mod storage;

/// COPY / MERGE statement builders
pub mod sql;

/// Archiving of loaded files
pub mod archive;

/// Staging configuration
pub mod config;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};

// Re-export commonly used types
pub use config::StagingConfig;
pub use output::{write_batch, Batch, StagedFile, WriteOptions};
pub use schema::Schema;
pub use storage::{ObjectKey, StorageClient};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
