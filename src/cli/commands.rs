//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stage record batches in object storage and build warehouse load SQL
#[derive(Parser, Debug)]
#[command(name = "solidafy-stage")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Staging configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write NDJSON records to a local staged file
    Write {
        /// Stream JSON Schema file
        #[arg(long)]
        schema: PathBuf,

        /// NDJSON records file
        #[arg(long)]
        records: PathBuf,

        /// Gzip the staged file
        #[arg(long)]
        compress: bool,

        /// Directory for the staged file (system temp dir if unset)
        #[arg(long)]
        dest_dir: Option<PathBuf>,

        /// Maximum object nesting depth flattened into columns
        #[arg(long, default_value = "0")]
        max_level: usize,

        /// Key columns identifying a record (repeatable); later duplicates win
        #[arg(long)]
        merge_key: Vec<String>,
    },

    /// Write, upload and print the load statement (requires --config)
    Stage {
        /// Stream JSON Schema file
        #[arg(long)]
        schema: PathBuf,

        /// NDJSON records file
        #[arg(long)]
        records: PathBuf,

        /// Stream name used in the object key
        #[arg(long)]
        stream: String,

        /// Target table
        #[arg(long)]
        table: String,

        /// Primary key columns; builds a MERGE instead of a COPY
        #[arg(long)]
        merge_key: Vec<String>,
    },

    /// Archive a loaded staged object and delete it from staging (requires --config)
    Archive {
        /// Stream name
        #[arg(long)]
        stream: String,

        /// Staged object key
        #[arg(long)]
        key: String,

        /// Tap (source) name
        #[arg(long)]
        tap: String,

        /// Source schema name
        #[arg(long, default_value = "public")]
        source_schema: String,

        /// Table name
        #[arg(long)]
        table: String,
    },

    /// Print load statements without any I/O besides reading the schema
    Sql {
        /// Stream JSON Schema file
        #[arg(long)]
        schema: PathBuf,

        /// Target table
        #[arg(long)]
        table: String,

        /// Staged object key
        #[arg(long)]
        key: String,

        /// Warehouse stage name
        #[arg(long)]
        stage: String,

        /// File-format descriptor name
        #[arg(long, default_value = "CSV")]
        file_format: String,

        /// Maximum object nesting depth flattened into columns
        #[arg(long, default_value = "0")]
        max_level: usize,

        /// Primary key columns; builds a MERGE instead of a COPY
        #[arg(long)]
        merge_key: Vec<String>,
    },

    /// Validate the configuration file
    Validate,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Indented JSON
    Pretty,
}
