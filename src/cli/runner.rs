//! CLI runner - executes commands

use crate::archive::{archive_staged_file, ArchiveMetadata};
use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::StagingConfig;
use crate::error::{Error, Result, ResultExt};
use crate::output::{write_batch, Batch, StagedFile, WriteOptions};
use crate::schema::Schema;
use crate::sql::{build_copy_statement, build_merge_statement, build_primary_key_condition};
use crate::storage::{self, ObjectKey};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Write {
                schema,
                records,
                compress,
                dest_dir,
                max_level,
                merge_key,
            } => {
                let mut options = WriteOptions::new()
                    .with_compression(*compress)
                    .with_max_level(*max_level);
                if let Some(dir) = dest_dir {
                    options = options.with_dest_dir(dir);
                }
                self.write(schema, records, merge_key, &options).await
            }
            Commands::Stage {
                schema,
                records,
                stream,
                table,
                merge_key,
            } => self.stage(schema, records, stream, table, merge_key).await,
            Commands::Archive {
                stream,
                key,
                tap,
                source_schema,
                table,
            } => self.archive(stream, key, tap, source_schema, table).await,
            Commands::Sql {
                schema,
                table,
                key,
                stage,
                file_format,
                max_level,
                merge_key,
            } => {
                let schema = load_schema(schema, *max_level)?;
                let sql = load_statement(&schema, table, stage, key, file_format, merge_key);
                self.output_message(&json!({"type": "SQL", "sql": sql}));
                Ok(())
            }
            Commands::Validate => {
                let config = self.load_config()?;
                self.output_message(&json!({
                    "type": "CONFIG",
                    "status": "VALID",
                    "stage": config.stage,
                    "backend": config.storage.backend().to_string(),
                    "container": config.storage.container(),
                }));
                Ok(())
            }
        }
    }

    /// Load staging configuration
    fn load_config(&self) -> Result<StagingConfig> {
        let path = self
            .cli
            .config
            .as_ref()
            .ok_or_else(|| Error::config("Configuration file not specified (use -C flag)"))?;
        StagingConfig::from_file(path)
    }

    async fn write(
        &self,
        schema_path: &Path,
        records_path: &Path,
        merge_keys: &[String],
        options: &WriteOptions,
    ) -> Result<()> {
        let schema = load_schema(schema_path, options.max_level())?;
        let batch = load_batch(records_path, merge_keys)?;
        let staged = write_batch(&batch, &schema, options).await?;
        self.output_message(&staged_file_message(&staged));
        Ok(())
    }

    async fn stage(
        &self,
        schema_path: &Path,
        records_path: &Path,
        stream: &str,
        table: &str,
        merge_keys: &[String],
    ) -> Result<()> {
        let start = Instant::now();
        let config = self.load_config()?;
        let schema = load_schema(schema_path, config.data_flattening_max_level)?;
        let batch = load_batch(records_path, merge_keys)?;
        let client = storage::from_config(&config.storage)?;

        let staged = write_batch(&batch, &schema, &config.write_options()).await?;
        let rows = staged.row_count;
        let file_format = staged.file_format.clone();

        // The local file is removed whether or not the upload succeeded
        let uploaded = client.upload(&staged.path, stream).await;
        let local_file = staged.path.display().to_string();
        staged
            .remove()
            .await
            .with_context(|| format!("Failed to remove staged file {local_file}"))?;
        let key = uploaded?;

        let sql = load_statement(
            &schema,
            table,
            &config.stage,
            key.as_str(),
            &file_format,
            merge_keys,
        );

        info!(
            stream = stream,
            key = %key,
            rows = rows,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch staged"
        );
        self.output_message(&json!({
            "type": "STAGED",
            "stream": stream,
            "key": key,
            "rows": rows,
            "sql": sql,
        }));
        Ok(())
    }

    async fn archive(
        &self,
        stream: &str,
        key: &str,
        tap: &str,
        source_schema: &str,
        table: &str,
    ) -> Result<()> {
        let config = self.load_config()?;
        let archive = config
            .archive
            .as_ref()
            .ok_or_else(|| Error::missing_field("archive"))?;
        let client = storage::from_config(&config.storage)?;

        let metadata = ArchiveMetadata::new(tap, source_schema, table);
        let archived = archive_staged_file(
            client.as_ref(),
            &ObjectKey::new(key),
            stream,
            archive,
            &metadata,
        )
        .await?;

        self.output_message(&json!({
            "type": "ARCHIVED",
            "stream": stream,
            "key": key,
            "archive_container": archive.container,
            "archive_key": archived,
        }));
        Ok(())
    }

    /// Output a message
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Read a JSON Schema file and derive its columns
pub fn load_schema(path: &Path, max_level: usize) -> Result<Schema> {
    let content = read_file(path)?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| Error::schema(format!("Failed to parse {}: {e}", path.display())))?;
    Schema::from_json_value(&value, max_level)
}

/// Read an NDJSON records file into a batch
pub fn load_batch(path: &Path, merge_keys: &[String]) -> Result<Batch> {
    let content = read_file(path)?;
    Batch::from_ndjson(&content, merge_keys)
}

/// `MERGE` when key columns are given, `COPY` otherwise
pub fn load_statement(
    schema: &Schema,
    table: &str,
    stage: &str,
    key: &str,
    file_format: &str,
    merge_keys: &[String],
) -> String {
    if merge_keys.is_empty() {
        build_copy_statement(table, stage, key, file_format, schema.columns())
    } else {
        build_merge_statement(
            table,
            stage,
            key,
            file_format,
            schema.columns(),
            &build_primary_key_condition(merge_keys),
        )
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })
}

fn staged_file_message(staged: &StagedFile) -> Value {
    json!({
        "type": "STAGED_FILE",
        "path": staged.path.display().to_string(),
        "rows": staged.row_count,
        "bytes": staged.size_bytes,
        "compressed": staged.compressed,
        "file_format": staged.file_format,
    })
}
