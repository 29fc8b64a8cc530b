//! Staged CSV file writer
//!
//! Writes encoded rows to a uniquely named file, optionally gzip-compressed.
//! The file only survives if the writer is closed successfully; dropping a
//! writer (for example when an error propagates mid-batch) removes it.

use super::batch::Batch;
use crate::encode::{decode_rows, record_to_csv_line, TERMINATOR};
use crate::error::{Error, Result};
use crate::schema::Schema;
use async_compression::tokio::bufread::GzipDecoder;
use async_compression::tokio::write::GzipEncoder;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::debug;

/// Default file-format descriptor name
pub const DEFAULT_FILE_FORMAT: &str = "CSV";

/// Options for writing a staged file
#[derive(Debug, Clone)]
pub struct WriteOptions {
    prefix: String,
    suffix: String,
    compression: bool,
    dest_dir: Option<PathBuf>,
    max_level: usize,
    file_format: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            prefix: "batch_".to_string(),
            suffix: "csv".to_string(),
            compression: false,
            dest_dir: None,
            max_level: 0,
            file_format: DEFAULT_FILE_FORMAT.to_string(),
        }
    }
}

impl WriteOptions {
    /// Create options with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the filename prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the filename suffix (extension without the dot)
    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Enable or disable gzip compression
    #[must_use]
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Write into this directory instead of the system temp dir
    #[must_use]
    pub fn with_dest_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dest_dir = Some(dir.into());
        self
    }

    /// Set the maximum object flattening depth
    #[must_use]
    pub fn with_max_level(mut self, level: usize) -> Self {
        self.max_level = level;
        self
    }

    /// Set the file-format descriptor the staged file is loaded with
    #[must_use]
    pub fn with_file_format(mut self, name: impl Into<String>) -> Self {
        self.file_format = name.into();
        self
    }

    /// Get compression enabled
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compression
    }

    /// Get the maximum flattening depth
    #[must_use]
    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Full file suffix including the dot and the gzip extension
    fn file_suffix(&self) -> String {
        if self.compression {
            format!(".{}.gz", self.suffix)
        } else {
            format!(".{}", self.suffix)
        }
    }

    fn target_dir(&self) -> Result<PathBuf> {
        let dir = self.dest_dir.clone().unwrap_or_else(std::env::temp_dir);
        Ok(std::path::absolute(dir)?)
    }
}

/// A completed flat file ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Absolute local path
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// Number of rows written
    pub row_count: usize,
    /// Whether the file is gzip-compressed
    pub compressed: bool,
    /// File-format descriptor name
    pub file_format: String,
}

impl StagedFile {
    /// Base name of the local file
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Delete the local file once it's no longer needed
    pub async fn remove(self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Row writer for one staged file
pub struct CsvFileWriter {
    /// Plain or gzip-compressing sink
    sink: Pin<Box<dyn AsyncWrite + Send>>,
    /// Handle used to sync the file after the sink is shut down
    sync_handle: std::fs::File,
    /// Removes the file on drop until the writer is closed
    path: TempPath,
    rows_written: usize,
    compressed: bool,
    file_format: String,
}

impl CsvFileWriter {
    /// Create a new uniquely named file for writing
    pub async fn create(options: &WriteOptions) -> Result<Self> {
        let dir = options.target_dir()?;
        tokio::fs::create_dir_all(&dir).await.map_err(|e| Error::Output {
            message: format!("Failed to create directory {}: {e}", dir.display()),
        })?;

        let named = tempfile::Builder::new()
            .prefix(&options.prefix)
            .suffix(&options.file_suffix())
            .tempfile_in(&dir)
            .map_err(|e| Error::Output {
                message: format!("Failed to create file in {}: {e}", dir.display()),
            })?;
        let (file, path) = named.into_parts();
        let sync_handle = file.try_clone()?;

        let file = BufWriter::new(tokio::fs::File::from_std(file));
        let sink: Pin<Box<dyn AsyncWrite + Send>> = if options.compression {
            Box::pin(GzipEncoder::new(file))
        } else {
            Box::pin(file)
        };

        Ok(Self {
            sink,
            sync_handle,
            path,
            rows_written: 0,
            compressed: options.compression,
            file_format: options.file_format.clone(),
        })
    }

    /// Path of the file being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one encoded row, appending the terminator
    pub async fn write_row(&mut self, line: &str) -> Result<()> {
        self.sink.write_all(line.as_bytes()).await?;
        let mut terminator = [0u8; 4];
        self.sink
            .write_all(TERMINATOR.encode_utf8(&mut terminator).as_bytes())
            .await?;
        self.rows_written += 1;
        Ok(())
    }

    /// Flatten, encode and write one record
    pub async fn write_record(
        &mut self,
        record: &Value,
        schema: &Schema,
        max_level: usize,
    ) -> Result<()> {
        let line = record_to_csv_line(record, schema, max_level);
        self.write_row(&line).await
    }

    /// Get the number of rows written so far
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flush, finish the gzip stream, sync and keep the file
    pub async fn close(mut self) -> Result<StagedFile> {
        self.sink.shutdown().await?;
        tokio::fs::File::from_std(self.sync_handle).sync_all().await?;

        let size_bytes = tokio::fs::metadata(&self.path).await?.len();
        let path = self.path.keep().map_err(|e| Error::Io(e.error))?;

        debug!(
            path = %path.display(),
            rows = self.rows_written,
            bytes = size_bytes,
            compressed = self.compressed,
            "Staged file written"
        );

        Ok(StagedFile {
            path,
            size_bytes,
            row_count: self.rows_written,
            compressed: self.compressed,
            file_format: self.file_format,
        })
    }
}

/// Write a whole batch to a new staged file.
///
/// Rows follow the batch's identifier order. An empty batch still produces a
/// valid (empty) file. On error no file is left behind.
pub async fn write_batch(
    batch: &Batch,
    schema: &Schema,
    options: &WriteOptions,
) -> Result<StagedFile> {
    let mut writer = CsvFileWriter::create(options).await?;
    for (index, record) in batch.records().enumerate() {
        writer
            .write_record(record, schema, options.max_level)
            .await
            .map_err(|e| e.at_record(index))?;
    }
    writer.close().await
}

/// Read a staged file back into decoded rows, decompressing `.gz` files
pub async fn read_staged_rows(
    path: impl AsRef<Path>,
    columns: usize,
) -> Result<Vec<Vec<Option<String>>>> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::FileNotFound {
                path: path.display().to_string(),
            }
        } else {
            Error::Io(e)
        }
    })?;

    let mut reader: Pin<Box<dyn AsyncRead + Send>> =
        if path.extension().is_some_and(|ext| ext == "gz") {
            Box::pin(GzipDecoder::new(BufReader::new(file)))
        } else {
            Box::pin(file)
        };

    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .await
        .map_err(|e| Error::encoding(format!("Staged file is not valid UTF-8 text: {e}")))?;
    decode_rows(&content, columns)
}
