//! Staging configuration
//!
//! Loaded from YAML or JSON. Credentials are not part of the file; storage
//! builders read them from the standard environment variables.

use crate::archive::ArchiveConfig;
use crate::error::{Error, Result};
use crate::output::{WriteOptions, DEFAULT_FILE_FORMAT};
use crate::storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete staging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Warehouse stage the uploaded keys are referenced through
    pub stage: String,

    /// Warehouse file-format descriptor name
    #[serde(default = "default_file_format")]
    pub file_format: String,

    /// Maximum object nesting depth flattened into columns
    #[serde(default)]
    pub data_flattening_max_level: usize,

    /// Gzip staged files
    #[serde(default)]
    pub compression: bool,

    /// Directory for staged files (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Remote staging storage
    pub storage: StorageConfig,

    /// Archive location for loaded files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveConfig>,
}

fn default_file_format() -> String {
    DEFAULT_FILE_FORMAT.to_string()
}

impl StagingConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.stage.trim().is_empty() {
            return Err(Error::missing_field("stage"));
        }
        if self.file_format.trim().is_empty() {
            return Err(Error::missing_field("file_format"));
        }
        self.storage.validate()?;
        if let Some(archive) = &self.archive {
            archive.validate()?;
        }
        Ok(())
    }

    /// Batch writer options for this configuration
    pub fn write_options(&self) -> WriteOptions {
        let options = WriteOptions::new()
            .with_compression(self.compression)
            .with_max_level(self.data_flattening_max_level)
            .with_file_format(&self.file_format);
        match &self.temp_dir {
            Some(dir) => options.with_dest_dir(dir),
            None => options,
        }
    }
}
