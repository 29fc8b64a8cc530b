//! Archiving of loaded staged files
//!
//! After a successful load the staged object is copied to an archive
//! container under `{prefix}{tap}/{table}/{basename}` with descriptive
//! metadata, then removed from staging.

use crate::error::{Error, Result};
use crate::storage::{ObjectKey, StorageClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Default archive key prefix
pub const DEFAULT_ARCHIVE_PREFIX: &str = "archive/";

/// Where loaded files are archived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive container (bucket)
    pub container: String,

    /// Prepended verbatim to archive keys
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_prefix() -> String {
    DEFAULT_ARCHIVE_PREFIX.to_string()
}

impl ArchiveConfig {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            prefix: default_prefix(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.container.trim().is_empty() {
            return Err(Error::missing_field("archive.container"));
        }
        Ok(())
    }
}

/// Archive location of a staged object: `{prefix}{tap}/{table}/{basename}`
pub fn archive_key(prefix: &str, tap: &str, table: &str, staged_key: &ObjectKey) -> String {
    format!("{prefix}{tap}/{table}/{}", staged_key.basename())
}

/// Metadata attached to archived objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMetadata {
    tap: String,
    schema: String,
    table: String,
    archived_by: String,
    incremental_key: Option<IncrementalRange>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IncrementalRange {
    column: String,
    min: String,
    max: String,
}

impl ArchiveMetadata {
    /// Metadata for a table loaded from a tap
    pub fn new(tap: impl Into<String>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            tap: tap.into(),
            schema: schema.into(),
            table: table.into(),
            archived_by: env!("CARGO_PKG_NAME").to_string(),
            incremental_key: None,
        }
    }

    /// Override the `archived-by` value
    #[must_use]
    pub fn with_archived_by(mut self, archived_by: impl Into<String>) -> Self {
        self.archived_by = archived_by.into();
        self
    }

    /// Record the incremental key column and the value range in the file
    #[must_use]
    pub fn with_incremental_key(
        mut self,
        column: impl Into<String>,
        min: impl Into<String>,
        max: impl Into<String>,
    ) -> Self {
        self.incremental_key = Some(IncrementalRange {
            column: column.into(),
            min: min.into(),
            max: max.into(),
        });
        self
    }

    pub fn tap(&self) -> &str {
        &self.tap
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Metadata entries as stored on the archived object
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::from([
            ("tap".to_string(), self.tap.clone()),
            ("schema".to_string(), self.schema.clone()),
            ("table".to_string(), self.table.clone()),
            ("archived-by".to_string(), self.archived_by.clone()),
        ]);
        if let Some(range) = &self.incremental_key {
            map.insert("incremental-key".to_string(), range.column.clone());
            map.insert("incremental-key-min".to_string(), range.min.clone());
            map.insert("incremental-key-max".to_string(), range.max.clone());
        }
        map
    }
}

/// Copy a loaded staged object to the archive, then delete it from staging.
///
/// Returns the archive key. If the copy fails the staged object is left in
/// place.
pub async fn archive_staged_file(
    client: &dyn StorageClient,
    key: &ObjectKey,
    stream: &str,
    config: &ArchiveConfig,
    metadata: &ArchiveMetadata,
) -> Result<ObjectKey> {
    let destination = archive_key(&config.prefix, metadata.tap(), metadata.table(), key);

    info!(
        stream = stream,
        key = %key,
        archive_container = %config.container,
        archive_key = %destination,
        "Archiving staged file"
    );

    client
        .copy(key, &config.container, &destination, &metadata.to_map())
        .await?;
    client.delete(stream, key).await?;

    Ok(ObjectKey::new(destination))
}
