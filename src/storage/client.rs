//! Storage client interface

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

/// Timestamp component of generated object keys
pub const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S-%6f";

/// Storage backend variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// AWS S3 and S3-compatible stores (R2, MinIO)
    S3,
    /// Azure Blob Storage
    AzureBlob,
    /// Google Cloud Storage
    Gcs,
    /// Local directory
    Local,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::AzureBlob => write!(f, "azure_blob"),
            StorageBackend::Gcs => write!(f, "gcs"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Key of an object in a storage container
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Wrap a key string
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment of the key
    pub fn basename(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Unwrap into the key string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ObjectKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ObjectKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Generates upload keys with strictly increasing microsecond timestamps.
///
/// Two calls within the same microsecond get consecutive timestamps, so keys
/// for the same stream and file never collide within one generator.
#[derive(Debug, Default)]
pub struct KeyGenerator {
    last_micros: AtomicI64,
}

impl KeyGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, never equal to or earlier than a previous one
    pub fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .last_micros
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        let next = now.max(previous + 1);
        DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now)
    }

    /// Build `{prefix}{stream}_{timestamp}_{basename}`
    pub fn next_key(&self, prefix: &str, stream: &str, basename: &str) -> String {
        let timestamp = self.next_timestamp().format(KEY_TIMESTAMP_FORMAT);
        format!("{prefix}{stream}_{timestamp}_{basename}")
    }
}

/// Remote staging storage for flat files.
///
/// Every backend addresses objects by key within one staging container
/// (bucket). Calls complete only once the remote operation has finished; an
/// object is visible either completely or not at all.
#[async_trait]
pub trait StorageClient: Send + Sync + fmt::Debug {
    /// Backend variant
    fn backend(&self) -> StorageBackend;

    /// Staging container (bucket) name
    fn container(&self) -> &str;

    /// Upload a local file under a new unique key and return the key.
    ///
    /// The key is `{key_prefix}{stream}_{YYYYMMDD-HHMMSS-ffffff}_{basename}`.
    async fn upload(&self, local_path: &Path, stream: &str) -> Result<ObjectKey>;

    /// Copy a staged object to another key, possibly in another container.
    ///
    /// `metadata` entries are merged over the source object's metadata.
    async fn copy(
        &self,
        source_key: &ObjectKey,
        destination_container: &str,
        destination_key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete a staged object. Deleting a missing key succeeds.
    async fn delete(&self, stream: &str, key: &ObjectKey) -> Result<()>;
}

/// One object copy between containers of the same service
#[derive(Debug, Clone, Copy)]
pub struct CopyRequest<'a> {
    pub source_container: &'a str,
    pub source_key: &'a str,
    pub destination_container: &'a str,
    pub destination_key: &'a str,
    /// Entries merged over the source object's metadata
    pub metadata: &'a BTreeMap<String, String>,
}

/// Copies objects on the storage service itself, without moving the content
/// through this process.
#[async_trait]
pub trait ServerCopy: Send + Sync + fmt::Debug {
    async fn copy_object(&self, request: &CopyRequest<'_>) -> object_store::Result<()>;
}
