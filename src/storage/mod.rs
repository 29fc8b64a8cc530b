//! Storage module
//!
//! Uploads staged files to a remote stage, copies them to archive locations
//! and deletes them once loaded.
//!
//! # Backends
//!
//! - **S3** (and S3-compatible stores such as R2 and MinIO)
//! - **Azure Blob**
//! - **GCS**
//! - **Local** directory
//!
//! All backends share one engine over [`object_store`], so key generation,
//! multipart uploads and metadata handling behave the same everywhere.
//!
//! # Example
//!
//! ```ignore
//! let client = storage::from_url("s3://my-stage/loads/")?;
//! let key = client.upload(&staged.path, "public-users").await?;
//! // loads/public-users_20240501-103000-123456_batch_x1y2.csv
//! ```

mod azure;
mod client;
mod gcs;
mod local;
mod rest;
mod s3;
mod store;

pub use azure::{AzureBlobConfig, AzureBlobStorageClient};
pub use client::{
    CopyRequest, KeyGenerator, ObjectKey, ServerCopy, StorageBackend, StorageClient,
    KEY_TIMESTAMP_FORMAT,
};
pub use gcs::{GcsConfig, GcsStorageClient};
pub use local::{LocalConfig, LocalStorageClient};
pub use s3::{S3Config, S3StorageClient};
pub use store::{StagingOptions, DEFAULT_MULTIPART_THRESHOLD};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Storage settings, tagged by `backend`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// AWS S3 or S3-compatible bucket
    S3(S3Config),
    /// Azure Blob container
    AzureBlob(AzureBlobConfig),
    /// GCS bucket
    Gcs(GcsConfig),
    /// Local directory
    Local(LocalConfig),
}

impl StorageConfig {
    /// Backend variant
    pub fn backend(&self) -> StorageBackend {
        match self {
            StorageConfig::S3(_) => StorageBackend::S3,
            StorageConfig::AzureBlob(_) => StorageBackend::AzureBlob,
            StorageConfig::Gcs(_) => StorageBackend::Gcs,
            StorageConfig::Local(_) => StorageBackend::Local,
        }
    }

    /// Staging container (bucket) name
    pub fn container(&self) -> &str {
        match self {
            StorageConfig::S3(c) => &c.bucket,
            StorageConfig::AzureBlob(c) => &c.container,
            StorageConfig::Gcs(c) => &c.bucket,
            StorageConfig::Local(c) => &c.container,
        }
    }

    /// Options shared by all backends
    pub fn options(&self) -> &StagingOptions {
        match self {
            StorageConfig::S3(c) => &c.options,
            StorageConfig::AzureBlob(c) => &c.options,
            StorageConfig::Gcs(c) => &c.options,
            StorageConfig::Local(c) => &c.options,
        }
    }

    /// Check required fields
    pub fn validate(&self) -> Result<()> {
        if self.container().trim().is_empty() {
            let field = match self {
                StorageConfig::S3(_) | StorageConfig::Gcs(_) => "storage.bucket",
                StorageConfig::AzureBlob(_) | StorageConfig::Local(_) => "storage.container",
            };
            return Err(Error::missing_field(field));
        }
        if let StorageConfig::AzureBlob(c) = self {
            if c.account.trim().is_empty() {
                return Err(Error::missing_field("storage.account"));
            }
        }
        if self.options().multipart_threshold == 0 {
            return Err(Error::invalid_value(
                "storage.multipart_threshold",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Create a client for the configured backend
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn StorageClient>> {
    config.validate()?;
    let client: Arc<dyn StorageClient> = match config {
        StorageConfig::S3(c) => Arc::new(S3StorageClient::new(c.clone())?),
        StorageConfig::AzureBlob(c) => Arc::new(AzureBlobStorageClient::new(c.clone())?),
        StorageConfig::Gcs(c) => Arc::new(GcsStorageClient::new(c.clone())?),
        StorageConfig::Local(c) => Arc::new(LocalStorageClient::new(c.clone())?),
    };
    Ok(client)
}

/// Create a client from a stage URL
///
/// Supported formats:
/// - `s3://bucket/prefix/` - AWS S3
/// - `r2://bucket/prefix/` - Cloudflare R2 (endpoint from `R2_ENDPOINT_URL`)
/// - `gs://bucket/prefix/` - Google Cloud Storage
/// - `az://container/prefix/` - Azure Blob (account from `AZURE_STORAGE_ACCOUNT_NAME`)
/// - `/local/root/container` or `file://...` - local directory
pub fn from_url(url: &str) -> Result<Arc<dyn StorageClient>> {
    from_config(&parse_url(url)?)
}

/// Parse a stage URL into storage settings
pub fn parse_url(url: &str) -> Result<StorageConfig> {
    if let Some(rest) = url.strip_prefix("s3://") {
        let (bucket, options) = split_container(rest, url)?;
        Ok(StorageConfig::S3(S3Config {
            options,
            ..S3Config::new(bucket)
        }))
    } else if let Some(rest) = url.strip_prefix("r2://") {
        let (bucket, options) = split_container(rest, url)?;
        Ok(StorageConfig::S3(S3Config {
            endpoint: std::env::var("R2_ENDPOINT_URL").ok(),
            options,
            ..S3Config::new(bucket)
        }))
    } else if let Some(rest) = url.strip_prefix("gs://") {
        let (bucket, options) = split_container(rest, url)?;
        Ok(StorageConfig::Gcs(GcsConfig {
            options,
            ..GcsConfig::new(bucket)
        }))
    } else if let Some(rest) = url.strip_prefix("az://") {
        let (container, options) = split_container(rest, url)?;
        let account = std::env::var("AZURE_STORAGE_ACCOUNT_NAME")
            .map_err(|_| Error::missing_field("AZURE_STORAGE_ACCOUNT_NAME"))?;
        Ok(StorageConfig::AzureBlob(AzureBlobConfig {
            options,
            ..AzureBlobConfig::new(account, container)
        }))
    } else {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        let container = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::config(format!("Invalid local stage path: {url}")))?;
        let root = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Ok(StorageConfig::Local(LocalConfig::new(root, container)))
    }
}

/// Split `container/prefix` into the container and a `/`-terminated prefix
fn split_container(rest: &str, url: &str) -> Result<(String, StagingOptions)> {
    let (container, prefix) = match rest.split_once('/') {
        Some((container, prefix)) => (container, prefix),
        None => (rest, ""),
    };
    if container.is_empty() {
        return Err(Error::config(format!("Missing bucket in stage URL: {url}")));
    }

    let prefix = prefix.trim_matches('/');
    let key_prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    Ok((container.to_string(), StagingOptions::with_key_prefix(key_prefix)))
}
