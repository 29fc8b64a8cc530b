//! Local directory staging storage
//!
//! Containers are subdirectories of a root directory. Useful for tests and
//! for loading from a mounted stage.

use super::client::{ObjectKey, StorageBackend, StorageClient};
use super::store::{PrefixedStoreCopy, StagingOptions, StagingStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Local directory settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding one subdirectory per container
    pub root: PathBuf,

    /// Staging container (subdirectory of `root`)
    pub container: String,

    /// Key prefix and upload settings
    #[serde(flatten)]
    pub options: StagingOptions,
}

impl LocalConfig {
    pub fn new(root: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            container: container.into(),
            options: StagingOptions::default(),
        }
    }
}

fn open_container(root: &Path, container: &str) -> object_store::Result<LocalFileSystem> {
    let dir = root.join(container);
    std::fs::create_dir_all(&dir).map_err(|e| object_store::Error::Generic {
        store: "LocalFileSystem",
        source: Box::new(e),
    })?;
    LocalFileSystem::new_with_prefix(dir)
}

/// Staging storage in a local directory
#[derive(Debug)]
pub struct LocalStorageClient {
    inner: StagingStore,
}

impl LocalStorageClient {
    /// Open the container directory, creating it if needed
    pub fn new(config: LocalConfig) -> Result<Self> {
        let store = open_container(&config.root, &config.container).map_err(|e| {
            Error::config(format!(
                "Failed to create local store at {}: {e}",
                config.root.join(&config.container).display()
            ))
        })?;
        // Containers are directories under one root, so copies between them
        // are plain file copies
        let root_store = LocalFileSystem::new_with_prefix(&config.root)
            .map_err(|e| Error::config(format!("Failed to open {}: {e}", config.root.display())))?;

        let root = config.root.clone();
        let opener = Arc::new(
            move |name: &str| -> object_store::Result<Arc<dyn ObjectStore>> {
                Ok(Arc::new(open_container(&root, name)?))
            },
        );
        Ok(Self {
            inner: StagingStore::new(
                StorageBackend::Local,
                config.container,
                config.options,
                Arc::new(store),
                opener,
            )
            .with_copier(Arc::new(PrefixedStoreCopy::new(Arc::new(root_store)))),
        })
    }
}

#[async_trait]
impl StorageClient for LocalStorageClient {
    fn backend(&self) -> StorageBackend {
        self.inner.backend()
    }

    fn container(&self) -> &str {
        self.inner.container()
    }

    async fn upload(&self, local_path: &Path, stream: &str) -> Result<ObjectKey> {
        self.inner.upload(local_path, stream).await
    }

    async fn copy(
        &self,
        source_key: &ObjectKey,
        destination_container: &str,
        destination_key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.inner
            .copy(source_key, destination_container, destination_key, metadata)
            .await
    }

    async fn delete(&self, stream: &str, key: &ObjectKey) -> Result<()> {
        self.inner.delete(stream, key).await
    }
}
