//! Shared object-store engine behind every storage backend

use super::client::{CopyRequest, KeyGenerator, ObjectKey, ServerCopy, StorageBackend};
use crate::error::{Error, Result, StorageOperation};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, ObjectStore, PutMultipartOpts, PutOptions, WriteMultipart,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Files at or above this size are uploaded in parts
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Size of each uploaded part
const MULTIPART_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Parts in flight per upload
const MULTIPART_CONCURRENCY: usize = 4;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Opens the object store for a named container
pub type ContainerOpener =
    Arc<dyn Fn(&str) -> object_store::Result<Arc<dyn ObjectStore>> + Send + Sync>;

/// Options shared by every backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingOptions {
    /// Prepended verbatim to every uploaded key
    #[serde(default)]
    pub key_prefix: String,

    /// Size in bytes from which uploads are split into parts
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
        }
    }
}

impl StagingOptions {
    /// Options with the given key prefix
    pub fn with_key_prefix(prefix: impl Into<String>) -> Self {
        Self {
            key_prefix: prefix.into(),
            ..Self::default()
        }
    }
}

/// Upload, copy and delete over an [`ObjectStore`]
pub(crate) struct StagingStore {
    backend: StorageBackend,
    container: String,
    options: StagingOptions,
    /// Local directories cannot carry content type or user metadata
    supports_attributes: bool,
    store: Arc<dyn ObjectStore>,
    opener: ContainerOpener,
    containers: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    copier: Option<Arc<dyn ServerCopy>>,
    keys: KeyGenerator,
}

impl fmt::Debug for StagingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingStore")
            .field("backend", &self.backend)
            .field("container", &self.container)
            .field("options", &self.options)
            .field("store", &self.store.to_string())
            .field("copier", &self.copier)
            .finish_non_exhaustive()
    }
}

impl StagingStore {
    pub(crate) fn new(
        backend: StorageBackend,
        container: impl Into<String>,
        options: StagingOptions,
        store: Arc<dyn ObjectStore>,
        opener: ContainerOpener,
    ) -> Self {
        Self {
            backend,
            container: container.into(),
            options,
            supports_attributes: backend != StorageBackend::Local,
            store,
            opener,
            containers: Mutex::new(HashMap::new()),
            copier: None,
            keys: KeyGenerator::new(),
        }
    }

    /// Copy between containers, and with metadata, on the service itself
    pub(crate) fn with_copier(mut self, copier: Arc<dyn ServerCopy>) -> Self {
        self.copier = Some(copier);
        self
    }

    pub(crate) fn backend(&self) -> StorageBackend {
        self.backend
    }

    pub(crate) fn container(&self) -> &str {
        &self.container
    }

    /// Use a ready-made store for another container instead of opening one
    pub(crate) fn register_container(&self, name: impl Into<String>, store: Arc<dyn ObjectStore>) {
        if let Ok(mut containers) = self.containers.lock() {
            containers.insert(name.into(), store);
        }
    }

    fn open(&self, container: &str) -> object_store::Result<Arc<dyn ObjectStore>> {
        if container == self.container {
            return Ok(Arc::clone(&self.store));
        }
        if let Some(store) = self
            .containers
            .lock()
            .ok()
            .and_then(|containers| containers.get(container).cloned())
        {
            return Ok(store);
        }

        let store = (self.opener)(container)?;
        if let Ok(mut containers) = self.containers.lock() {
            containers.insert(container.to_string(), Arc::clone(&store));
        }
        Ok(store)
    }

    pub(crate) async fn upload(&self, local_path: &Path, stream: &str) -> Result<ObjectKey> {
        let basename = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::output(format!("Not a file: {}", local_path.display())))?;

        let size = match tokio::fs::metadata(local_path).await {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound {
                    path: local_path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let key = self
            .keys
            .next_key(&self.options.key_prefix, stream, &basename);
        let location = ObjectPath::from(key.as_str());
        let attributes = self.upload_attributes(&basename);

        info!(
            backend = %self.backend,
            container = %self.container,
            stream = stream,
            local_file = %local_path.display(),
            key = %key,
            bytes = size,
            "Uploading staged file"
        );

        if size >= self.options.multipart_threshold {
            self.put_multipart(local_path, &location, &key, attributes)
                .await?;
        } else {
            let data = tokio::fs::read(local_path).await?;
            self.store
                .put_opts(
                    &location,
                    Bytes::from(data).into(),
                    PutOptions {
                        attributes,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| Error::storage(StorageOperation::Upload, &key, e))?;
        }

        Ok(ObjectKey::new(key))
    }

    /// Stream the file in parts; a failed upload is aborted so no partial
    /// object becomes visible.
    async fn put_multipart(
        &self,
        local_path: &Path,
        location: &ObjectPath,
        key: &str,
        attributes: Attributes,
    ) -> Result<()> {
        let mut file = tokio::fs::File::open(local_path).await?;
        let upload = self
            .store
            .put_multipart_opts(
                location,
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::storage(StorageOperation::Upload, key, e))?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_CHUNK_SIZE);

        let mut buffer = vec![0u8; READ_BUFFER_SIZE];
        loop {
            let read = match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    abort(writer, key).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.wait_for_capacity(MULTIPART_CONCURRENCY).await {
                abort(writer, key).await;
                return Err(Error::storage(StorageOperation::Upload, key, e));
            }
            writer.write(&buffer[..read]);
        }

        writer
            .finish()
            .await
            .map_err(|e| Error::storage(StorageOperation::Upload, key, e))?;
        debug!(key = key, "Multipart upload complete");
        Ok(())
    }

    fn upload_attributes(&self, basename: &str) -> Attributes {
        let mut attributes = Attributes::new();
        if self.supports_attributes {
            attributes.insert(Attribute::ContentType, content_type_for(basename).into());
        }
        attributes
    }

    pub(crate) async fn copy(
        &self,
        source_key: &ObjectKey,
        destination_container: &str,
        destination_key: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let from = ObjectPath::from(source_key.as_str());
        let to = ObjectPath::from(destination_key);

        info!(
            backend = %self.backend,
            source_container = %self.container,
            source_key = %source_key,
            destination_container = destination_container,
            destination_key = destination_key,
            "Copying staged object"
        );

        if !metadata.is_empty() && !self.supports_attributes {
            warn!(
                backend = %self.backend,
                entries = metadata.len(),
                "Backend cannot store object metadata, copying without it"
            );
        }

        let result = if destination_container == self.container
            && (metadata.is_empty() || !self.supports_attributes)
        {
            self.store.copy(&from, &to).await
        } else if let Some(copier) = &self.copier {
            copier
                .copy_object(&CopyRequest {
                    source_container: &self.container,
                    source_key: source_key.as_str(),
                    destination_container,
                    destination_key,
                    metadata,
                })
                .await
        } else {
            self.copy_through(&from, destination_container, &to, metadata)
                .await
        };
        result.map_err(|e| Error::storage(StorageOperation::Copy, source_key.as_str(), e))
    }

    /// Stream the source object into the destination with merged metadata,
    /// for stores without a server-side copier. Supplied entries replace
    /// source entries with the same name.
    async fn copy_through(
        &self,
        from: &ObjectPath,
        destination_container: &str,
        to: &ObjectPath,
        metadata: &BTreeMap<String, String>,
    ) -> object_store::Result<()> {
        let destination = self.open(destination_container)?;
        let source = self.store.get(from).await?;

        let mut attributes = Attributes::new();
        if self.supports_attributes {
            attributes = source.attributes.clone();
            for (name, value) in metadata {
                attributes.insert(Attribute::Metadata(name.clone().into()), value.clone().into());
            }
        }

        let upload = destination
            .put_multipart_opts(
                to,
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, MULTIPART_CHUNK_SIZE);

        let mut chunks = source.into_stream();
        while let Some(chunk) = chunks.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    abort(writer, to.as_ref()).await;
                    return Err(e);
                }
            };
            if let Err(e) = writer.wait_for_capacity(MULTIPART_CONCURRENCY).await {
                abort(writer, to.as_ref()).await;
                return Err(e);
            }
            writer.put(bytes);
        }
        writer.finish().await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, stream: &str, key: &ObjectKey) -> Result<()> {
        info!(
            backend = %self.backend,
            container = %self.container,
            stream = stream,
            key = %key,
            "Deleting staged object"
        );

        match self.store.delete(&ObjectPath::from(key.as_str())).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::storage(StorageOperation::Delete, key.as_str(), e)),
        }
    }
}

async fn abort(writer: WriteMultipart, key: &str) {
    if let Err(e) = writer.abort().await {
        warn!(key = key, error = %e, "Failed to abort multipart upload");
    }
}

pub(crate) fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".gz") {
        "application/gzip"
    } else {
        "text/csv"
    }
}

/// Copies between containers that are top-level prefixes of one store, as
/// local directories under a common root are
#[derive(Debug)]
pub(crate) struct PrefixedStoreCopy {
    root: Arc<dyn ObjectStore>,
}

impl PrefixedStoreCopy {
    pub(crate) fn new(root: Arc<dyn ObjectStore>) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ServerCopy for PrefixedStoreCopy {
    async fn copy_object(&self, request: &CopyRequest<'_>) -> object_store::Result<()> {
        let from = ObjectPath::from(format!("{}/{}", request.source_container, request.source_key));
        let to = ObjectPath::from(format!(
            "{}/{}",
            request.destination_container, request.destination_key
        ));
        self.root.copy(&from, &to).await
    }
}
