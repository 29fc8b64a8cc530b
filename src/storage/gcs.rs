//! Google Cloud Storage staging storage

use super::client::{CopyRequest, ObjectKey, ServerCopy, StorageBackend, StorageClient};
use super::rest::{check_response, http_client, transport_error};
use super::store::{StagingOptions, StagingStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use object_store::gcp::{GcpCredentialProvider, GoogleCloudStorageBuilder};
use object_store::{CredentialProvider, ObjectStore};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const STORE: &str = "GCS";

const JSON_API: &str = "https://storage.googleapis.com/storage/v1";

/// GCS connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcsConfig {
    /// Staging bucket
    pub bucket: String,

    /// Service account key file, overriding `GOOGLE_SERVICE_ACCOUNT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_path: Option<String>,

    /// Key prefix and upload settings
    #[serde(flatten)]
    pub options: StagingOptions,
}

impl GcsConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            service_account_path: None,
            options: StagingOptions::default(),
        }
    }

    fn builder(&self, bucket: &str) -> GoogleCloudStorageBuilder {
        let builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
        match &self.service_account_path {
            Some(path) => builder.with_service_account_path(path),
            None => builder,
        }
    }
}

/// Staging storage in a GCS bucket
#[derive(Debug)]
pub struct GcsStorageClient {
    inner: StagingStore,
}

impl GcsStorageClient {
    /// Connect to the configured bucket
    pub fn new(config: GcsConfig) -> Result<Self> {
        let store = config
            .builder(&config.bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        let copier = GcsServerCopy {
            client: http_client()?,
            credentials: Arc::clone(store.credentials()),
            base_url: JSON_API.to_string(),
        };
        Ok(Self::with_store(config, Arc::new(store)).with_copier(Arc::new(copier)))
    }

    /// Use an existing store for the staging bucket.
    ///
    /// Copies to other buckets, or with metadata, stream the object through
    /// this process unless a copier is set with [`Self::with_copier`].
    pub fn with_store(config: GcsConfig, store: Arc<dyn ObjectStore>) -> Self {
        let bucket = config.bucket.clone();
        let options = config.options.clone();
        let opener = Arc::new(
            move |name: &str| -> object_store::Result<Arc<dyn ObjectStore>> {
                Ok(Arc::new(config.builder(name).build()?))
            },
        );
        Self {
            inner: StagingStore::new(StorageBackend::Gcs, bucket, options, store, opener),
        }
    }

    /// Use an existing store for another bucket
    #[must_use]
    pub fn with_container(self, name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.inner.register_container(name, store);
        self
    }

    /// Copy between buckets, and with metadata, through `copier`
    #[must_use]
    pub fn with_copier(self, copier: Arc<dyn ServerCopy>) -> Self {
        Self {
            inner: self.inner.with_copier(copier),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    content_type: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RewriteResponse {
    done: bool,
    rewrite_token: Option<String>,
}

/// `objects.rewrite` through the JSON API; large objects take several calls
#[derive(Debug)]
struct GcsServerCopy {
    client: Client,
    credentials: GcpCredentialProvider,
    base_url: String,
}

impl GcsServerCopy {
    /// Object names are a single path segment in the JSON API
    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.base_url,
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    async fn send(&self, request: RequestBuilder, key: &str) -> object_store::Result<Response> {
        let credential = self.credentials.get_credential().await?;
        let response = request
            .bearer_auth(&credential.bearer)
            .send()
            .await
            .map_err(|e| transport_error(STORE, e))?;
        check_response(STORE, key, response).await
    }
}

#[async_trait]
impl ServerCopy for GcsServerCopy {
    async fn copy_object(&self, request: &CopyRequest<'_>) -> object_store::Result<()> {
        let source_url = self.object_url(request.source_container, request.source_key);
        let source: ObjectResource = self
            .send(self.client.get(&source_url), request.source_key)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(STORE, e))?;

        let mut metadata = source.metadata;
        metadata.extend(request.metadata.clone());
        let mut body = json!({ "metadata": metadata });
        if let Some(content_type) = source.content_type {
            body["contentType"] = json!(content_type);
        }

        let rewrite_url = format!(
            "{source_url}/rewriteTo/b/{}/o/{}",
            urlencoding::encode(request.destination_container),
            urlencoding::encode(request.destination_key)
        );
        let mut token: Option<String> = None;
        loop {
            let mut call = self.client.post(&rewrite_url).json(&body);
            if let Some(token) = &token {
                call = call.query(&[("rewriteToken", token)]);
            }
            let response: RewriteResponse = self
                .send(call, request.source_key)
                .await?
                .json()
                .await
                .map_err(|e| transport_error(STORE, e))?;

            if response.done {
                return Ok(());
            }
            let Some(next) = response.rewrite_token else {
                return Err(object_store::Error::Generic {
                    store: STORE,
                    source: "Unfinished rewrite returned no token".into(),
                });
            };
            debug!(key = request.destination_key, "Continuing object rewrite");
            token = Some(next);
        }
    }
}


#[async_trait]
impl StorageClient for GcsStorageClient {
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
