//! AWS S3 and S3-compatible staging storage

use super::client::{CopyRequest, ObjectKey, ServerCopy, StorageBackend, StorageClient};
use super::rest::{check_response, encode_key, http_client, prefixed_headers, transport_error};
use super::store::{content_type_for, StagingOptions, StagingStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use object_store::aws::{AmazonS3Builder, AmazonS3ConfigKey, AwsAuthorizer, AwsCredentialProvider};
use object_store::{CredentialProvider, ObjectStore};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Request};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

const STORE: &str = "S3";

const DEFAULT_REGION: &str = "us-east-1";

const METADATA_PREFIX: &str = "x-amz-meta-";

/// S3 connection settings
///
/// Credentials come from the environment (`AWS_ACCESS_KEY_ID`,
/// `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN`, instance metadata).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// Staging bucket
    pub bucket: String,

    /// Region, overriding `AWS_REGION`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores (R2, MinIO)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Allow plain HTTP endpoints
    #[serde(default)]
    pub allow_http: bool,

    /// Key prefix and upload settings
    #[serde(flatten)]
    pub options: StagingOptions,
}

impl S3Config {
    /// Settings for a bucket with everything else from the environment
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: None,
            endpoint: None,
            allow_http: false,
            options: StagingOptions::default(),
        }
    }

    fn builder(&self, bucket: &str) -> AmazonS3Builder {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = &self.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if self.allow_http {
            builder = builder.with_allow_http(true);
        }
        builder
    }
}

/// Staging storage in an S3 bucket
#[derive(Debug)]
pub struct S3StorageClient {
    inner: StagingStore,
}

impl S3StorageClient {
    /// Connect to the configured bucket
    pub fn new(config: S3Config) -> Result<Self> {
        let builder = config.builder(&config.bucket);
        let region = builder
            .get_config_value(&AmazonS3ConfigKey::Region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = builder.get_config_value(&AmazonS3ConfigKey::Endpoint);
        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create S3 client: {e}")))?;

        let copier = S3ServerCopy::new(
            http_client()?,
            Arc::clone(store.credentials()),
            region,
            endpoint,
        );
        Ok(Self::with_store(config, Arc::new(store)).with_copier(Arc::new(copier)))
    }

    /// Use an existing store for the staging bucket.
    ///
    /// Copies to other buckets, or with metadata, stream the object through
    /// this process unless a copier is set with [`Self::with_copier`].
    pub fn with_store(config: S3Config, store: Arc<dyn ObjectStore>) -> Self {
        let bucket = config.bucket.clone();
        let options = config.options.clone();
        let opener = Arc::new(
            move |name: &str| -> object_store::Result<Arc<dyn ObjectStore>> {
                Ok(Arc::new(config.builder(name).build()?))
            },
        );
        Self {
            inner: StagingStore::new(StorageBackend::S3, bucket, options, store, opener),
        }
    }

    /// Use an existing store for another bucket (e.g. the archive bucket)
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

/// `CopyObject` with the merged metadata, signed with the store's credentials
#[derive(Debug)]
struct S3ServerCopy {
    client: Client,
    credentials: AwsCredentialProvider,
    region: String,
    /// Service endpoint; buckets are addressed path-style below it
    endpoint: String,
}

impl S3ServerCopy {
    fn new(
        client: Client,
        credentials: AwsCredentialProvider,
        region: String,
        endpoint: Option<String>,
    ) -> Self {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://s3.{region}.amazonaws.com"),
        };
        Self {
            client,
            credentials,
            region,
            endpoint,
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, bucket, encode_key(key))
    }

    async fn send(&self, mut request: Request, key: &str) -> object_store::Result<reqwest::Response> {
        let credential = self.credentials.get_credential().await?;
        AwsAuthorizer::new(&credential, "s3", &self.region).authorize(&mut request, None);
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| transport_error(STORE, e))?;
        check_response(STORE, key, response).await
    }
}

#[async_trait]
impl ServerCopy for S3ServerCopy {
    async fn copy_object(&self, request: &CopyRequest<'_>) -> object_store::Result<()> {
        let head = self
            .client
            .head(self.object_url(request.source_container, request.source_key))
            .build()
            .map_err(|e| transport_error(STORE, e))?;
        let source = self.send(head, request.source_key).await?;

        let content_type = source
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_else(|| content_type_for(request.source_key))
            .to_string();
        let mut metadata = prefixed_headers(source.headers(), METADATA_PREFIX);
        metadata.extend(request.metadata.clone());

        let mut copy = self
            .client
            .put(self.object_url(request.destination_container, request.destination_key))
            .header(
                "x-amz-copy-source",
                format!("{}/{}", request.source_container, encode_key(request.source_key)),
            )
            .header("x-amz-metadata-directive", "REPLACE")
            .header(CONTENT_TYPE, content_type);
        for (name, value) in &metadata {
            copy = copy.header(format!("{METADATA_PREFIX}{name}"), value);
        }
        let copy = copy.build().map_err(|e| transport_error(STORE, e))?;
        let response = self.send(copy, request.source_key).await?;

        // CopyObject can fail after the 200 status has been sent
        let body = response.text().await.map_err(|e| transport_error(STORE, e))?;
        if body.contains("<Error>") {
            return Err(object_store::Error::Generic {
                store: STORE,
                source: format!("CopyObject failed: {body}").into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageClient for S3StorageClient {
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
