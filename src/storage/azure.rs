//! Azure Blob Storage staging storage

use super::client::{CopyRequest, ObjectKey, ServerCopy, StorageBackend, StorageClient};
use super::rest::{check_response, encode_key, http_client, prefixed_headers, transport_error};
use super::store::{StagingOptions, StagingStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use object_store::azure::{
    AzureAuthorizer, AzureConfigKey, AzureCredential, AzureCredentialProvider,
    MicrosoftAzureBuilder,
};
use object_store::{CredentialProvider, ObjectStore};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Request, Response, Url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const STORE: &str = "MicrosoftAzure";

const METADATA_PREFIX: &str = "x-ms-meta-";

const COPY_STATUS: &str = "x-ms-copy-status";

const COPY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Azure Blob connection settings
///
/// Without an access key, credentials come from the environment
/// (`AZURE_STORAGE_ACCOUNT_KEY`, `AZURE_STORAGE_SAS_KEY`, managed identity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureBlobConfig {
    /// Storage account name
    pub account: String,

    /// Staging container
    pub container: String,

    /// Shared account key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,

    /// Key prefix and upload settings
    #[serde(flatten)]
    pub options: StagingOptions,
}

impl AzureBlobConfig {
    pub fn new(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            access_key: None,
            options: StagingOptions::default(),
        }
    }

    fn builder(&self, container: &str) -> MicrosoftAzureBuilder {
        let mut builder = MicrosoftAzureBuilder::from_env()
            .with_account(&self.account)
            .with_container_name(container);
        if let Some(key) = &self.access_key {
            builder = builder.with_access_key(key);
        }
        builder
    }
}

/// Staging storage in an Azure Blob container
#[derive(Debug)]
pub struct AzureBlobStorageClient {
    inner: StagingStore,
}

impl AzureBlobStorageClient {
    /// Connect to the configured container
    pub fn new(config: AzureBlobConfig) -> Result<Self> {
        let builder = config.builder(&config.container);
        let endpoint = builder
            .get_config_value(&AzureConfigKey::Endpoint)
            .unwrap_or_else(|| format!("https://{}.blob.core.windows.net", config.account));
        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        let copier = AzureServerCopy {
            client: http_client()?,
            credentials: Arc::clone(store.credentials()),
            account: config.account.clone(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        };
        Ok(Self::with_store(config, Arc::new(store)).with_copier(Arc::new(copier)))
    }

    /// Use an existing store for the staging container.
    ///
    /// Copies to other containers, or with metadata, stream the blob through
    /// this process unless a copier is set with [`Self::with_copier`].
    pub fn with_store(config: AzureBlobConfig, store: Arc<dyn ObjectStore>) -> Self {
        let container = config.container.clone();
        let options = config.options.clone();
        let opener = Arc::new(
            move |name: &str| -> object_store::Result<Arc<dyn ObjectStore>> {
                Ok(Arc::new(config.builder(name).build()?))
            },
        );
        Self {
            inner: StagingStore::new(
                StorageBackend::AzureBlob,
                container,
                options,
                store,
                opener,
            ),
        }
    }

    /// Use an existing store for another container in the same account
    #[must_use]
    pub fn with_container(self, name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.inner.register_container(name, store);
        self
    }

    /// Copy between containers, and with metadata, through `copier`
    #[must_use]
    pub fn with_copier(self, copier: Arc<dyn ServerCopy>) -> Self {
        Self {
            inner: self.inner.with_copier(copier),
        }
    }
}

/// Blob metadata names must be C# identifiers
fn metadata_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// `Copy Blob` within the storage account
#[derive(Debug)]
struct AzureServerCopy {
    client: Client,
    credentials: AzureCredentialProvider,
    account: String,
    endpoint: String,
}

impl AzureServerCopy {
    fn blob_url(&self, container: &str, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, container, encode_key(key))
    }

    async fn send(
        &self,
        credential: &AzureCredential,
        mut request: Request,
        key: &str,
    ) -> object_store::Result<Response> {
        AzureAuthorizer::new(credential, &self.account).authorize(&mut request);
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| transport_error(STORE, e))?;
        check_response(STORE, key, response).await
    }

    async fn properties(
        &self,
        credential: &AzureCredential,
        container: &str,
        key: &str,
    ) -> object_store::Result<Response> {
        let request = self
            .client
            .head(self.blob_url(container, key))
            .build()
            .map_err(|e| transport_error(STORE, e))?;
        self.send(credential, request, key).await
    }
}

fn copy_status(response: &Response) -> Option<String> {
    response
        .headers()
        .get(COPY_STATUS)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl ServerCopy for AzureServerCopy {
    async fn copy_object(&self, request: &CopyRequest<'_>) -> object_store::Result<()> {
        let credential = self.credentials.get_credential().await?;

        let source = self
            .properties(&credential, request.source_container, request.source_key)
            .await?;
        let mut metadata = prefixed_headers(source.headers(), METADATA_PREFIX);
        for (name, value) in request.metadata {
            metadata.insert(metadata_name(name), value.clone());
        }

        // A SAS token authorizes the source through its URL
        let mut source_url = Url::parse(&self.blob_url(request.source_container, request.source_key))
            .map_err(|e| object_store::Error::Generic {
                store: STORE,
                source: Box::new(e),
            })?;
        if let AzureCredential::SASToken(pairs) = credential.as_ref() {
            source_url.query_pairs_mut().extend_pairs(pairs);
        }

        let mut copy = self
            .client
            .put(self.blob_url(request.destination_container, request.destination_key))
            .header("x-ms-copy-source", source_url.as_str())
            .header(CONTENT_LENGTH, "0");
        for (name, value) in &metadata {
            copy = copy.header(format!("{METADATA_PREFIX}{name}"), value);
        }
        let copy = copy.build().map_err(|e| transport_error(STORE, e))?;
        let mut status = copy_status(&self.send(&credential, copy, request.source_key).await?);

        // Copies between containers may finish asynchronously
        while status.as_deref() == Some("pending") {
            debug!(key = request.destination_key, "Waiting for blob copy");
            tokio::time::sleep(COPY_POLL_INTERVAL).await;
            let destination = self
                .properties(&credential, request.destination_container, request.destination_key)
                .await?;
            status = copy_status(&destination);
        }

        match status.as_deref() {
            None | Some("success") => Ok(()),
            Some(other) => Err(object_store::Error::Generic {
                store: STORE,
                source: format!("Blob copy ended with status {other}").into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_names_are_identifiers() {
        assert_eq!(metadata_name("archived-by"), "archived_by");
        assert_eq!(metadata_name("incremental-key-min"), "incremental_key_min");
        assert_eq!(metadata_name("tap"), "tap");
    }
}

#[async_trait]
impl StorageClient for AzureBlobStorageClient {
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
