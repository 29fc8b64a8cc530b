//! HTTP plumbing for the copy operations object_store doesn't expose

use crate::error::{Error, Result};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;

/// Server-side copies of large objects can take minutes
const COPY_TIMEOUT: Duration = Duration::from_secs(600);

/// HTTP client for copy requests
pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(format!("{}/{}", crate::NAME, crate::VERSION))
        .timeout(COPY_TIMEOUT)
        .build()
        .map_err(|e| Error::config(format!("Failed to create HTTP client: {e}")))
}

/// Percent-encode each `/`-separated segment of an object key
pub(crate) fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Headers starting with `prefix`, with the prefix stripped
pub(crate) fn prefixed_headers(headers: &HeaderMap, prefix: &str) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().strip_prefix(prefix)?;
            Some((name.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

pub(crate) fn transport_error(store: &'static str, error: reqwest::Error) -> object_store::Error {
    object_store::Error::Generic {
        store,
        source: Box::new(error),
    }
}

/// Pass a successful response through, turn anything else into an error
pub(crate) async fn check_response(
    store: &'static str,
    path: &str,
    response: Response,
) -> object_store::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(store, path, status, &body))
}

pub(crate) fn status_error(
    store: &'static str,
    path: &str,
    status: StatusCode,
    body: &str,
) -> object_store::Error {
    let path = path.to_string();
    let source = format!("{status}: {body}").into();
    match status {
        StatusCode::NOT_FOUND => object_store::Error::NotFound { path, source },
        StatusCode::UNAUTHORIZED => object_store::Error::Unauthenticated { path, source },
        StatusCode::FORBIDDEN => object_store::Error::PermissionDenied { path, source },
        StatusCode::PRECONDITION_FAILED => object_store::Error::Precondition { path, source },
        _ => object_store::Error::Generic { store, source },
    }
}
