//! Shared plumbing for the reqwest-backed clients

use super::traits::UpstreamError;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build an HTTP client with the configured request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<Client, UpstreamError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Decode a JSON body, turning non-2xx responses into `UpstreamError::Status`
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, UpstreamError> {
    if response.status().is_success() {
        response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status { status, body })
    }
}

/// Join a base URL and a path or absolute reference
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
