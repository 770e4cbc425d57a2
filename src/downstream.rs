//! Downstream consumer of enriched records and deletions

use crate::config::DownstreamConfig;
use crate::model::EnrichedRecord;
use crate::upstream::http::{build_client, join_url};
use crate::upstream::UpstreamError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// Errors from downstream operations
#[derive(Debug, thiserror::Error)]
pub enum DownstreamError {
    /// The consumer answered with an error; `detail` is its explanation
    #[error("downstream rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("downstream transport error: {0}")]
    Transport(String),
}

impl DownstreamError {
    pub fn detail(&self) -> &str {
        match self {
            DownstreamError::Rejected { detail, .. } => detail,
            DownstreamError::Transport(message) => message,
        }
    }
}

impl From<reqwest::Error> for DownstreamError {
    fn from(e: reqwest::Error) -> Self {
        DownstreamError::Transport(e.to_string())
    }
}

impl From<UpstreamError> for DownstreamError {
    fn from(e: UpstreamError) -> Self {
        DownstreamError::Transport(e.to_string())
    }
}

/// Receives what the pipeline produces
#[async_trait]
pub trait DownstreamConsumer: Send + Sync {
    /// Hand off one enriched record
    async fn deliver(&self, record: &EnrichedRecord) -> Result<(), DownstreamError>;

    /// Request removal of records by content-addressed identifier
    async fn delete_batch(&self, identifiers: &[String]) -> Result<(), DownstreamError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Posts to the consumer's merge and delete endpoints
pub struct HttpDownstream {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDownstream {
    pub fn new(config: &DownstreamConfig, timeout: Duration) -> Result<Self, DownstreamError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: config.base_url.clone(),
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), DownstreamError> {
        let response = self
            .http
            .post(join_url(&self.base_url, path))
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        Err(DownstreamError::Rejected {
            status,
            detail: error_detail(&text),
        })
    }
}

/// The `detail` field of an error body, or the raw body
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl DownstreamConsumer for HttpDownstream {
    async fn deliver(&self, record: &EnrichedRecord) -> Result<(), DownstreamError> {
        self.post(
            "/merged/",
            json!({"object_type": record.kind, "object": record.payload}),
        )
        .await
    }

    async fn delete_batch(&self, identifiers: &[String]) -> Result<(), DownstreamError> {
        self.post("/delete/", json!({ "identifiers": identifiers })).await
    }
}

/// Consumer that records everything it receives (testing)
#[derive(Default)]
pub struct RecordingConsumer {
    delivered: Mutex<Vec<EnrichedRecord>>,
    deletions: Mutex<Vec<Vec<String>>>,
    reject_delivery: HashSet<String>,
    reject_deletes: Option<String>,
}

impl RecordingConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject delivery of the record with this identifier
    pub fn rejecting(mut self, identifier: impl Into<String>) -> Self {
        self.reject_delivery.insert(identifier.into());
        self
    }

    /// Reject every deletion batch with `detail`
    pub fn rejecting_deletes(mut self, detail: impl Into<String>) -> Self {
        self.reject_deletes = Some(detail.into());
        self
    }

    pub fn delivered(&self) -> Vec<EnrichedRecord> {
        self.delivered.lock().unwrap().clone()
    }

    /// Deletion batches received, including rejected ones
    pub fn deletion_batches(&self) -> Vec<Vec<String>> {
        self.deletions.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownstreamConsumer for RecordingConsumer {
    async fn deliver(&self, record: &EnrichedRecord) -> Result<(), DownstreamError> {
        if self.reject_delivery.contains(&record.identifier) {
            return Err(DownstreamError::Rejected {
                status: 400,
                detail: format!("{} rejected", record.identifier),
            });
        }
        self.delivered.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn delete_batch(&self, identifiers: &[String]) -> Result<(), DownstreamError> {
        self.deletions.lock().unwrap().push(identifiers.to_vec());
        match &self.reject_deletes {
            Some(detail) => Err(DownstreamError::Rejected {
                status: 400,
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordKind;
    use serde_json::Map;

    #[test]
    fn error_detail_prefers_detail_field() {
        assert_eq!(error_detail(r#"{"detail": "Unknown identifier"}"#), "Unknown identifier");
        assert_eq!(error_detail(r#"{"detail": ["a", "b"]}"#), r#"["a","b"]"#);
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
    }

    #[tokio::test]
    async fn recording_consumer_keeps_deliveries() {
        let consumer = RecordingConsumer::new().rejecting("/subjects/2");
        let ok = EnrichedRecord::new("/subjects/1", RecordKind::Subject, Map::new());
        let bad = EnrichedRecord::new("/subjects/2", RecordKind::Subject, Map::new());

        consumer.deliver(&ok).await.unwrap();
        let err = consumer.deliver(&bad).await.unwrap_err();
        assert_eq!(err.detail(), "/subjects/2 rejected");
        assert_eq!(consumer.delivered().len(), 1);
    }
}
