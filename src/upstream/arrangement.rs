//! HTTP client for the arrangement-map service

use super::http::{build_client, join_url, read_json};
use super::traits::{FetchedBatch, Page, UpstreamClient, UpstreamError};
use crate::config::ArrangementConfig;
use crate::model::{CandidateStub, Record, RecordKind, Source};
use crate::resolver::ArrangementEntry;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Cursor-style page returned by the arrangement service
#[derive(Debug, Deserialize)]
struct LinkedPage<T> {
    #[serde(default)]
    next: Option<String>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

impl<T> LinkedPage<T> {
    fn into_page(self) -> Page<T> {
        let has_more = self.next.is_some();
        Page::new(self.results, has_more)
    }
}

#[derive(Debug, Deserialize)]
struct ComponentStub {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(default = "default_publish")]
    publish: bool,
}

fn default_publish() -> bool {
    true
}

/// Client for the arrangement service's REST API
pub struct ArrangementClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ArrangementClient {
    pub fn new(config: &ArrangementConfig, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<reqwest::Response, UpstreamError> {
        let mut req = self.http.get(join_url(&self.base_url, path)).query(query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    fn check_kind(kind: RecordKind) -> Result<(), UpstreamError> {
        if Source::Arrangement.supports(kind) {
            Ok(())
        } else {
            Err(UpstreamError::UnsupportedKind {
                system: Source::Arrangement,
                kind,
            })
        }
    }

    /// Check the service's health endpoint
    pub async fn health(&self) -> Result<(), UpstreamError> {
        let response = self.get("/status/health/", &[]).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(UpstreamError::Unavailable(format!(
                "arrangement service health check returned {}",
                response.status()
            )))
        }
    }

    /// Arrangement placement of a catalog record, if it has one
    pub async fn find_by_uri(&self, uri: &str) -> Result<Option<ArrangementEntry>, UpstreamError> {
        let response = self
            .get("/api/find-by-uri/", &[("uri", uri.to_string())])
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let page: LinkedPage<ArrangementEntry> = read_json(response).await?;
        Ok(page.results.into_iter().next())
    }

    /// Fetch one arrangement record by reference
    pub async fn fetch(&self, reference: &str) -> Result<Record, UpstreamError> {
        read_json(self.get(reference, &[]).await?).await
    }
}

/// Delete-feed entries are either bare references or objects carrying `ref`
fn deleted_reference(entry: Value) -> Option<String> {
    match entry {
        Value::String(reference) => Some(reference),
        Value::Object(map) => map.get("ref").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

#[async_trait]
impl UpstreamClient for ArrangementClient {
    fn source(&self) -> Source {
        Source::Arrangement
    }

    async fn list_changed(
        &self,
        kind: RecordKind,
        since: i64,
        page: u32,
    ) -> Result<Page<CandidateStub>, UpstreamError> {
        Self::check_kind(kind)?;
        let response = self
            .get(
                "/api/components/",
                &[
                    ("modified_since", since.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        let listing: LinkedPage<ComponentStub> = read_json(response).await?;
        let page = listing.into_page();
        Ok(Page::new(
            page.items
                .into_iter()
                .map(|c| CandidateStub::new(c.reference, c.publish))
                .collect(),
            page.has_more,
        ))
    }

    async fn fetch_batch(
        &self,
        kind: RecordKind,
        ids: &[String],
        _resolve: &[&str],
    ) -> Result<FetchedBatch, UpstreamError> {
        Self::check_kind(kind)?;
        let results = join_all(ids.iter().map(|reference| self.fetch(reference))).await;

        // Components are fetched one by one, so each can fail on its own
        let mut batch = FetchedBatch::default();
        for (reference, result) in ids.iter().zip(results) {
            match result {
                Ok(record) => batch.records.push(record),
                Err(e) => batch.failed.push((reference.clone(), e)),
            }
        }
        Ok(batch)
    }

    async fn delete_feed(
        &self,
        kind: RecordKind,
        since: i64,
        page: u32,
    ) -> Result<Page<String>, UpstreamError> {
        Self::check_kind(kind)?;
        let response = self
            .get(
                "/api/delete-feed/",
                &[
                    ("deleted_since", since.to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;
        let feed: LinkedPage<Value> = read_json(response).await?;
        let page = feed.into_page();
        Ok(Page::new(
            page.items.into_iter().filter_map(deleted_reference).collect(),
            page.has_more,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn linked_page_follows_next_link() {
        let page: LinkedPage<Value> = serde_json::from_value(json!({
            "count": 2,
            "next": "http://carto/api/components/?page=2",
            "results": ["/api/components/1/"]
        }))
        .unwrap();
        assert!(page.into_page().has_more);

        let page: LinkedPage<Value> =
            serde_json::from_value(json!({"next": null, "results": []})).unwrap();
        assert!(!page.into_page().has_more);
    }

    #[test]
    fn delete_feed_accepts_strings_and_objects() {
        assert_eq!(
            deleted_reference(json!("/api/components/3/")),
            Some("/api/components/3/".to_string())
        );
        assert_eq!(
            deleted_reference(json!({"ref": "/api/components/4/"})),
            Some("/api/components/4/".to_string())
        );
        assert_eq!(deleted_reference(json!(7)), None);
    }

    #[test]
    fn only_components_are_served() {
        assert!(ArrangementClient::check_kind(RecordKind::ArrangementMapComponent).is_ok());
        assert!(matches!(
            ArrangementClient::check_kind(RecordKind::Resource),
            Err(UpstreamError::UnsupportedKind { .. })
        ));
    }

    #[test]
    fn find_by_uri_payload_decodes_entry() {
        let page: LinkedPage<ArrangementEntry> = serde_json::from_value(json!({
            "count": 1,
            "results": [{
                "order": 3,
                "ancestors": [{"ref": "/api/components/1/", "title": "Series"}]
            }]
        }))
        .unwrap();
        let entry = page.results.into_iter().next().unwrap();
        assert_eq!(entry.order, Some(3));
        assert_eq!(entry.ancestors.len(), 1);
    }
}
