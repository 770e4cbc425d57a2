//! HTTP client for the catalog (archival description) system

use super::http::{build_client, join_url, read_json};
use super::traits::{FetchedBatch, Page, UpstreamClient, UpstreamError};
use crate::config::CatalogConfig;
use crate::model::{CandidateStub, Record, RecordKind, Source};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Header carrying the session token on authenticated requests
const SESSION_HEADER: &str = "X-ArchivesSpace-Session";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    session: String,
}

/// Numbered page as returned by catalog listings
#[derive(Debug, Deserialize)]
struct NumberedPage<T> {
    this_page: u32,
    last_page: u32,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

impl<T> NumberedPage<T> {
    fn into_page(self) -> Page<T> {
        let has_more = self.this_page < self.last_page;
        Page::new(self.results, has_more)
    }
}

/// A node of a resource tree, with its precomputed children
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TreeNode {
    #[serde(default)]
    pub child_count: u64,
    /// Parent key (`""` for the root, else the node uri) to offset to children
    #[serde(default)]
    pub precomputed_waypoints: HashMap<String, HashMap<String, Vec<Waypoint>>>,
}

impl TreeNode {
    /// Children listed under `key`, ordered by waypoint offset
    pub fn children_of(&self, key: &str) -> Vec<&Waypoint> {
        let Some(waypoints) = self.precomputed_waypoints.get(key) else {
            return Vec::new();
        };
        let mut offsets: Vec<(&String, &Vec<Waypoint>)> = waypoints.iter().collect();
        offsets.sort_by_key(|(offset, _)| offset.parse::<u64>().unwrap_or(u64::MAX));
        offsets.into_iter().flat_map(|(_, w)| w.iter()).collect()
    }
}

/// Summary of a child record inside a tree node
#[derive(Debug, Clone, Deserialize)]
pub struct Waypoint {
    #[serde(default)]
    pub title: Option<String>,
    pub uri: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub child_count: u64,
    #[serde(default)]
    pub dates: Vec<Value>,
}

/// Client for the catalog's REST API
///
/// Logs in lazily on first use and reuses the session for every request.
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    repository: u32,
    page_size: u32,
    session: OnceCell<String>,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig, page_size: u32, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            http: build_client(timeout)?,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            repository: config.repository,
            page_size,
            session: OnceCell::new(),
        })
    }

    async fn login(&self) -> Result<String, UpstreamError> {
        let url = join_url(&self.base_url, &format!("/users/{}/login", self.username));
        let response = self
            .http
            .post(&url)
            .form(&[("password", self.password.as_str())])
            .send()
            .await?;
        let login: LoginResponse = read_json(response).await?;
        tracing::debug!(user = %self.username, "catalog session established");
        Ok(login.session)
    }

    async fn session(&self) -> Result<&str, UpstreamError> {
        self.session
            .get_or_try_init(|| self.login())
            .await
            .map(String::as_str)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let session = self.session().await?;
        let response = self
            .http
            .get(join_url(&self.base_url, path))
            .header(SESSION_HEADER, session)
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }

    /// Listing path for a record kind
    fn kind_path(&self, kind: RecordKind) -> Result<String, UpstreamError> {
        let repo = format!("/repositories/{}", self.repository);
        let path = match kind {
            RecordKind::Resource => format!("{}/resources", repo),
            RecordKind::ArchivalObject | RecordKind::ArchivalObjectCollection => {
                format!("{}/archival_objects", repo)
            }
            RecordKind::Subject => "/subjects".to_string(),
            RecordKind::AgentPerson => "/agents/people".to_string(),
            RecordKind::AgentCorporateEntity => "/agents/corporate_entities".to_string(),
            RecordKind::AgentFamily => "/agents/families".to_string(),
            RecordKind::ArrangementMapComponent => {
                return Err(UpstreamError::UnsupportedKind {
                    system: Source::Catalog,
                    kind,
                })
            }
        };
        Ok(path)
    }

    /// Verify that the catalog accepts our credentials
    pub async fn ping(&self) -> Result<(), UpstreamError> {
        self.session().await.map(|_| ())
    }

    /// Fetch a single record by reference, inlining `resolve` references
    pub async fn fetch(&self, reference: &str, resolve: &[&str]) -> Result<Record, UpstreamError> {
        let query: Vec<(&str, String)> = resolve.iter().map(|r| ("resolve[]", r.to_string())).collect();
        self.get_json(reference, &query).await
    }

    /// Root of a resource tree
    pub async fn tree_root(&self, resource_uri: &str) -> Result<TreeNode, UpstreamError> {
        let path = format!("{}/tree/root", resource_uri.trim_end_matches('/'));
        self.get_json(&path, &[]).await
    }

    /// A node of a resource tree
    pub async fn tree_node(&self, resource_uri: &str, node_uri: &str) -> Result<TreeNode, UpstreamError> {
        let path = format!("{}/tree/node", resource_uri.trim_end_matches('/'));
        self.get_json(&path, &[("node_uri", node_uri.to_string())]).await
    }
}

/// Numeric database id at the end of a record uri
fn numeric_id(uri: &str) -> Option<&str> {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}

#[async_trait]
impl UpstreamClient for CatalogClient {
    fn source(&self) -> Source {
        Source::Catalog
    }

    async fn list_changed(
        &self,
        kind: RecordKind,
        since: i64,
        page: u32,
    ) -> Result<Page<CandidateStub>, UpstreamError> {
        let path = self.kind_path(kind)?;
        let listing: NumberedPage<CandidateStub> = self
            .get_json(
                &path,
                &[
                    ("page", page.to_string()),
                    ("page_size", self.page_size.to_string()),
                    ("modified_since", since.to_string()),
                ],
            )
            .await?;
        Ok(listing.into_page())
    }

    async fn fetch_batch(
        &self,
        kind: RecordKind,
        ids: &[String],
        resolve: &[&str],
    ) -> Result<FetchedBatch, UpstreamError> {
        if ids.is_empty() {
            return Ok(FetchedBatch::default());
        }

        let path = self.kind_path(kind)?;
        let mut batch = FetchedBatch::default();
        let mut numeric = Vec::with_capacity(ids.len());
        for uri in ids {
            match numeric_id(uri) {
                Some(id) => numeric.push(id),
                None => batch
                    .failed
                    .push((uri.clone(), UpstreamError::Decode(format!("not a record uri: {}", uri)))),
            }
        }
        if numeric.is_empty() {
            return Ok(batch);
        }

        let mut query = vec![("id_set", numeric.join(","))];
        query.extend(resolve.iter().map(|r| ("resolve[]", r.to_string())));
        batch.records = self.get_json(&path, &query).await?;
        Ok(batch)
    }

    async fn delete_feed(
        &self,
        kind: RecordKind,
        since: i64,
        page: u32,
    ) -> Result<Page<String>, UpstreamError> {
        let feed: NumberedPage<String> = self
            .get_json(
                "/delete-feed",
                &[
                    ("page", page.to_string()),
                    ("modified_since", since.to_string()),
                ],
            )
            .await?;

        // The feed covers every kind; keep the ones we were asked for
        let mut page = feed.into_page();
        page.items.retain(|uri| uri.contains(kind.uri_segment()));
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_id_takes_trailing_digits() {
        assert_eq!(numeric_id("/repositories/2/resources/17"), Some("17"));
        assert_eq!(numeric_id("/subjects/4/"), Some("4"));
        assert_eq!(numeric_id("/subjects/abc"), None);
    }

    #[test]
    fn numbered_page_reports_successor() {
        let page: NumberedPage<String> =
            serde_json::from_value(json!({"this_page": 1, "last_page": 3, "results": ["/a/1"]})).unwrap();
        assert!(page.into_page().has_more);

        let page: NumberedPage<String> =
            serde_json::from_value(json!({"this_page": 3, "last_page": 3, "results": []})).unwrap();
        assert!(!page.into_page().has_more);
    }

    #[test]
    fn listing_results_become_candidate_stubs() {
        let page: NumberedPage<CandidateStub> = serde_json::from_value(json!({
            "this_page": 1,
            "last_page": 1,
            "results": [
                {"uri": "/subjects/1", "publish": false, "title": "Rivers"},
                {"uri": "/subjects/2"}
            ]
        }))
        .unwrap();
        let page = page.into_page();
        assert!(!page.items[0].publish);
        assert!(page.items[1].publish);
    }

    #[test]
    fn tree_children_follow_offset_order() {
        let node: TreeNode = serde_json::from_value(json!({
            "child_count": 3,
            "precomputed_waypoints": {
                "": {
                    "1": [{"uri": "/ao/3", "position": 2, "title": "c"}],
                    "0": [{"uri": "/ao/1", "position": 0, "title": "a"},
                          {"uri": "/ao/2", "position": 1, "title": "b"}]
                }
            }
        }))
        .unwrap();

        let uris: Vec<&str> = node.children_of("").iter().map(|w| w.uri.as_str()).collect();
        assert_eq!(uris, vec!["/ao/1", "/ao/2", "/ao/3"]);
        assert!(node.children_of("/ao/9").is_empty());
    }
}
