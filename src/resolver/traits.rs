//! Secondary client trait definitions

use crate::model::Record;
use crate::upstream::UpstreamError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while gathering supplementary data for a record
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("secondary system unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("record {identifier} has no {field}")]
    MissingField {
        identifier: String,
        field: &'static str,
    },

    #[error("ancestor chain of {identifier} is deeper than {limit}")]
    DepthExceeded { identifier: String, limit: usize },
}

/// Placement of a catalog record in the arrangement service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrangementEntry {
    #[serde(default)]
    pub order: Option<i64>,
    /// Arrangement ancestors, nearest first
    #[serde(default)]
    pub ancestors: Vec<Record>,
}

/// Systems consulted to enrich a changed record
#[async_trait]
pub trait SecondaryClient: Send + Sync {
    /// Check that every secondary system is reachable
    async fn health(&self) -> Result<(), ResolutionError>;

    /// Arrangement placement of the record at `reference`, if any
    async fn find_ancestors(&self, reference: &str) -> Result<Option<ArrangementEntry>, ResolutionError>;

    /// Number of direct children of `record_uri` in the tree of `resource_uri`
    async fn child_count(&self, record_uri: &str, resource_uri: &str) -> Result<u64, ResolutionError>;

    /// Direct children of `record_uri` as `{title, ref, level, order, type}` stubs.
    /// Passing the resource itself as `record_uri` lists the top level.
    async fn children(&self, record_uri: &str, resource_uri: &str) -> Result<Vec<Record>, ResolutionError>;

    /// Fetch a catalog record, inlining the `resolve` references
    async fn fetch(&self, reference: &str, resolve: &[&str]) -> Result<Record, ResolutionError>;
}
