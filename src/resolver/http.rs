//! Secondary client backed by the catalog and arrangement HTTP clients

use super::traits::{ArrangementEntry, ResolutionError, SecondaryClient};
use super::tree::child_stub;
use crate::model::Record;
use crate::upstream::{ArrangementClient, CatalogClient};
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves supplementary data from the live systems
///
/// Shares its clients with the upstream side of the harvest.
pub struct HttpSecondary {
    catalog: Arc<CatalogClient>,
    arrangement: Arc<ArrangementClient>,
}

impl HttpSecondary {
    pub fn new(catalog: Arc<CatalogClient>, arrangement: Arc<ArrangementClient>) -> Self {
        Self {
            catalog,
            arrangement,
        }
    }
}

#[async_trait]
impl SecondaryClient for HttpSecondary {
    async fn health(&self) -> Result<(), ResolutionError> {
        self.arrangement
            .health()
            .await
            .map_err(|e| ResolutionError::Unavailable(format!("arrangement service: {}", e)))?;
        self.catalog
            .ping()
            .await
            .map_err(|e| ResolutionError::Unavailable(format!("catalog: {}", e)))
    }

    async fn find_ancestors(&self, reference: &str) -> Result<Option<ArrangementEntry>, ResolutionError> {
        Ok(self.arrangement.find_by_uri(reference).await?)
    }

    async fn child_count(&self, record_uri: &str, resource_uri: &str) -> Result<u64, ResolutionError> {
        Ok(self.catalog.tree_node(resource_uri, record_uri).await?.child_count)
    }

    async fn children(&self, record_uri: &str, resource_uri: &str) -> Result<Vec<Record>, ResolutionError> {
        let (node, key) = if record_uri == resource_uri {
            (self.catalog.tree_root(resource_uri).await?, "")
        } else {
            (self.catalog.tree_node(resource_uri, record_uri).await?, record_uri)
        };

        if node.child_count == 0 {
            return Ok(Vec::new());
        }
        Ok(node.children_of(key).into_iter().map(child_stub).collect())
    }

    async fn fetch(&self, reference: &str, resolve: &[&str]) -> Result<Record, ResolutionError> {
        Ok(self.catalog.fetch(reference, resolve).await?)
    }
}
