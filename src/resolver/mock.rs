//! Scripted secondary client for tests

use super::traits::{ArrangementEntry, ResolutionError, SecondaryClient};
use crate::model::{record_identifier, Record};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Mock secondary systems answering from preconfigured tables
///
/// Unknown records have no arrangement entry, no children and cannot be fetched.
pub struct MockSecondary {
    available: bool,
    arrangement: HashMap<String, ArrangementEntry>,
    child_counts: HashMap<String, u64>,
    children: HashMap<String, Vec<Record>>,
    records: HashMap<String, Record>,
    failing: HashSet<String>,
}

impl MockSecondary {
    /// Create a mock whose systems are all reachable
    pub fn available() -> Self {
        Self {
            available: true,
            arrangement: HashMap::new(),
            child_counts: HashMap::new(),
            children: HashMap::new(),
            records: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    /// Create a mock whose health check fails
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    pub fn with_arrangement(mut self, reference: impl Into<String>, entry: ArrangementEntry) -> Self {
        self.arrangement.insert(reference.into(), entry);
        self
    }

    /// Register direct children; the child count follows the list length
    pub fn with_children(mut self, record_uri: impl Into<String>, children: Vec<Record>) -> Self {
        let uri = record_uri.into();
        self.child_counts.insert(uri.clone(), children.len() as u64);
        self.children.insert(uri, children);
        self
    }

    pub fn with_child_count(mut self, record_uri: impl Into<String>, count: u64) -> Self {
        self.child_counts.insert(record_uri.into(), count);
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        if let Some(id) = record_identifier(&record) {
            self.records.insert(id.to_string(), record);
        }
        self
    }

    /// Fail every lookup that involves `reference`
    pub fn with_failure(mut self, reference: impl Into<String>) -> Self {
        self.failing.insert(reference.into());
        self
    }

    fn check(&self, references: &[&str]) -> Result<(), ResolutionError> {
        if !self.available {
            return Err(ResolutionError::Unavailable(
                "mock secondary configured as unavailable".to_string(),
            ));
        }
        match references.iter().find(|r| self.failing.contains(**r)) {
            Some(reference) => Err(ResolutionError::Unavailable(format!(
                "mock failure for '{}'",
                reference
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SecondaryClient for MockSecondary {
    async fn health(&self) -> Result<(), ResolutionError> {
        self.check(&[])
    }

    async fn find_ancestors(&self, reference: &str) -> Result<Option<ArrangementEntry>, ResolutionError> {
        self.check(&[reference])?;
        Ok(self.arrangement.get(reference).cloned())
    }

    async fn child_count(&self, record_uri: &str, resource_uri: &str) -> Result<u64, ResolutionError> {
        self.check(&[record_uri, resource_uri])?;
        Ok(self.child_counts.get(record_uri).copied().unwrap_or(0))
    }

    async fn children(&self, record_uri: &str, resource_uri: &str) -> Result<Vec<Record>, ResolutionError> {
        self.check(&[record_uri, resource_uri])?;
        Ok(self.children.get(record_uri).cloned().unwrap_or_default())
    }

    async fn fetch(&self, reference: &str, _resolve: &[&str]) -> Result<Record, ResolutionError> {
        self.check(&[reference])?;
        self.records
            .get(reference)
            .cloned()
            .ok_or_else(|| ResolutionError::Unavailable(format!("no mock record for '{}'", reference)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unavailable_mock_fails_health() {
        assert!(MockSecondary::available().health().await.is_ok());
        assert!(MockSecondary::unavailable().health().await.is_err());
    }

    #[tokio::test]
    async fn children_set_child_count() {
        let child = json!({"ref": "/ao/2", "type": "object"}).as_object().cloned().unwrap();
        let mock = MockSecondary::available().with_children("/ao/1", vec![child]);
        assert_eq!(mock.child_count("/ao/1", "/res/1").await.unwrap(), 1);
        assert_eq!(mock.child_count("/ao/3", "/res/1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failing_reference_errors() {
        let mock = MockSecondary::available().with_failure("/res/1");
        assert!(mock.children("/ao/1", "/res/1").await.is_err());
        assert!(mock.find_ancestors("/res/2").await.unwrap().is_none());
    }
}
