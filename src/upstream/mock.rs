//! Scripted upstream client for tests

use super::traits::{FetchedBatch, Page, UpstreamClient, UpstreamError};
use crate::model::{record_identifier, CandidateStub, Record, RecordKind, Source};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Mock upstream serving preconfigured pages and records
pub struct MockUpstream {
    source: Source,
    pages: HashMap<RecordKind, Vec<Vec<CandidateStub>>>,
    listing_failure: Option<String>,
    deleted: Vec<String>,
    records: HashMap<String, Record>,
    fetch_failure: Option<String>,
    item_failures: HashMap<String, String>,
    pages_requested: AtomicUsize,
    fetched: Mutex<Vec<Vec<String>>>,
}

impl MockUpstream {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            pages: HashMap::new(),
            listing_failure: None,
            deleted: Vec::new(),
            records: HashMap::new(),
            fetch_failure: None,
            item_failures: HashMap::new(),
            pages_requested: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Append one listing page for `kind`
    pub fn with_page(mut self, kind: RecordKind, stubs: Vec<CandidateStub>) -> Self {
        self.pages.entry(kind).or_default().push(stubs);
        self
    }

    /// Append one listing page built from full records, and serve those
    /// records from `fetch_batch`
    pub fn with_changed(mut self, kind: RecordKind, records: Vec<Record>) -> Self {
        let stubs = records
            .iter()
            .filter_map(|r| {
                let uri = record_identifier(r)?;
                let publish = r.get("publish").and_then(Value::as_bool).unwrap_or(true);
                Some(CandidateStub::new(uri, publish))
            })
            .collect();
        for record in records {
            self = self.with_record(record);
        }
        self.with_page(kind, stubs)
    }

    /// Serve a record from `fetch_batch`
    pub fn with_record(mut self, record: Record) -> Self {
        if let Some(id) = record_identifier(&record) {
            self.records.insert(id.to_string(), record);
        }
        self
    }

    /// Serve `record` when `id` is requested, whatever the record itself says
    pub fn with_record_at(mut self, id: impl Into<String>, record: Record) -> Self {
        self.records.insert(id.into(), record);
        self
    }

    /// Fail the fetch of one identifier while the rest of its batch succeeds
    pub fn with_item_failure(mut self, id: impl Into<String>, message: impl Into<String>) -> Self {
        self.item_failures.insert(id.into(), message.into());
        self
    }

    /// Fail the listing request that follows the configured pages
    pub fn with_listing_failure(mut self, message: impl Into<String>) -> Self {
        self.listing_failure = Some(message.into());
        self
    }

    /// Fail every bulk fetch
    pub fn with_fetch_failure(mut self, message: impl Into<String>) -> Self {
        self.fetch_failure = Some(message.into());
        self
    }

    /// Identifiers served by the delete feed, as a single page
    pub fn with_deleted(mut self, ids: Vec<String>) -> Self {
        self.deleted = ids;
        self
    }

    /// Number of listing pages requested so far
    pub fn pages_requested(&self) -> usize {
        self.pages_requested.load(Ordering::SeqCst)
    }

    /// Identifier batches passed to `fetch_batch`, in call order
    pub fn fetched_batches(&self) -> Vec<Vec<String>> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    fn source(&self) -> Source {
        self.source
    }

    async fn list_changed(
        &self,
        kind: RecordKind,
        _since: i64,
        page: u32,
    ) -> Result<Page<CandidateStub>, UpstreamError> {
        self.pages_requested.fetch_add(1, Ordering::SeqCst);

        let pages = self.pages.get(&kind).map(Vec::as_slice).unwrap_or_default();
        let index = page.saturating_sub(1) as usize;

        match pages.get(index) {
            Some(stubs) => {
                let has_more = index + 1 < pages.len() || self.listing_failure.is_some();
                Ok(Page::new(stubs.clone(), has_more))
            }
            None => match &self.listing_failure {
                Some(message) => Err(UpstreamError::Unavailable(message.clone())),
                None => Ok(Page::last(Vec::new())),
            },
        }
    }

    async fn fetch_batch(
        &self,
        _kind: RecordKind,
        ids: &[String],
        _resolve: &[&str],
    ) -> Result<FetchedBatch, UpstreamError> {
        self.fetched.lock().unwrap().push(ids.to_vec());

        if let Some(message) = &self.fetch_failure {
            return Err(UpstreamError::Unavailable(message.clone()));
        }

        let mut batch = FetchedBatch::default();
        for id in ids {
            if let Some(message) = self.item_failures.get(id) {
                batch
                    .failed
                    .push((id.clone(), UpstreamError::Unavailable(message.clone())));
            } else if let Some(record) = self.records.get(id) {
                batch.records.push(record.clone());
            }
        }
        Ok(batch)
    }

    async fn delete_feed(
        &self,
        _kind: RecordKind,
        _since: i64,
        page: u32,
    ) -> Result<Page<String>, UpstreamError> {
        if page > 1 {
            return Ok(Page::last(Vec::new()));
        }
        Ok(Page::last(self.deleted.clone()))
    }
}
