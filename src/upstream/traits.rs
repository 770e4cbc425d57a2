//! Upstream client trait definitions

use crate::model::{CandidateStub, Record, RecordKind, Source};
use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while talking to an upstream system
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("{system} does not serve {kind} records")]
    UnsupportedKind { system: Source, kind: RecordKind },
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Whether the upstream reports another page after this one
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// A final page
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, false)
    }
}

/// Records returned by a bulk fetch
///
/// `failed` lists identifiers whose individual fetch failed. A requested
/// identifier in neither list was not returned by the upstream.
#[derive(Debug, Default)]
pub struct FetchedBatch {
    pub records: Vec<Record>,
    pub failed: Vec<(String, UpstreamError)>,
}

impl From<Vec<Record>> for FetchedBatch {
    fn from(records: Vec<Record>) -> Self {
        Self {
            records,
            failed: Vec::new(),
        }
    }
}

/// A system records are harvested from
///
/// Pages are numbered from 1. Implementations are shared by every task of a
/// harvest and must be safe for concurrent use.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// The source this client talks to
    fn source(&self) -> Source;

    /// Stubs of records of `kind` modified at or after `since` (seconds)
    async fn list_changed(
        &self,
        kind: RecordKind,
        since: i64,
        page: u32,
    ) -> Result<Page<CandidateStub>, UpstreamError>;

    /// Full records for the given identifiers, inlining the `resolve` references
    ///
    /// An `Err` means the batch as a whole could not be fetched.
    async fn fetch_batch(
        &self,
        kind: RecordKind,
        ids: &[String],
        resolve: &[&str],
    ) -> Result<FetchedBatch, UpstreamError>;

    /// Identifiers of records of `kind` deleted at or after `since`
    async fn delete_feed(
        &self,
        kind: RecordKind,
        since: i64,
        page: u32,
    ) -> Result<Page<String>, UpstreamError>;
}
