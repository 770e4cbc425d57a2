//! Lazy change enumeration over paginated upstream listings

use super::traits::{Page, UpstreamClient, UpstreamError};
use crate::model::{CandidateStub, RecordKind};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::future::Future;
use std::sync::Arc;

/// Turns an upstream client's pages into item streams
///
/// Streams request one page at a time, only when the previous page has been
/// consumed, and stop at the first page that reports no successor. Every call
/// starts again from page 1.
#[derive(Clone)]
pub struct ChangeEnumerator {
    client: Arc<dyn UpstreamClient>,
}

impl ChangeEnumerator {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self { client }
    }

    /// Candidate stubs for records of `kind` changed since `since`
    pub fn changes(
        &self,
        kind: RecordKind,
        since: i64,
    ) -> BoxStream<'static, Result<CandidateStub, UpstreamError>> {
        let client = self.client.clone();
        paginate(move |page| {
            let client = client.clone();
            async move { client.list_changed(kind, since, page).await }
        })
    }

    /// Identifiers from the upstream delete feed
    pub fn delete_feed(
        &self,
        kind: RecordKind,
        since: i64,
    ) -> BoxStream<'static, Result<String, UpstreamError>> {
        let client = self.client.clone();
        paginate(move |page| {
            let client = client.clone();
            async move { client.delete_feed(kind, since, page).await }
        })
    }

    /// Delete-feed identifiers followed by changed records that are no
    /// longer publishable. The two sources may overlap.
    pub fn deletions(
        &self,
        kind: RecordKind,
        since: i64,
    ) -> BoxStream<'static, Result<String, UpstreamError>> {
        let unpublished = self
            .changes(kind, since)
            .try_filter_map(|stub| future::ready(Ok((!stub.publish).then_some(stub.uri))));

        self.delete_feed(kind, since).chain(unpublished).boxed()
    }
}

/// Flatten a page-numbered listing into a lazy item stream
fn paginate<T, F, Fut>(fetch: F) -> BoxStream<'static, Result<T, UpstreamError>>
where
    T: Send + 'static,
    F: Fn(u32) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Page<T>, UpstreamError>> + Send + 'static,
{
    stream::try_unfold(Some(1u32), move |cursor| {
        let request = cursor.map(|page| (page, fetch(page)));
        async move {
            let Some((page, request)) = request else {
                return Ok::<_, UpstreamError>(None);
            };
            let result = request.await?;
            // An empty page ends the listing even if the upstream claims more
            let next = (result.has_more && !result.items.is_empty()).then_some(page + 1);
            Ok(Some((result.items, next)))
        }
    })
    .map_ok(|items| stream::iter(items.into_iter().map(Ok)))
    .try_flatten()
    .boxed()
}
