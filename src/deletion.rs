//! Deletion propagation
//!
//! Source identifiers are mapped to content-addressed ids (UUID v5 in the
//! URL namespace) so a deletion can be re-submitted any number of times and
//! always names the same downstream records.

use crate::downstream::{DownstreamConsumer, DownstreamError};
use crate::ledger::{LedgerError, RunLedger};
use crate::model::RunId;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Content-addressed identifier for a source identifier
pub fn content_id(identifier: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, identifier.as_bytes()).to_string()
}

/// Drop repeated identifiers, keeping first occurrences in order
pub fn dedupe<I>(identifiers: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    identifiers
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("deletion batch rejected: {0}")]
    Downstream(#[from] DownstreamError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The run a propagation reports its errors to
#[derive(Clone)]
pub struct RunContext {
    pub ledger: Arc<dyn RunLedger>,
    pub run_id: RunId,
}

impl RunContext {
    pub fn new(ledger: Arc<dyn RunLedger>, run_id: RunId) -> Self {
        Self { ledger, run_id }
    }
}

/// Result of one propagation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionOutcome {
    /// Content-addressed ids sent downstream, in first-seen order
    pub submitted: Vec<String>,
    /// Downstream detail when the batch was rejected
    pub rejected: Option<String>,
}

impl DeletionOutcome {
    /// Number of deletions the downstream accepted
    pub fn accepted(&self) -> usize {
        if self.rejected.is_some() {
            0
        } else {
            self.submitted.len()
        }
    }
}

/// Submits deduplicated deletion batches downstream
#[derive(Clone)]
pub struct DeletionPropagator {
    consumer: Arc<dyn DownstreamConsumer>,
}

impl DeletionPropagator {
    pub fn new(consumer: Arc<dyn DownstreamConsumer>) -> Self {
        Self { consumer }
    }

    /// Delete the records named by `identifiers` in one batch
    ///
    /// A rejected batch is recorded against the run when there is one and
    /// reported in the outcome; without a run it is an error.
    pub async fn propagate(
        &self,
        identifiers: Vec<String>,
        run: Option<&RunContext>,
    ) -> Result<DeletionOutcome, PropagationError> {
        let submitted: Vec<String> = dedupe(identifiers).iter().map(|id| content_id(id)).collect();
        if submitted.is_empty() {
            return Ok(DeletionOutcome::default());
        }

        match self.consumer.delete_batch(&submitted).await {
            Ok(()) => {
                tracing::info!(count = submitted.len(), "deletions submitted");
                Ok(DeletionOutcome {
                    submitted,
                    rejected: None,
                })
            }
            Err(e) => match run {
                Some(run) => {
                    tracing::warn!(run_id = %run.run_id, error = %e, "deletion batch rejected");
                    run.ledger.append_error(&run.run_id, e.detail())?;
                    Ok(DeletionOutcome {
                        submitted,
                        rejected: Some(e.detail().to_string()),
                    })
                }
                None => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downstream::RecordingConsumer;
    use crate::ledger::MemoryLedger;
    use crate::model::{ChangeStatus, RecordKind, Source};

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn content_ids_are_stable_and_distinct() {
        assert_eq!(content_id("/a/1"), content_id("/a/1"));
        assert_ne!(content_id("/a/1"), content_id("/a/2"));
        assert_eq!(
            content_id("/a/1"),
            Uuid::new_v5(&Uuid::NAMESPACE_URL, b"/a/1").to_string()
        );
    }

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        assert_eq!(dedupe(ids(&["/b", "/a", "/b", "/c", "/a"])), ids(&["/b", "/a", "/c"]));
    }

    #[tokio::test]
    async fn duplicates_are_submitted_once() {
        let consumer = Arc::new(RecordingConsumer::new());
        let propagator = DeletionPropagator::new(consumer.clone());

        let first = propagator
            .propagate(ids(&["/a/1", "/a/1", "/a/2"]), None)
            .await
            .unwrap();
        let second = propagator
            .propagate(ids(&["/a/1", "/a/1", "/a/2"]), None)
            .await
            .unwrap();

        assert_eq!(first.submitted.len(), 2);
        assert_eq!(first.accepted(), 2);
        assert_eq!(first, second);
        assert_eq!(consumer.deletion_batches(), vec![first.submitted.clone(); 2]);
    }

    #[tokio::test]
    async fn empty_input_never_contacts_downstream() {
        let consumer = Arc::new(RecordingConsumer::new());
        let propagator = DeletionPropagator::new(consumer.clone());

        let outcome = propagator.propagate(Vec::new(), None).await.unwrap();
        assert_eq!(outcome, DeletionOutcome::default());
        assert!(consumer.deletion_batches().is_empty());
    }

    #[tokio::test]
    async fn rejection_without_run_is_an_error() {
        let consumer = Arc::new(RecordingConsumer::new().rejecting_deletes("Unknown identifier"));
        let propagator = DeletionPropagator::new(consumer);

        let err = propagator.propagate(ids(&["/a/1"]), None).await.unwrap_err();
        assert!(matches!(
            err,
            PropagationError::Downstream(DownstreamError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn rejection_with_run_records_detail() {
        let ledger = Arc::new(MemoryLedger::new());
        let run = ledger
            .create_run(Source::Catalog, RecordKind::Subject, ChangeStatus::Deleted)
            .unwrap();
        let context = RunContext::new(ledger.clone(), run.id.clone());

        let consumer = Arc::new(RecordingConsumer::new().rejecting_deletes("Unknown identifier"));
        let outcome = DeletionPropagator::new(consumer)
            .propagate(ids(&["/a/1", "/a/2"]), Some(&context))
            .await
            .unwrap();

        assert_eq!(outcome.rejected.as_deref(), Some("Unknown identifier"));
        assert_eq!(outcome.accepted(), 0);
        let errors = ledger.errors(&run.id).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unknown identifier");
    }
}
